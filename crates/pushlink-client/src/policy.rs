//! Connection policy issued by the endpoint, with client-side floors.
//!
//! The endpoint hands back a connect URL plus a `ClientConfig` object. Every
//! duration in it is in seconds on the wire; this module turns them into
//! [`Duration`]s and clamps the ones the client must never go below.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Smallest ping interval the client will honor.
pub const MIN_PING_INTERVAL: Duration = Duration::from_millis(5_000);

/// Largest ping interval the client will honor.
pub const MAX_PING_INTERVAL: Duration = Duration::from_secs(3_600);

/// Smallest reconnect interval the client will honor.
pub const MIN_RECONNECT_INTERVAL: Duration = Duration::from_millis(1_000);

/// Ping interval used when the server omits one, in seconds.
pub const DEFAULT_PING_INTERVAL_SECS: i64 = 120;

/// Reconnect interval used when the server omits one, in seconds.
pub const DEFAULT_RECONNECT_INTERVAL_SECS: i64 = 120;

/// Reconnect jitter used when the server omits one, in seconds.
pub const DEFAULT_RECONNECT_NONCE_SECS: i64 = 30;

/// `ClientConfig` as the endpoint sends it.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ServerClientConfig {
    /// Seconds between reconnect attempts.
    #[serde(default)]
    pub reconnect_interval: Option<i64>,
    /// Reconnect budget; negative means unlimited.
    #[serde(default)]
    pub reconnect_count: Option<i64>,
    /// Upper bound of the random extra delay, in seconds.
    #[serde(default)]
    pub reconnect_nonce: Option<i64>,
    /// Seconds between pings.
    #[serde(default)]
    pub ping_interval: Option<i64>,
}

/// How many consecutive failed sessions the supervisor tolerates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconnectBudget {
    /// Retry forever.
    Unlimited,
    /// Give up once this many consecutive attempts have failed.
    Limited(u32),
}

impl ReconnectBudget {
    /// Budget for a raw `ReconnectCount` value.
    pub fn from_count(count: i64) -> Self {
        if count < 0 {
            Self::Unlimited
        } else {
            Self::Limited(u32::try_from(count).unwrap_or(u32::MAX))
        }
    }

    /// Whether `attempts` consecutive failures use up the budget.
    pub fn is_exhausted(self, attempts: u32) -> bool {
        match self {
            Self::Unlimited => false,
            Self::Limited(limit) => attempts >= limit,
        }
    }
}

/// Everything needed to open and keep one connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectPolicy {
    /// WebSocket URL to dial.
    pub connect_url: String,
    /// Service id parsed from the URL, stamped on outbound frames.
    pub service_id: i32,
    /// Initial ping interval, clamped.
    pub ping_interval: Duration,
    /// Reconnect budget.
    pub reconnect_budget: ReconnectBudget,
    /// Base delay between reconnect attempts, floored.
    pub reconnect_interval: Duration,
    /// Upper bound of the random extra delay.
    pub reconnect_nonce: Duration,
}

impl ConnectPolicy {
    /// Build a policy from the URL, its service id and the server config.
    pub fn new(connect_url: String, service_id: i32, config: &ServerClientConfig) -> Self {
        Self {
            connect_url,
            service_id,
            ping_interval: ping_interval_from_secs(
                config.ping_interval.unwrap_or(DEFAULT_PING_INTERVAL_SECS),
            ),
            reconnect_budget: ReconnectBudget::from_count(config.reconnect_count.unwrap_or(-1)),
            reconnect_interval: floored_secs(
                config
                    .reconnect_interval
                    .unwrap_or(DEFAULT_RECONNECT_INTERVAL_SECS),
                MIN_RECONNECT_INTERVAL,
            ),
            reconnect_nonce: secs(config.reconnect_nonce.unwrap_or(DEFAULT_RECONNECT_NONCE_SECS)),
        }
    }

    /// Delay before the next reconnect given a jitter in milliseconds.
    pub fn backoff_delay(&self, jitter_ms: u64) -> Duration {
        let nonce_ms = u64::try_from(self.reconnect_nonce.as_millis()).unwrap_or(u64::MAX);
        self.reconnect_interval + Duration::from_millis(jitter_ms.min(nonce_ms))
    }

    /// Delay before the next reconnect with uniform jitter in `[0, nonce]`.
    pub fn jittered_backoff(&self) -> Duration {
        let nonce_ms = u64::try_from(self.reconnect_nonce.as_millis()).unwrap_or(u64::MAX);
        let jitter_ms = if nonce_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=nonce_ms)
        };
        self.backoff_delay(jitter_ms)
    }
}

/// Ping interval for a server-provided value in seconds, clamped.
pub fn ping_interval_from_secs(value: i64) -> Duration {
    clamp_ping_interval(secs(value))
}

/// Clamp an already converted interval to
/// [`MIN_PING_INTERVAL`]..=[`MAX_PING_INTERVAL`].
pub fn clamp_ping_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_PING_INTERVAL, MAX_PING_INTERVAL)
}

fn secs(value: i64) -> Duration {
    Duration::from_secs(u64::try_from(value).unwrap_or(0))
}

fn floored_secs(value: i64, floor: Duration) -> Duration {
    secs(value).max(floor)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config(interval: i64, count: i64, nonce: i64, ping: i64) -> ServerClientConfig {
        ServerClientConfig {
            reconnect_interval: Some(interval),
            reconnect_count: Some(count),
            reconnect_nonce: Some(nonce),
            ping_interval: Some(ping),
        }
    }

    fn policy(config: &ServerClientConfig) -> ConnectPolicy {
        ConnectPolicy::new("wss://gw.example/ws?service_id=1".into(), 1, config)
    }

    #[test]
    fn server_values_taken_as_seconds() {
        let p = policy(&config(10, 3, 2, 30));
        assert_eq!(p.reconnect_interval, Duration::from_secs(10));
        assert_eq!(p.reconnect_nonce, Duration::from_secs(2));
        assert_eq!(p.ping_interval, Duration::from_secs(30));
        assert_eq!(p.reconnect_budget, ReconnectBudget::Limited(3));
    }

    #[test]
    fn ping_interval_floored() {
        assert_eq!(ping_interval_from_secs(1), MIN_PING_INTERVAL);
        assert_eq!(ping_interval_from_secs(0), MIN_PING_INTERVAL);
        assert_eq!(ping_interval_from_secs(-5), MIN_PING_INTERVAL);
        assert_eq!(ping_interval_from_secs(6), Duration::from_secs(6));
        assert_eq!(clamp_ping_interval(Duration::from_secs(3)), MIN_PING_INTERVAL);
        assert_eq!(
            clamp_ping_interval(Duration::from_millis(7_500)),
            Duration::from_millis(7_500)
        );
    }

    #[test]
    fn oversized_ping_interval_capped() {
        assert_eq!(ping_interval_from_secs(i64::MAX), MAX_PING_INTERVAL);
        assert_eq!(ping_interval_from_secs(3_601), MAX_PING_INTERVAL);
        assert_eq!(ping_interval_from_secs(3_600), MAX_PING_INTERVAL);
        assert_eq!(clamp_ping_interval(Duration::MAX), MAX_PING_INTERVAL);

        let p = policy(&config(10, -1, 0, i64::MAX));
        assert_eq!(p.ping_interval, MAX_PING_INTERVAL);
    }

    #[test]
    fn reconnect_interval_floored() {
        let p = policy(&config(0, -1, 0, 120));
        assert_eq!(p.reconnect_interval, MIN_RECONNECT_INTERVAL);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let p = policy(&ServerClientConfig::default());
        assert_eq!(p.ping_interval, Duration::from_secs(120));
        assert_eq!(p.reconnect_interval, Duration::from_secs(120));
        assert_eq!(p.reconnect_nonce, Duration::from_secs(30));
        assert_eq!(p.reconnect_budget, ReconnectBudget::Unlimited);
    }

    #[test]
    fn negative_count_is_unlimited() {
        assert_eq!(ReconnectBudget::from_count(-1), ReconnectBudget::Unlimited);
        assert_eq!(ReconnectBudget::from_count(-7), ReconnectBudget::Unlimited);
        assert!(!ReconnectBudget::Unlimited.is_exhausted(u32::MAX));
    }

    #[test]
    fn limited_budget_exhausts_after_limit() {
        let budget = ReconnectBudget::Limited(2);
        assert!(!budget.is_exhausted(0));
        assert!(!budget.is_exhausted(1));
        assert!(budget.is_exhausted(2));
        assert!(budget.is_exhausted(3));
        assert!(ReconnectBudget::Limited(0).is_exhausted(1));
    }

    #[test]
    fn backoff_adds_bounded_jitter() {
        let p = policy(&config(2, -1, 1, 120));
        assert_eq!(p.backoff_delay(0), Duration::from_secs(2));
        assert_eq!(p.backoff_delay(400), Duration::from_millis(2_400));
        assert_eq!(p.backoff_delay(5_000), Duration::from_secs(3));
    }

    #[test]
    fn jittered_backoff_within_range() {
        let p = policy(&config(2, -1, 1, 120));
        for _ in 0..50 {
            let delay = p.jittered_backoff();
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(3));
        }
    }

    #[test]
    fn zero_nonce_has_no_jitter() {
        let p = policy(&config(4, -1, 0, 120));
        assert_eq!(p.jittered_backoff(), Duration::from_secs(4));
    }

    #[test]
    fn deserializes_pascal_case() {
        let parsed: ServerClientConfig = serde_json::from_str(
            r#"{"ReconnectCount": -1, "ReconnectInterval": 120,
                "ReconnectNonce": 30, "PingInterval": 120}"#,
        )
        .unwrap();
        assert_eq!(parsed, config(120, -1, 30, 120));
    }
}
