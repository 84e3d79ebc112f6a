//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! JSON file only needs the fields it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "account": { "appId": "cli_xxx", "appSecret": "..." },
///   "connection": { "verbose": true }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushlinkSettings {
    /// App credentials and gateway domain.
    pub account: AccountSettings,
    /// Long-connection client tuning.
    pub connection: ConnectionSettings,
    /// Logging output.
    pub logging: LoggingSettings,
}

impl PushlinkSettings {
    /// Check that the credentials needed for the endpoint call are present.
    pub fn validate(&self) -> Result<()> {
        if self.account.app_id.is_empty() {
            return Err(SettingsError::MissingCredentials("appId"));
        }
        if self.account.app_secret.is_empty() {
            return Err(SettingsError::MissingCredentials("appSecret"));
        }
        let domain = &self.account.domain;
        if !domain.starts_with("http://") && !domain.starts_with("https://") {
            return Err(SettingsError::InvalidValue(format!(
                "domain must be an http(s) URL, got {:?}",
                self.account.domain
            )));
        }
        if self.connection.max_inflight_dispatches == Some(0) {
            return Err(SettingsError::InvalidValue(
                "maxInflightDispatches must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// App credentials exchanged for a connection endpoint.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountSettings {
    /// Application id.
    pub app_id: String,
    /// Application secret.
    pub app_secret: String,
    /// Open platform base URL.
    pub domain: String,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            domain: "https://open.feishu.cn".to_string(),
        }
    }
}

impl std::fmt::Debug for AccountSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSettings")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Long-connection client tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Timeout for the endpoint HTTP call in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Delay before retrying a failed endpoint call in milliseconds.
    pub fetch_retry_delay_ms: u64,
    /// Timeout for the WebSocket handshake in milliseconds.
    pub connect_timeout_ms: u64,
    /// Age after which incomplete chunk buffers are dropped. `0` keeps them
    /// for the life of the connection.
    pub chunk_ttl_ms: u64,
    /// Upper bound on concurrently running dispatcher calls. Unbounded when
    /// absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_inflight_dispatches: Option<usize>,
    /// Log payload parse failures and per-frame detail.
    pub verbose: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 15_000,
            fetch_retry_delay_ms: 5_000,
            connect_timeout_ms: 15_000,
            chunk_ttl_ms: 10_000,
            max_inflight_dispatches: None,
            verbose: false,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Logging output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn configured() -> PushlinkSettings {
        let mut settings = PushlinkSettings::default();
        settings.account.app_id = "cli_test".into();
        settings.account.app_secret = "secret".into();
        settings
    }

    #[test]
    fn defaults_fail_validation_without_credentials() {
        assert_matches!(
            PushlinkSettings::default().validate(),
            Err(SettingsError::MissingCredentials("appId"))
        );
    }

    #[test]
    fn missing_secret_reported() {
        let mut settings = configured();
        settings.account.app_secret.clear();
        assert_matches!(
            settings.validate(),
            Err(SettingsError::MissingCredentials("appSecret"))
        );
    }

    #[test]
    fn configured_settings_validate() {
        assert!(configured().validate().is_ok());
    }

    #[test]
    fn non_http_domain_rejected() {
        let mut settings = configured();
        settings.account.domain = "open.feishu.cn".into();
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn zero_inflight_rejected() {
        let mut settings = configured();
        settings.connection.max_inflight_dispatches = Some(0);
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn debug_redacts_secret() {
        let debug = format!("{:?}", configured().account);
        assert!(debug.contains("cli_test"));
        assert!(!debug.contains("\"secret\""));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn serde_camel_case() {
        let json = serde_json::to_value(configured()).unwrap();
        assert_eq!(json["account"]["appId"], "cli_test");
        assert_eq!(json["connection"]["fetchTimeoutMs"], 15_000);
        assert!(json["connection"].get("maxInflightDispatches").is_none());
        assert_eq!(json["logging"]["format"], "compact");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: PushlinkSettings =
            serde_json::from_str(r#"{"connection": {"verbose": true}}"#).unwrap();
        assert!(settings.connection.verbose);
        assert_eq!(settings.connection.connect_timeout_ms, 15_000);
        assert_eq!(settings.account.domain, "https://open.feishu.cn");
    }
}
