//! Connect-config endpoint client.
//!
//! Exchanges app credentials for a WebSocket URL and a [`ConnectPolicy`].
//! Called fresh before every connection attempt; nothing is cached.

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::errors::EndpointError;
use crate::policy::{ConnectPolicy, ServerClientConfig};

/// Path of the connect-config endpoint, relative to the open platform domain.
pub const ENDPOINT_PATH: &str = "/callback/ws/endpoint";

/// App credentials sent to the endpoint.
#[derive(Clone)]
pub struct Credentials {
    /// Application id.
    pub app_id: String,
    /// Application secret.
    pub app_secret: String,
}

impl Credentials {
    /// New credentials pair.
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
struct EndpointRequest<'a> {
    #[serde(rename = "AppID")]
    app_id: &'a str,
    #[serde(rename = "AppSecret")]
    app_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct EndpointResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<EndpointData>,
}

#[derive(Debug, Deserialize)]
struct EndpointData {
    #[serde(rename = "URL", default)]
    url: Option<String>,
    #[serde(rename = "ClientConfig", default)]
    client_config: Option<ServerClientConfig>,
}

/// HTTP client for the connect-config endpoint.
#[derive(Clone, Debug)]
pub struct EndpointClient {
    http: reqwest::Client,
    endpoint_url: String,
    credentials: Credentials,
    timeout: Duration,
}

impl EndpointClient {
    /// Client for `domain` (e.g. `https://open.feishu.cn`).
    pub fn new(
        domain: &str,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, EndpointError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint_url: format!("{}{ENDPOINT_PATH}", domain.trim_end_matches('/')),
            credentials,
            timeout,
        })
    }

    /// Full endpoint URL.
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Credentials this client authenticates with.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Fetch a fresh policy. Returns [`EndpointError::Cancelled`] as soon as
    /// `cancel` fires, even while the request is in flight.
    #[instrument(skip_all, fields(app_id = %self.credentials.app_id))]
    pub async fn fetch(&self, cancel: &CancellationToken) -> Result<ConnectPolicy, EndpointError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(EndpointError::Cancelled),
            result = self.request() => result,
        }
    }

    async fn request(&self) -> Result<ConnectPolicy, EndpointError> {
        let body = EndpointRequest {
            app_id: &self.credentials.app_id,
            app_secret: &self.credentials.app_secret,
        };

        let response = self
            .http
            .post(&self.endpoint_url)
            .header("locale", "zh")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EndpointError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EndpointResponse = response.json().await.map_err(|e| self.classify(e))?;
        let policy = policy_from_response(parsed)?;
        debug!(
            service_id = policy.service_id,
            ping_interval_ms = policy.ping_interval.as_millis(),
            reconnect_interval_ms = policy.reconnect_interval.as_millis(),
            "fetched connect config"
        );
        Ok(policy)
    }

    fn classify(&self, err: reqwest::Error) -> EndpointError {
        if err.is_timeout() {
            EndpointError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            EndpointError::Http(err)
        }
    }
}

fn policy_from_response(response: EndpointResponse) -> Result<ConnectPolicy, EndpointError> {
    if response.code != 0 {
        return Err(EndpointError::Rejected {
            code: response.code,
            msg: response.msg,
        });
    }
    let data = response.data.ok_or(EndpointError::MissingField("data"))?;
    let url = data.url.ok_or(EndpointError::MissingField("URL"))?;
    let client_config = data
        .client_config
        .ok_or(EndpointError::MissingField("ClientConfig"))?;
    let service_id = parse_service_id(&url)?;
    Ok(ConnectPolicy::new(url, service_id, &client_config))
}

/// Extract the `service_id` query parameter from a connect URL.
pub fn parse_service_id(url: &str) -> Result<i32, EndpointError> {
    let parsed = Url::parse(url).map_err(|e| EndpointError::InvalidServiceId(e.to_string()))?;
    let raw = parsed
        .query_pairs()
        .find(|(key, _)| key == "service_id")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| EndpointError::InvalidServiceId("missing".into()))?;
    raw.parse::<i32>()
        .map_err(|_| EndpointError::InvalidServiceId(raw))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ReconnectBudget;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, timeout: Duration) -> EndpointClient {
        EndpointClient::new(&server.uri(), Credentials::new("cli_a", "s3cret"), timeout).unwrap()
    }

    fn ok_body(url: &str) -> serde_json::Value {
        json!({
            "code": 0,
            "msg": "ok",
            "data": {
                "URL": url,
                "ClientConfig": {
                    "ReconnectCount": 5,
                    "ReconnectInterval": 3,
                    "ReconnectNonce": 1,
                    "PingInterval": 60
                }
            }
        })
    }

    #[test]
    fn service_id_parsed_from_query() {
        assert_eq!(
            parse_service_id("wss://gw.example/ws?device_id=x&service_id=4242").unwrap(),
            4242
        );
    }

    #[test]
    fn missing_service_id_rejected() {
        assert_matches!(
            parse_service_id("wss://gw.example/ws?device_id=x"),
            Err(EndpointError::InvalidServiceId(_))
        );
    }

    #[test]
    fn non_numeric_service_id_rejected() {
        assert_matches!(
            parse_service_id("wss://gw.example/ws?service_id=abc"),
            Err(EndpointError::InvalidServiceId(v)) if v == "abc"
        );
    }

    #[test]
    fn unparseable_url_rejected() {
        assert_matches!(
            parse_service_id("not a url"),
            Err(EndpointError::InvalidServiceId(_))
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let debug = format!("{:?}", Credentials::new("cli_a", "s3cret"));
        assert!(debug.contains("cli_a"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn endpoint_url_joins_domain() {
        let c = EndpointClient::new(
            "https://open.example.com/",
            Credentials::new("a", "b"),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(c.endpoint_url(), "https://open.example.com/callback/ws/endpoint");
    }

    #[tokio::test]
    async fn fetch_sends_credentials_and_parses_policy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ENDPOINT_PATH))
            .and(header("locale", "zh"))
            .and(body_json(json!({"AppID": "cli_a", "AppSecret": "s3cret"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ok_body("wss://gw.example/ws?service_id=77")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let policy = client(&server, Duration::from_secs(5))
            .fetch(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(policy.connect_url, "wss://gw.example/ws?service_id=77");
        assert_eq!(policy.service_id, 77);
        assert_eq!(policy.ping_interval, Duration::from_secs(60));
        assert_eq!(policy.reconnect_interval, Duration::from_secs(3));
        assert_eq!(policy.reconnect_nonce, Duration::from_secs(1));
        assert_eq!(policy.reconnect_budget, ReconnectBudget::Limited(5));
    }

    #[tokio::test]
    async fn nonzero_code_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"code": 1_000_040_343, "msg": "app not found"})),
            )
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .fetch(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(
            err,
            EndpointError::Rejected { code: 1_000_040_343, ref msg } if msg == "app not found"
        );
    }

    #[tokio::test]
    async fn missing_url_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": {"ClientConfig": {"PingInterval": 120}}
            })))
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .fetch(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, EndpointError::MissingField("URL"));
    }

    #[tokio::test]
    async fn missing_client_config_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": {"URL": "wss://gw.example/ws?service_id=1"}
            })))
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .fetch(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, EndpointError::MissingField("ClientConfig"));
    }

    #[tokio::test]
    async fn bad_service_id_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ok_body("wss://gw.example/ws?service_id=")),
            )
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .fetch(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, EndpointError::InvalidServiceId(_));
    }

    #[tokio::test]
    async fn http_error_status_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .fetch(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(
            err,
            EndpointError::Status { status: 503, ref body } if body == "overloaded"
        );
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ok_body("wss://gw.example/ws?service_id=1"))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_millis(200))
            .fetch(&CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, EndpointError::Timeout { timeout_ms: 200 });
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ok_body("wss://gw.example/ws?service_id=1"))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let endpoint = client(&server, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let _canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(2), endpoint.fetch(&cancel))
            .await
            .expect("fetch should stop promptly after cancel");
        assert_matches!(result, Err(EndpointError::Cancelled));
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = client(&server, Duration::from_secs(5)).fetch(&cancel).await;
        assert_matches!(result, Err(EndpointError::Cancelled));
    }
}
