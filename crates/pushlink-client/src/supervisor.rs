//! Reconnect loop around [`ConnectionSession`].
//!
//! Each iteration fetches a fresh policy, opens a socket and runs a session
//! to completion. Fetch failures retry after a fixed delay and never count
//! against the reconnect budget; failed opens and ended sessions do. A
//! successful open resets the count.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pushlink_settings::{ConnectionSettings, PushlinkSettings};

use crate::dispatch::{DispatchHandle, EventDispatcher, StatusSink};
use crate::endpoint::{Credentials, EndpointClient};
use crate::errors::{ConnectionError, EndpointError};
use crate::policy::{ConnectPolicy, ReconnectBudget};
use crate::session::{ConnectionSession, SessionEnd, SessionOptions};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client-side tuning for the supervisor and its sessions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    /// Bound on one endpoint call.
    pub fetch_timeout: Duration,
    /// Wait after a failed endpoint call.
    pub fetch_retry_delay: Duration,
    /// Bound on the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Age at which incomplete chunk buffers are dropped.
    pub chunk_ttl: Option<Duration>,
    /// Cap on concurrent dispatcher calls.
    pub max_inflight_dispatches: Option<usize>,
    /// Log payload parse failures.
    pub verbose: bool,
}

impl ClientOptions {
    /// Options from the `connection` settings section.
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            fetch_timeout: Duration::from_millis(settings.fetch_timeout_ms),
            fetch_retry_delay: Duration::from_millis(settings.fetch_retry_delay_ms),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            chunk_ttl: (settings.chunk_ttl_ms > 0)
                .then(|| Duration::from_millis(settings.chunk_ttl_ms)),
            max_inflight_dispatches: settings.max_inflight_dispatches,
            verbose: settings.verbose,
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_settings(&ConnectionSettings::default())
    }
}

/// How [`Supervisor::run`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The cancellation token fired.
    Cancelled,
    /// Consecutive failures used up the server's reconnect budget.
    BudgetExhausted {
        /// Failures counted when the supervisor gave up.
        attempts: u32,
    },
}

/// Keeps one gateway connection alive.
pub struct Supervisor {
    endpoint: EndpointClient,
    options: ClientOptions,
    dispatch: DispatchHandle,
    status: Option<Arc<dyn StatusSink>>,
}

impl Supervisor {
    /// Supervisor over an existing endpoint client.
    pub fn new(
        endpoint: EndpointClient,
        options: ClientOptions,
        dispatcher: Arc<dyn EventDispatcher>,
    ) -> Self {
        let dispatch = DispatchHandle::new(dispatcher, options.max_inflight_dispatches);
        Self {
            endpoint,
            options,
            dispatch,
            status: None,
        }
    }

    /// Supervisor configured from loaded settings.
    pub fn from_settings(
        settings: &PushlinkSettings,
        dispatcher: Arc<dyn EventDispatcher>,
    ) -> Result<Self, EndpointError> {
        let options = ClientOptions::from_settings(&settings.connection);
        let credentials =
            Credentials::new(&settings.account.app_id, &settings.account.app_secret);
        let endpoint =
            EndpointClient::new(&settings.account.domain, credentials, options.fetch_timeout)?;
        Ok(Self::new(endpoint, options, dispatcher))
    }

    /// Report inbound activity to `sink`.
    #[must_use]
    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status = Some(sink);
        self
    }

    /// Run until cancelled or the reconnect budget is spent.
    pub async fn run(&self, cancel: &CancellationToken) -> SupervisorExit {
        let mut attempts: u32 = 0;

        loop {
            let Some(policy) = self.fetch_policy(cancel).await else {
                return SupervisorExit::Cancelled;
            };

            match self.connect(&policy.connect_url, cancel).await {
                Ok(ws) => {
                    attempts = 0;
                    info!(service_id = policy.service_id, "connected");
                    match self.run_session(&policy, ws, cancel).await {
                        SessionEnd::Cancelled => return SupervisorExit::Cancelled,
                        SessionEnd::Closed => {
                            info!(service_id = policy.service_id, "connection closed");
                        }
                        SessionEnd::Failed(err) => {
                            warn!(service_id = policy.service_id, error = %err, "connection lost");
                        }
                    }
                }
                Err(ConnectionError::Cancelled) => return SupervisorExit::Cancelled,
                Err(err) => warn!(error = %err, "connect failed"),
            }

            if cancel.is_cancelled() {
                return SupervisorExit::Cancelled;
            }

            attempts = attempts.saturating_add(1);
            if policy.reconnect_budget.is_exhausted(attempts) {
                let limit = match policy.reconnect_budget {
                    ReconnectBudget::Limited(limit) => limit,
                    ReconnectBudget::Unlimited => u32::MAX,
                };
                error!(attempts, limit, "reconnect budget exhausted, giving up");
                return SupervisorExit::BudgetExhausted { attempts };
            }

            let delay = policy.jittered_backoff();
            info!(attempt = attempts, delay_ms = millis(delay), "reconnecting");
            if !sleep_or_cancel(delay, cancel).await {
                return SupervisorExit::Cancelled;
            }
        }
    }

    async fn fetch_policy(&self, cancel: &CancellationToken) -> Option<ConnectPolicy> {
        loop {
            match self.endpoint.fetch(cancel).await {
                Ok(policy) => return Some(policy),
                Err(EndpointError::Cancelled) => return None,
                Err(err) => {
                    warn!(
                        error = %err,
                        retry_in_ms = millis(self.options.fetch_retry_delay),
                        "failed to fetch connect config"
                    );
                    if !sleep_or_cancel(self.options.fetch_retry_delay, cancel).await {
                        return None;
                    }
                }
            }
        }
    }

    async fn connect(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<WsStream, ConnectionError> {
        let handshake = tokio::time::timeout(self.options.connect_timeout, connect_async(url));
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ConnectionError::Cancelled),
            result = handshake => match result {
                Err(_) => Err(ConnectionError::Timeout {
                    timeout_ms: millis(self.options.connect_timeout),
                }),
                Ok(Err(err)) => Err(ConnectionError::Connect(Box::new(err))),
                Ok(Ok((ws, _response))) => Ok(ws),
            },
        }
    }

    async fn run_session(
        &self,
        policy: &ConnectPolicy,
        ws: WsStream,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let options = SessionOptions {
            app_id: self.endpoint.credentials().app_id.clone(),
            chunk_ttl: self.options.chunk_ttl,
            verbose: self.options.verbose,
        };
        let session =
            ConnectionSession::new(policy, options, self.dispatch.clone(), self.status.clone());
        let (sink, stream) = ws.split();
        session.run(sink, stream, cancel).await
    }
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
