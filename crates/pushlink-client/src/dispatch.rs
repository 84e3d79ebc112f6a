//! Hand-off of decoded events to user code.
//!
//! Events are dispatched on detached tasks so a slow dispatcher never stalls
//! the read loop or the ping timer. Dispatcher errors and panics are caught
//! and logged; they never reach the session.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Metadata that travels with every dispatched event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchContext {
    /// Application id the connection was opened for.
    pub app_id: String,
    /// Gateway message id.
    pub message_id: String,
    /// Trace id header, when the server sent one.
    pub trace_id: Option<String>,
    /// When the final chunk arrived.
    pub received_at: DateTime<Utc>,
}

/// Consumer of decoded events.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Handle one event. The event has already been acknowledged.
    async fn dispatch(&self, event: Value, ctx: DispatchContext) -> anyhow::Result<()>;
}

/// Inbound activity report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InboundStatus {
    /// When the event was accepted.
    pub last_inbound_at: DateTime<Utc>,
}

/// Receiver of inbound activity reports.
pub trait StatusSink: Send + Sync {
    /// Record that an event was accepted.
    fn record_inbound(&self, status: InboundStatus);
}

impl<F> StatusSink for F
where
    F: Fn(InboundStatus) + Send + Sync,
{
    fn record_inbound(&self, status: InboundStatus) {
        self(status);
    }
}

/// Spawns dispatcher calls, optionally bounded by a semaphore.
#[derive(Clone)]
pub struct DispatchHandle {
    dispatcher: Arc<dyn EventDispatcher>,
    limit: Option<Arc<Semaphore>>,
}

impl DispatchHandle {
    /// Wrap `dispatcher`. `max_inflight` caps concurrent calls; `None` leaves
    /// them unbounded.
    pub fn new(dispatcher: Arc<dyn EventDispatcher>, max_inflight: Option<usize>) -> Self {
        Self {
            dispatcher,
            limit: max_inflight.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    /// Run the dispatcher for `event` on a detached task.
    ///
    /// The permit is acquired inside the task, so the caller never waits.
    pub fn spawn(&self, event: Value, ctx: DispatchContext) -> JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let limit = self.limit.clone();

        tokio::spawn(async move {
            let _permit = match limit {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };

            let message_id = ctx.message_id.clone();
            let call = async move { dispatcher.dispatch(event, ctx).await };
            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(())) => debug!(message_id = %message_id, "event dispatched"),
                Ok(Err(err)) => {
                    error!(message_id = %message_id, error = %err, "event dispatcher failed");
                }
                Err(panic) => {
                    error!(
                        message_id = %message_id,
                        panic = panic_message(panic.as_ref()),
                        "event dispatcher panicked"
                    );
                }
            }
        })
    }
}

impl std::fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandle")
            .field(
                "available_permits",
                &self.limit.as_ref().map(|s| s.available_permits()),
            )
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
