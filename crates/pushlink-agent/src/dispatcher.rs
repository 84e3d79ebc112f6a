//! Event handling for the standalone agent: every event is logged.

use async_trait::async_trait;
use serde_json::Value;

use pushlink_client::{DispatchContext, EventDispatcher, InboundStatus};

/// Dispatcher that logs each event's type and ids.
pub struct LoggingDispatcher;

#[async_trait]
impl EventDispatcher for LoggingDispatcher {
    async fn dispatch(&self, event: Value, ctx: DispatchContext) -> anyhow::Result<()> {
        let event_type = event_type(&event).unwrap_or("unknown");
        tracing::info!(
            app_id = %ctx.app_id,
            message_id = %ctx.message_id,
            trace_id = ctx.trace_id.as_deref().unwrap_or(""),
            event_type,
            "event received"
        );
        Ok(())
    }
}

/// Event type of a decoded payload.
///
/// Current events carry `header.event_type`; older ones `event.type` or a
/// top-level `type`.
pub fn event_type(event: &Value) -> Option<&str> {
    ["/header/event_type", "/event/type", "/type"]
        .into_iter()
        .find_map(|pointer| event.pointer(pointer).and_then(Value::as_str))
}

/// Status sink that traces liveness.
pub fn log_inbound(status: InboundStatus) {
    tracing::trace!(last_inbound_at = %status.last_inbound_at, "inbound activity");
}
