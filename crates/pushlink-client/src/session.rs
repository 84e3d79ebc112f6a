//! One live gateway connection.
//!
//! A [`ConnectionSession`] owns everything scoped to a single socket: the
//! ping deadline and the chunk cache. It runs as one task that selects over
//! the cancellation token, the ping deadline and inbound messages, in that
//! priority order. A due ping is also sent before each inbound message is
//! handled, so a backlog of frames never holds back the keepalive. Every
//! socket write races the cancellation token. Nothing survives the session;
//! a reconnect builds a new one.
//!
//! Frame handling:
//!
//! | method  | `type`  | action                                              |
//! |---------|---------|-----------------------------------------------------|
//! | control | `pong`  | adopt `PingInterval` from the JSON payload, if any  |
//! | data    | `event` | reassemble, ack, report status, dispatch            |
//! | other   | any     | ignored                                             |

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{Value, json};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use pushlink_wire::constants::{
    HEADER_BIZ_RT, HEADER_MESSAGE_ID, HEADER_SEQ, HEADER_SUM, HEADER_TRACE_ID, HEADER_TYPE,
};
use pushlink_wire::{Frame, FrameType, Header, Method};

use crate::chunks::{ChunkCache, ChunkOutcome, MAX_CHUNK_COUNT};
use crate::dispatch::{DispatchContext, DispatchHandle, InboundStatus, StatusSink};
use crate::errors::ConnectionError;
use crate::policy::{self, ConnectPolicy};

/// Ack code for an event that was decoded and handed to the dispatcher.
pub const ACK_OK: u16 = 200;

/// Ack code for an event whose payload was not valid JSON.
pub const ACK_INTERNAL_ERROR: u16 = 500;

/// Per-connection settings that do not come from the server.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Application id, copied into every [`DispatchContext`].
    pub app_id: String,
    /// Age at which incomplete chunk buffers are dropped.
    pub chunk_ttl: Option<Duration>,
    /// Log payload parse failures.
    pub verbose: bool,
}

/// Why a session stopped.
#[derive(Debug)]
pub enum SessionEnd {
    /// The cancellation token fired.
    Cancelled,
    /// The peer closed the socket or the stream ended.
    Closed,
    /// Reading or writing the socket failed.
    Failed(ConnectionError),
}

/// Validated headers of an event data frame.
#[derive(Clone, Debug, PartialEq, Eq)]
struct EventHeaders {
    message_id: String,
    sum: usize,
    seq: usize,
    trace_id: Option<String>,
}

impl EventHeaders {
    fn parse(frame: &Frame) -> Option<Self> {
        let message_id = frame.header(HEADER_MESSAGE_ID).filter(|id| !id.is_empty())?;
        let sum = parse_count(frame.header(HEADER_SUM)?)?;
        let seq = parse_count(frame.header(HEADER_SEQ)?)?;
        if sum == 0 || sum > MAX_CHUNK_COUNT || seq >= sum {
            return None;
        }
        Some(Self {
            message_id: message_id.to_owned(),
            sum,
            seq,
            trace_id: frame.header(HEADER_TRACE_ID).map(str::to_owned),
        })
    }
}

fn parse_count(raw: &str) -> Option<usize> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// A fully reassembled event, ready to be acknowledged.
struct CompletedEvent {
    ack: Frame,
    event: Option<(Value, DispatchContext)>,
}

/// State machine for one open socket.
pub struct ConnectionSession {
    service_id: i32,
    ping_interval: Duration,
    next_ping: Instant,
    chunks: ChunkCache,
    dispatch: DispatchHandle,
    status: Option<Arc<dyn StatusSink>>,
    options: SessionOptions,
}

impl ConnectionSession {
    /// Build a session for a freshly opened socket.
    pub fn new(
        policy: &ConnectPolicy,
        options: SessionOptions,
        dispatch: DispatchHandle,
        status: Option<Arc<dyn StatusSink>>,
    ) -> Self {
        Self {
            service_id: policy.service_id,
            ping_interval: policy::clamp_ping_interval(policy.ping_interval),
            next_ping: Instant::now(),
            chunks: ChunkCache::new(options.chunk_ttl),
            dispatch,
            status,
            options,
        }
    }

    /// Current ping interval.
    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Drive the session until cancellation, peer close or a socket error.
    ///
    /// The first ping goes out immediately.
    pub async fn run<S, R>(
        mut self,
        mut sink: S,
        mut stream: R,
        cancel: &CancellationToken,
    ) -> SessionEnd
    where
        S: Sink<Message, Error = WsError> + Unpin,
        R: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        debug!(
            service_id = self.service_id,
            ping_interval_ms = self.ping_interval.as_millis(),
            "session open"
        );
        self.next_ping = Instant::now();

        loop {
            let step = tokio::select! {
                biased;

                () = cancel.cancelled() => return SessionEnd::Cancelled,

                () = tokio::time::sleep_until(self.next_ping) => {
                    self.send_ping(&mut sink, cancel).await
                }

                message = stream.next() => match message {
                    Some(Ok(Message::Binary(bytes))) => {
                        match self.ping_if_due(&mut sink, cancel).await {
                            Ok(()) => self.handle_binary(&bytes, &mut sink, cancel).await,
                            Err(err) => Err(err),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(service_id = self.service_id, close = ?frame, "peer closed socket");
                        return SessionEnd::Closed;
                    }
                    Some(Ok(_)) => Ok(()),
                    Some(Err(err)) => Err(err.into()),
                    None => return SessionEnd::Closed,
                },
            };

            match step {
                Ok(()) => {}
                Err(ConnectionError::Cancelled) => return SessionEnd::Cancelled,
                Err(err) => return SessionEnd::Failed(err),
            }
        }
    }

    async fn send_ping<S>(
        &mut self,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectionError>
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        send_frame(sink, &Frame::ping(self.service_id), cancel).await?;
        trace!(service_id = self.service_id, "ping sent");
        self.next_ping = Instant::now() + self.ping_interval;
        Ok(())
    }

    async fn ping_if_due<S>(
        &mut self,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectionError>
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        if Instant::now() < self.next_ping {
            return Ok(());
        }
        self.send_ping(sink, cancel).await
    }

    async fn handle_binary<S>(
        &mut self,
        bytes: &[u8],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectionError>
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, len = bytes.len(), "dropping undecodable frame");
                return Ok(());
            }
        };

        match frame.method {
            Method::Control => {
                self.handle_control(&frame);
                Ok(())
            }
            Method::Data => match self.handle_data(frame) {
                Some(completed) => self.acknowledge(completed, sink, cancel).await,
                None => Ok(()),
            },
            Method::Other(raw) => {
                debug!(method = raw, "ignoring frame with unknown method");
                Ok(())
            }
        }
    }

    fn handle_control(&mut self, frame: &Frame) {
        if frame.frame_type() != Some(FrameType::Pong) {
            trace!(frame_type = ?frame.header(HEADER_TYPE), "ignoring control frame");
            return;
        }
        let Some(interval) = pong_ping_interval(frame.payload_bytes()) else {
            return;
        };
        self.ping_interval = interval;
        self.next_ping = Instant::now() + interval;
        debug!(
            service_id = self.service_id,
            ping_interval_ms = interval.as_millis(),
            "ping interval updated"
        );
    }

    fn handle_data(&mut self, mut frame: Frame) -> Option<CompletedEvent> {
        let started = Instant::now();
        if frame.frame_type() != Some(FrameType::Event) {
            trace!("ignoring non-event data frame");
            return None;
        }
        let Some(headers) = EventHeaders::parse(&frame) else {
            debug!("dropping event frame with invalid headers");
            return None;
        };
        let payload = match frame.payload.take() {
            Some(payload) if !payload.is_empty() => payload,
            _ => {
                debug!(message_id = %headers.message_id, "dropping event frame without payload");
                return None;
            }
        };

        let complete = match self
            .chunks
            .insert(&headers.message_id, headers.sum, headers.seq, payload)
        {
            ChunkOutcome::Complete(bytes) => bytes,
            ChunkOutcome::Pending => {
                trace!(
                    message_id = %headers.message_id,
                    seq = headers.seq,
                    sum = headers.sum,
                    "chunk buffered"
                );
                return None;
            }
            outcome @ (ChunkOutcome::Duplicate | ChunkOutcome::OutOfRange) => {
                debug!(
                    message_id = %headers.message_id,
                    seq = headers.seq,
                    ?outcome,
                    "ignoring chunk"
                );
                return None;
            }
        };

        let (code, event) = match serde_json::from_slice::<Value>(&complete) {
            Ok(value) => (ACK_OK, Some(value)),
            Err(err) => {
                if self.options.verbose {
                    debug!(
                        message_id = %headers.message_id,
                        error = %err,
                        "event payload is not valid JSON"
                    );
                }
                (ACK_INTERNAL_ERROR, None)
            }
        };

        let ack = build_ack(frame, code, started.elapsed());
        let event = event.map(|value| {
            let ctx = DispatchContext {
                app_id: self.options.app_id.clone(),
                message_id: headers.message_id,
                trace_id: headers.trace_id,
                received_at: Utc::now(),
            };
            (value, ctx)
        });
        Some(CompletedEvent { ack, event })
    }

    async fn acknowledge<S>(
        &self,
        completed: CompletedEvent,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<(), ConnectionError>
    where
        S: Sink<Message, Error = WsError> + Unpin,
    {
        send_frame(sink, &completed.ack, cancel).await?;

        let Some((event, ctx)) = completed.event else {
            return Ok(());
        };
        if let Some(status) = &self.status {
            status.record_inbound(InboundStatus {
                last_inbound_at: ctx.received_at,
            });
        }
        debug!(message_id = %ctx.message_id, "event acknowledged");
        drop(self.dispatch.spawn(event, ctx));
        Ok(())
    }
}

/// Turn the completing data frame into its ack.
///
/// Keeps the frame's ids and headers, appends `biz_rt` and replaces the
/// payload with `{"code": code}`.
pub fn build_ack(mut frame: Frame, code: u16, elapsed: Duration) -> Frame {
    frame
        .headers
        .push(Header::new(HEADER_BIZ_RT, elapsed.as_millis().to_string()));
    frame.payload = Some(json!({ "code": code }).to_string().into_bytes());
    frame
}

fn pong_ping_interval(payload: &[u8]) -> Option<Duration> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    let secs = value.get("PingInterval")?.as_f64()?;
    let interval = Duration::try_from_secs_f64(secs).ok()?;
    Some(policy::clamp_ping_interval(interval))
}

/// Write one frame, giving up with [`ConnectionError::Cancelled`] if the
/// token fires while the sink is not ready.
async fn send_frame<S>(
    sink: &mut S,
    frame: &Frame,
    cancel: &CancellationToken,
) -> Result<(), ConnectionError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ConnectionError::Cancelled),
        result = sink.send(Message::binary(frame.encode())) => {
            result?;
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
