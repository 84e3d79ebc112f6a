//! Header keys and values carried in frame headers.

/// Header naming the frame type (`ping`, `pong`, `event`).
pub const HEADER_TYPE: &str = "type";
/// Header carrying the logical message id shared by all chunks.
pub const HEADER_MESSAGE_ID: &str = "message_id";
/// Header carrying the total number of chunks.
pub const HEADER_SUM: &str = "sum";
/// Header carrying the zero-based chunk index.
pub const HEADER_SEQ: &str = "seq";
/// Header carrying the server trace id.
pub const HEADER_TRACE_ID: &str = "trace_id";
/// Header added to acks with the processing time in milliseconds.
pub const HEADER_BIZ_RT: &str = "biz_rt";

/// Client keepalive request.
pub const TYPE_PING: &str = "ping";
/// Server keepalive response.
pub const TYPE_PONG: &str = "pong";
/// Application event delivery.
pub const TYPE_EVENT: &str = "event";

/// Raw method value for control frames.
pub const METHOD_CONTROL: i32 = 0;
/// Raw method value for data frames.
pub const METHOD_DATA: i32 = 1;
