//! Frame types.

use crate::constants::{HEADER_TYPE, METHOD_CONTROL, METHOD_DATA, TYPE_EVENT, TYPE_PING, TYPE_PONG};

/// Frame method: keepalive traffic or application data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// Ping/pong and other connection-level frames.
    Control,
    /// Event payloads and their acks.
    Data,
    /// Any other value, preserved so it survives a round-trip.
    Other(i32),
}

impl From<i32> for Method {
    fn from(raw: i32) -> Self {
        match raw {
            METHOD_CONTROL => Self::Control,
            METHOD_DATA => Self::Data,
            other => Self::Other(other),
        }
    }
}

impl From<Method> for i32 {
    fn from(method: Method) -> Self {
        match method {
            Method::Control => METHOD_CONTROL,
            Method::Data => METHOD_DATA,
            Method::Other(raw) => raw,
        }
    }
}

/// Value of the `type` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameType {
    /// Client keepalive.
    Ping,
    /// Server keepalive response, may carry a refreshed client config.
    Pong,
    /// Application event.
    Event,
}

impl FrameType {
    /// Parse a `type` header value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            TYPE_PING => Some(Self::Ping),
            TYPE_PONG => Some(Self::Pong),
            TYPE_EVENT => Some(Self::Event),
            _ => None,
        }
    }

    /// Wire value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ping => TYPE_PING,
            Self::Pong => TYPE_PONG,
            Self::Event => TYPE_EVENT,
        }
    }
}

/// One key/value frame header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Header name.
    pub key: String,
    /// Header value.
    pub value: String,
}

impl Header {
    /// Build a header.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One message unit on the gateway socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Sequence id assigned by the sender.
    pub seq_id: u64,
    /// Server log id.
    pub log_id: u64,
    /// Service id the connection was issued for.
    pub service: i32,
    /// Control or data.
    pub method: Method,
    /// Ordered headers; keys may repeat.
    pub headers: Vec<Header>,
    /// Payload content encoding.
    pub payload_encoding: Option<String>,
    /// Payload content type.
    pub payload_type: Option<String>,
    /// Raw payload bytes.
    pub payload: Option<Vec<u8>>,
    /// String form of the log id used by newer servers.
    pub log_id_new: Option<String>,
}

impl Frame {
    /// A frame with no headers or payload.
    pub fn new(service: i32, method: Method) -> Self {
        Self {
            seq_id: 0,
            log_id: 0,
            service,
            method,
            headers: Vec::new(),
            payload_encoding: None,
            payload_type: None,
            payload: None,
            log_id_new: None,
        }
    }

    /// The keepalive frame the client sends every ping interval.
    pub fn ping(service: i32) -> Self {
        Self::new(service, Method::Control).with_header(HEADER_TYPE, TYPE_PING)
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(key, value));
        self
    }

    /// Replace the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Value of the first header named `key`.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key == key)
            .map(|h| h.value.as_str())
    }

    /// Parsed `type` header.
    pub fn frame_type(&self) -> Option<FrameType> {
        self.header(HEADER_TYPE).and_then(FrameType::parse)
    }

    /// Payload bytes, empty when absent.
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_from_raw() {
        assert_eq!(Method::from(0), Method::Control);
        assert_eq!(Method::from(1), Method::Data);
        assert_eq!(Method::from(7), Method::Other(7));
        assert_eq!(i32::from(Method::Other(-3)), -3);
    }

    #[test]
    fn ping_frame_shape() {
        let frame = Frame::ping(42);
        assert_eq!(frame.service, 42);
        assert_eq!(frame.method, Method::Control);
        assert_eq!(frame.seq_id, 0);
        assert_eq!(frame.frame_type(), Some(FrameType::Ping));
        assert!(frame.payload.is_none());
    }

    #[test]
    fn header_returns_first_match() {
        let frame = Frame::new(1, Method::Data)
            .with_header("k", "first")
            .with_header("k", "second");
        assert_eq!(frame.header("k"), Some("first"));
        assert_eq!(frame.header("missing"), None);
    }

    #[test]
    fn unknown_type_header() {
        let frame = Frame::new(1, Method::Data).with_header(HEADER_TYPE, "bogus");
        assert_eq!(frame.frame_type(), None);
    }

    #[test]
    fn frame_type_strings() {
        for t in [FrameType::Ping, FrameType::Pong, FrameType::Event] {
            assert_eq!(FrameType::parse(t.as_str()), Some(t));
        }
        assert_eq!(FrameType::parse("card"), None);
    }

    #[test]
    fn payload_bytes_default_empty() {
        let frame = Frame::new(1, Method::Data);
        assert!(frame.payload_bytes().is_empty());
        let frame = frame.with_payload(b"abc".to_vec());
        assert_eq!(frame.payload_bytes(), b"abc");
    }
}
