//! Frame decoding errors.

use thiserror::Error;

/// Errors that can occur while decoding a [`Frame`](crate::Frame).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FrameDecodeError {
    /// The buffer ended in the middle of a field.
    #[error("unexpected EOF")]
    UnexpectedEof,
    /// A varint ran past the ten bytes a 64-bit value can occupy.
    #[error("varint overflow")]
    VarintOverflow,
    /// A field used a wire type the frame layout never produces.
    #[error("unsupported wire type {wire_type} for field {field}")]
    UnsupportedWireType {
        /// Field number of the offending key.
        field: u64,
        /// Raw wire type bits.
        wire_type: u8,
    },
    /// One of `seq_id`, `log_id`, `service` or `method` was absent.
    #[error("missing required fields")]
    MissingRequiredFields,
    /// A string field did not hold valid UTF-8.
    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 {
        /// Field number of the string.
        field: u64,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
