//! # pushlink-wire
//!
//! Binary frame codec for the pushlink long-connection protocol.
//!
//! Every message on the gateway socket is one [`Frame`], serialized with a
//! fixed protobuf-compatible field layout:
//!
//! | tag | field              | encoding                     |
//! |-----|--------------------|------------------------------|
//! | 1   | `seq_id`           | varint                       |
//! | 2   | `log_id`           | varint                       |
//! | 3   | `service`          | varint                       |
//! | 4   | `method`           | varint (0 control, 1 data)   |
//! | 5   | `headers`          | repeated `{1: key, 2: value}`|
//! | 6   | `payload_encoding` | string                       |
//! | 7   | `payload_type`     | string                       |
//! | 8   | `payload`          | bytes                        |
//! | 9   | `log_id_new`       | string                       |
//!
//! Only this layout is supported; the crate is not a general protobuf
//! implementation.

#![deny(unsafe_code)]

pub mod codec;
pub mod constants;
pub mod errors;
pub mod frame;
pub mod varint;

pub use codec::{decode, encode};
pub use errors::FrameDecodeError;
pub use frame::{Frame, FrameType, Header, Method};
