//! Frame encoding and decoding.
//!
//! Encoding writes fields in ascending tag order. The four required fields
//! are always written, even when zero; optional fields are written only when
//! present. Decoding accepts fields in any order, skips unknown field numbers
//! by wire type, and rejects frames missing a required field.

use crate::errors::FrameDecodeError;
use crate::frame::{Frame, Header, Method};
use crate::varint::{Reader, WireType, put_bytes, put_int32, put_uint};

const FIELD_SEQ_ID: u64 = 1;
const FIELD_LOG_ID: u64 = 2;
const FIELD_SERVICE: u64 = 3;
const FIELD_METHOD: u64 = 4;
const FIELD_HEADERS: u64 = 5;
const FIELD_PAYLOAD_ENCODING: u64 = 6;
const FIELD_PAYLOAD_TYPE: u64 = 7;
const FIELD_PAYLOAD: u64 = 8;
const FIELD_LOG_ID_NEW: u64 = 9;

const HEADER_FIELD_KEY: u64 = 1;
const HEADER_FIELD_VALUE: u64 = 2;

/// Serialize a frame.
pub fn encode(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 + frame.payload_bytes().len());

    put_uint(&mut buf, FIELD_SEQ_ID, frame.seq_id);
    put_uint(&mut buf, FIELD_LOG_ID, frame.log_id);
    put_int32(&mut buf, FIELD_SERVICE, frame.service);
    put_int32(&mut buf, FIELD_METHOD, frame.method.into());

    let mut scratch = Vec::new();
    for header in &frame.headers {
        scratch.clear();
        put_bytes(&mut scratch, HEADER_FIELD_KEY, header.key.as_bytes());
        put_bytes(&mut scratch, HEADER_FIELD_VALUE, header.value.as_bytes());
        put_bytes(&mut buf, FIELD_HEADERS, &scratch);
    }

    if let Some(encoding) = &frame.payload_encoding {
        put_bytes(&mut buf, FIELD_PAYLOAD_ENCODING, encoding.as_bytes());
    }
    if let Some(payload_type) = &frame.payload_type {
        put_bytes(&mut buf, FIELD_PAYLOAD_TYPE, payload_type.as_bytes());
    }
    if let Some(payload) = &frame.payload {
        put_bytes(&mut buf, FIELD_PAYLOAD, payload);
    }
    if let Some(log_id_new) = &frame.log_id_new {
        put_bytes(&mut buf, FIELD_LOG_ID_NEW, log_id_new.as_bytes());
    }

    buf
}

/// Parse a frame.
#[allow(clippy::cast_possible_truncation)]
pub fn decode(bytes: &[u8]) -> Result<Frame, FrameDecodeError> {
    let mut reader = Reader::new(bytes);

    let mut seq_id = None;
    let mut log_id = None;
    let mut service = None;
    let mut method = None;
    let mut headers = Vec::new();
    let mut payload_encoding = None;
    let mut payload_type = None;
    let mut payload = None;
    let mut log_id_new = None;

    while !reader.is_empty() {
        let (field, wire_type) = reader.read_key()?;
        match (field, wire_type) {
            (FIELD_SEQ_ID, WireType::Varint) => seq_id = Some(reader.read_varint()?),
            (FIELD_LOG_ID, WireType::Varint) => log_id = Some(reader.read_varint()?),
            (FIELD_SERVICE, WireType::Varint) => service = Some(reader.read_varint()? as i32),
            (FIELD_METHOD, WireType::Varint) => {
                method = Some(Method::from(reader.read_varint()? as i32));
            }
            (FIELD_HEADERS, WireType::LengthDelimited) => {
                headers.push(decode_header(reader.read_length_delimited()?)?);
            }
            (FIELD_PAYLOAD_ENCODING, WireType::LengthDelimited) => {
                payload_encoding = Some(reader.read_string(field)?);
            }
            (FIELD_PAYLOAD_TYPE, WireType::LengthDelimited) => {
                payload_type = Some(reader.read_string(field)?);
            }
            (FIELD_PAYLOAD, WireType::LengthDelimited) => {
                payload = Some(reader.read_length_delimited()?.to_vec());
            }
            (FIELD_LOG_ID_NEW, WireType::LengthDelimited) => {
                log_id_new = Some(reader.read_string(field)?);
            }
            (_, wire_type) => reader.skip(wire_type)?,
        }
    }

    let (Some(seq_id), Some(log_id), Some(service), Some(method)) =
        (seq_id, log_id, service, method)
    else {
        return Err(FrameDecodeError::MissingRequiredFields);
    };

    Ok(Frame {
        seq_id,
        log_id,
        service,
        method,
        headers,
        payload_encoding,
        payload_type,
        payload,
        log_id_new,
    })
}

fn decode_header(bytes: &[u8]) -> Result<Header, FrameDecodeError> {
    let mut reader = Reader::new(bytes);
    let mut header = Header::default();
    while !reader.is_empty() {
        let (field, wire_type) = reader.read_key()?;
        match (field, wire_type) {
            (HEADER_FIELD_KEY, WireType::LengthDelimited) => {
                header.key = reader.read_string(field)?;
            }
            (HEADER_FIELD_VALUE, WireType::LengthDelimited) => {
                header.value = reader.read_string(field)?;
            }
            (_, wire_type) => reader.skip(wire_type)?,
        }
    }
    Ok(header)
}

impl Frame {
    /// Serialize this frame. See [`encode`].
    pub fn encode(&self) -> Vec<u8> {
        encode(self)
    }

    /// Parse a frame. See [`decode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameDecodeError> {
        decode(bytes)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
