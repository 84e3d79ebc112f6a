//! Base-128 varints and the wire-type primitives used by the frame layout.
//!
//! Writers append to a `Vec<u8>`; [`Reader`] is a bounds-checked cursor that
//! reports truncation as [`FrameDecodeError::UnexpectedEof`].

use crate::errors::FrameDecodeError;

/// Maximum encoded length of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Wire types the decoder knows how to read or skip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireType {
    /// Base-128 varint.
    Varint,
    /// Eight little-endian bytes.
    Fixed64,
    /// Varint length followed by that many bytes.
    LengthDelimited,
    /// Four little-endian bytes.
    Fixed32,
}

impl WireType {
    /// Interpret the low three bits of a field key.
    pub fn from_raw(raw: u8, field: u64) -> Result<Self, FrameDecodeError> {
        match raw {
            0 => Ok(Self::Varint),
            1 => Ok(Self::Fixed64),
            2 => Ok(Self::LengthDelimited),
            5 => Ok(Self::Fixed32),
            wire_type => Err(FrameDecodeError::UnsupportedWireType { field, wire_type }),
        }
    }

    /// Raw wire type bits.
    pub const fn as_raw(self) -> u8 {
        match self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::Fixed32 => 5,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Writing
// ─────────────────────────────────────────────────────────────────────────────

/// Append `value` as a varint.
#[allow(clippy::cast_possible_truncation)]
pub fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Append a field key (`field << 3 | wire_type`).
pub fn put_key(buf: &mut Vec<u8>, field: u64, wire_type: WireType) {
    put_varint(buf, (field << 3) | u64::from(wire_type.as_raw()));
}

/// Append a length-delimited field.
pub fn put_bytes(buf: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    put_key(buf, field, WireType::LengthDelimited);
    put_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Append a varint field.
pub fn put_uint(buf: &mut Vec<u8>, field: u64, value: u64) {
    put_key(buf, field, WireType::Varint);
    put_varint(buf, value);
}

/// Append a signed 32-bit varint field. Negative values are sign-extended to
/// 64 bits, matching protobuf `int32`.
#[allow(clippy::cast_sign_loss)]
pub fn put_int32(buf: &mut Vec<u8>, field: u64, value: i32) {
    put_uint(buf, field, i64::from(value) as u64);
}

// ─────────────────────────────────────────────────────────────────────────────
// Reading
// ─────────────────────────────────────────────────────────────────────────────

/// Bounds-checked cursor over an encoded buffer.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Start reading at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Whether every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Read one varint.
    pub fn read_varint(&mut self) -> Result<u64, FrameDecodeError> {
        let mut value = 0u64;
        for index in 0..MAX_VARINT_LEN {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or(FrameDecodeError::UnexpectedEof)?;
            self.pos += 1;
            value |= u64::from(byte & 0x7f) << (7 * index);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(FrameDecodeError::VarintOverflow)
    }

    /// Read a field key, returning the field number and wire type.
    pub fn read_key(&mut self) -> Result<(u64, WireType), FrameDecodeError> {
        let key = self.read_varint()?;
        let field = key >> 3;
        #[allow(clippy::cast_possible_truncation)]
        let wire_type = WireType::from_raw((key & 0x07) as u8, field)?;
        Ok((field, wire_type))
    }

    /// Read a length-delimited slice.
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], FrameDecodeError> {
        let len = usize::try_from(self.read_varint()?)
            .map_err(|_| FrameDecodeError::UnexpectedEof)?;
        self.take(len)
    }

    /// Read a length-delimited UTF-8 string.
    pub fn read_string(&mut self, field: u64) -> Result<String, FrameDecodeError> {
        let bytes = self.read_length_delimited()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FrameDecodeError::InvalidUtf8 { field })
    }

    /// Skip over one field value of the given wire type.
    pub fn skip(&mut self, wire_type: WireType) -> Result<(), FrameDecodeError> {
        match wire_type {
            WireType::Varint => self.read_varint().map(drop),
            WireType::Fixed64 => self.take(8).map(drop),
            WireType::LengthDelimited => self.read_length_delimited().map(drop),
            WireType::Fixed32 => self.take(4).map(drop),
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FrameDecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(FrameDecodeError::UnexpectedEof)?;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or(FrameDecodeError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
