//! Protocol buffer wire format primitives.
//!
//! Only what a reader needs: keys, varints, fixed-width scalars,
//! length-delimited payloads and skipping of (deprecated) groups. Fields are
//! yielded in encounter order and interpreted by the message decoders in
//! [`crate::realtime::feed`].

use bytes::Buf;
use tracing::debug;

use crate::error::DecodeError;

/// The six wire types of the protobuf encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    StartGroup,
    EndGroup,
    Fixed32,
}

impl TryFrom<u8> for WireType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            other => Err(DecodeError::InvalidWireType(other)),
        }
    }
}

/// Deepest nesting of groups skipped inside one field.
pub const GROUP_DEPTH_LIMIT: usize = 100;

/// A message type that can be decoded from its serialized body.
///
/// Decoding follows the protobuf merge rules: a message body may arrive in
/// several occurrences of the same field, which are merged into one value
/// (later scalars win, repeated fields append, sub-messages merge
/// recursively). Required fields are only checked once everything has been
/// merged.
pub trait WireMessage: Default {
    const NAME: &'static str;

    /// Applies one field of the body to `self`.
    fn merge_field(&mut self, field: Field<'_>) -> Result<(), DecodeError>;

    fn check_required(&self) -> Result<(), DecodeError> {
        Ok(())
    }

    fn merge(&mut self, buf: &[u8]) -> Result<(), DecodeError> {
        for field in FieldReader::new(buf) {
            self.merge_field(field?)?;
        }
        Ok(())
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut message = Self::default();
        message.merge(buf)?;
        message.check_required()?;
        Ok(message)
    }
}

/// Reads a base-128 varint, advancing `buf` past it.
pub fn decode_varint(buf: &mut &[u8]) -> Result<u64, DecodeError> {
    let mut value = 0u64;
    for i in 0..10 {
        if !buf.has_remaining() {
            return Err(DecodeError::Truncated { context: "varint" });
        }
        let byte = buf.get_u8();
        // The tenth byte may only carry the single remaining bit.
        if i == 9 && byte > 1 {
            return Err(DecodeError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(DecodeError::VarintOverflow)
}

/// Reads a field key and splits it into tag and wire type.
pub fn decode_key(buf: &mut &[u8]) -> Result<(u32, WireType), DecodeError> {
    let key = decode_varint(buf)?;
    let wire_type = WireType::try_from((key & 0x07) as u8)?;
    let tag = key >> 3;
    if tag == 0 || tag > u64::from(u32::MAX) {
        return Err(DecodeError::InvalidTag(tag));
    }
    Ok((tag as u32, wire_type))
}

fn take<'a>(buf: &mut &'a [u8], len: u64) -> Result<&'a [u8], DecodeError> {
    let slice: &'a [u8] = *buf;
    if len > slice.len() as u64 {
        return Err(DecodeError::LengthOutOfBounds {
            len,
            remaining: slice.len(),
        });
    }
    let (head, tail) = slice.split_at(len as usize);
    *buf = tail;
    Ok(head)
}

/// The raw payload of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Varint(u64),
    Fixed64(u64),
    LengthDelimited(&'a [u8]),
    Fixed32(u32),
    /// A group; its contents have already been skipped.
    Group,
}

impl FieldValue<'_> {
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldValue::Varint(_) => WireType::Varint,
            FieldValue::Fixed64(_) => WireType::Fixed64,
            FieldValue::LengthDelimited(_) => WireType::LengthDelimited,
            FieldValue::Fixed32(_) => WireType::Fixed32,
            FieldValue::Group => WireType::StartGroup,
        }
    }
}

/// One decoded `(tag, payload)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    pub tag: u32,
    pub value: FieldValue<'a>,
}

impl<'a> Field<'a> {
    fn ignored<T>(&self, expected: WireType) -> Option<T> {
        debug!(
            tag = self.tag,
            expected = ?expected,
            found = ?self.value.wire_type(),
            "Ignoring malformed scalar field"
        );
        None
    }

    fn varint(&self) -> Option<u64> {
        match self.value {
            FieldValue::Varint(v) => Some(v),
            _ => self.ignored(WireType::Varint),
        }
    }

    /// A `string` field; invalid UTF-8 or the wrong wire type yields `None`.
    pub fn string(&self) -> Option<String> {
        match self.value {
            FieldValue::LengthDelimited(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => Some(s.to_owned()),
                Err(_) => {
                    debug!(tag = self.tag, "Ignoring string field with invalid UTF-8");
                    None
                }
            },
            _ => self.ignored(WireType::LengthDelimited),
        }
    }

    pub fn int64(&self) -> Option<i64> {
        self.varint().map(|v| v as i64)
    }

    /// Negative `int32` values are sign-extended to ten bytes on the wire, so
    /// truncation recovers them.
    pub fn int32(&self) -> Option<i32> {
        self.varint().map(|v| v as i64 as i32)
    }

    pub fn uint64(&self) -> Option<u64> {
        self.varint()
    }

    pub fn uint32(&self) -> Option<u32> {
        self.varint().map(|v| v as u32)
    }

    pub fn bool(&self) -> Option<bool> {
        self.varint().map(|v| v != 0)
    }

    /// Merges an embedded message into `target`. Unlike scalars, a
    /// sub-message carried with the wrong wire type means the framing is
    /// wrong, which is fatal.
    pub fn merge_message<M: WireMessage>(
        &self,
        target: &mut M,
        parent: &'static str,
        field: &'static str,
    ) -> Result<(), DecodeError> {
        match self.value {
            FieldValue::LengthDelimited(bytes) => target.merge(bytes),
            other => Err(DecodeError::WireTypeMismatch {
                message: parent,
                field,
                tag: self.tag,
                expected: WireType::LengthDelimited,
                found: other.wire_type(),
            }),
        }
    }

    /// Decodes one element of a repeated message field.
    pub fn message<M: WireMessage>(
        &self,
        parent: &'static str,
        field: &'static str,
    ) -> Result<M, DecodeError> {
        let mut message = M::default();
        self.merge_message(&mut message, parent, field)?;
        Ok(message)
    }
}

/// Iterates over the fields of one message body.
///
/// The iterator stops after the first error.
pub struct FieldReader<'a> {
    buf: &'a [u8],
    failed: bool,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, failed: false }
    }

    fn read_value(&mut self, tag: u32, wire_type: WireType) -> Result<FieldValue<'a>, DecodeError> {
        match wire_type {
            WireType::Varint => decode_varint(&mut self.buf).map(FieldValue::Varint),
            WireType::Fixed64 => {
                let mut bytes = take(&mut self.buf, 8)
                    .map_err(|_| DecodeError::Truncated { context: "fixed64" })?;
                Ok(FieldValue::Fixed64(bytes.get_u64_le()))
            }
            WireType::Fixed32 => {
                let mut bytes = take(&mut self.buf, 4)
                    .map_err(|_| DecodeError::Truncated { context: "fixed32" })?;
                Ok(FieldValue::Fixed32(bytes.get_u32_le()))
            }
            WireType::LengthDelimited => {
                let len = decode_varint(&mut self.buf)?;
                take(&mut self.buf, len).map(FieldValue::LengthDelimited)
            }
            WireType::StartGroup => {
                self.skip_group(tag)?;
                Ok(FieldValue::Group)
            }
            WireType::EndGroup => Err(DecodeError::UnexpectedEndGroup(tag)),
        }
    }

    /// Skips a group and everything nested in it. Open groups are tracked
    /// on an explicit stack so hostile nesting cannot exhaust the call stack.
    fn skip_group(&mut self, tag: u32) -> Result<(), DecodeError> {
        let mut open = vec![tag];
        while let Some(&current) = open.last() {
            if self.buf.is_empty() {
                return Err(DecodeError::Truncated { context: "group" });
            }
            let (inner, wire_type) = decode_key(&mut self.buf)?;
            match wire_type {
                WireType::EndGroup if inner == current => {
                    open.pop();
                }
                WireType::EndGroup => return Err(DecodeError::UnexpectedEndGroup(inner)),
                WireType::StartGroup => {
                    if open.len() >= GROUP_DEPTH_LIMIT {
                        return Err(DecodeError::RecursionLimit {
                            limit: GROUP_DEPTH_LIMIT,
                        });
                    }
                    open.push(inner);
                }
                _ => {
                    self.read_value(inner, wire_type)?;
                }
            }
        }
        Ok(())
    }

    fn read_field(&mut self) -> Result<Field<'a>, DecodeError> {
        let (tag, wire_type) = decode_key(&mut self.buf)?;
        let value = self.read_value(tag, wire_type)?;
        Ok(Field { tag, value })
    }
}

impl<'a> Iterator for FieldReader<'a> {
    type Item = Result<Field<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }
        let field = self.read_field();
        self.failed = field.is_err();
        Some(field)
    }
}

/// Unwraps a required field or reports it missing.
pub fn required<T>(
    value: Option<T>,
    message: &'static str,
    field: &'static str,
) -> Result<T, DecodeError> {
    value.ok_or(DecodeError::MissingRequiredField { message, field })
}
