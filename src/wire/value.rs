//! Field values and their type descriptors
//!
//! All numbers are little-endian and fixed width. Strings and blobs carry a
//! 16-bit byte count. A variable array carries a 16-bit count of the *bytes*
//! that follow so it can be skipped without decoding; a fixed array has no
//! prefix. Tuples are plain concatenation.

use crate::core::error::DecodeError;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// Largest length representable by a 16-bit prefix
pub const MAX_PREFIXED_LEN: usize = u16::MAX as usize;

/// Shape of a field value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Unsigned 8-bit integer (also used for booleans)
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Unsigned 32-bit integer
    UInt32,
    /// Unsigned 64-bit integer
    UInt64,
    /// Signed 8-bit integer
    Int8,
    /// Signed 16-bit integer
    Int16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// IEEE 754 double
    Float64,
    /// Single byte character
    Char,
    /// Length-prefixed text
    String,
    /// Length-prefixed raw bytes
    Blob,
    /// No payload
    Empty,
    /// Concatenation of member values
    Tuple(Vec<FieldType>),
    /// Homogeneous list, fixed length when `fixed_len` is set
    Array {
        /// Element type
        element: Box<FieldType>,
        /// Exact element count for fixed arrays
        fixed_len: Option<usize>,
    },
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Unsigned 8-bit integer
    UInt8(u8),
    /// Unsigned 16-bit integer
    UInt16(u16),
    /// Unsigned 32-bit integer
    UInt32(u32),
    /// Unsigned 64-bit integer
    UInt64(u64),
    /// Signed 8-bit integer
    Int8(i8),
    /// Signed 16-bit integer
    Int16(i16),
    /// Signed 32-bit integer
    Int32(i32),
    /// Signed 64-bit integer
    Int64(i64),
    /// IEEE 754 double
    Float64(f64),
    /// Single byte character
    Char(u8),
    /// Text
    String(String),
    /// Raw bytes
    Blob(Bytes),
    /// No payload
    Empty,
    /// Member values in order
    Tuple(Vec<FieldValue>),
    /// Array values with the array's own type information
    Array {
        /// Element type
        element: FieldType,
        /// Exact element count for fixed arrays
        fixed_len: Option<usize>,
        /// Elements
        values: Vec<FieldValue>,
    },
}

impl FieldType {
    /// Variable-length array of `element`
    pub fn array(element: FieldType) -> Self {
        FieldType::Array {
            element: Box::new(element),
            fixed_len: None,
        }
    }

    /// Fixed-length array of `len` elements
    pub fn fixed_array(element: FieldType, len: usize) -> Self {
        FieldType::Array {
            element: Box::new(element),
            fixed_len: Some(len),
        }
    }

    /// Primitive type by its lowercase name
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name {
            "uint8" | "bool" => FieldType::UInt8,
            "uint16" => FieldType::UInt16,
            "uint32" => FieldType::UInt32,
            "uint64" => FieldType::UInt64,
            "int8" => FieldType::Int8,
            "int16" => FieldType::Int16,
            "int32" => FieldType::Int32,
            "int64" => FieldType::Int64,
            "float64" => FieldType::Float64,
            "char" => FieldType::Char,
            "string" => FieldType::String,
            "blob" => FieldType::Blob,
            "empty" => FieldType::Empty,
            _ => return None,
        };
        Some(ty)
    }

    /// Whether the type is an integer of any width or sign
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::UInt8
                | FieldType::UInt16
                | FieldType::UInt32
                | FieldType::UInt64
                | FieldType::Int8
                | FieldType::Int16
                | FieldType::Int32
                | FieldType::Int64
        )
    }

    /// Encoded size when it does not depend on the value
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            FieldType::UInt8 | FieldType::Int8 | FieldType::Char => Some(1),
            FieldType::UInt16 | FieldType::Int16 => Some(2),
            FieldType::UInt32 | FieldType::Int32 => Some(4),
            FieldType::UInt64 | FieldType::Int64 | FieldType::Float64 => Some(8),
            FieldType::Empty => Some(0),
            FieldType::String | FieldType::Blob => None,
            FieldType::Tuple(members) => members.iter().map(FieldType::fixed_size).sum(),
            FieldType::Array {
                element,
                fixed_len: Some(len),
            } => element.fixed_size().map(|size| size * len),
            FieldType::Array { fixed_len: None, .. } => None,
        }
    }

    /// Decode one value of this type, advancing `buf` past it
    pub fn decode(&self, buf: &mut &[u8]) -> Result<FieldValue, DecodeError> {
        let value = match self {
            FieldType::UInt8 => {
                need(buf, 1)?;
                FieldValue::UInt8(buf.get_u8())
            }
            FieldType::UInt16 => {
                need(buf, 2)?;
                FieldValue::UInt16(buf.get_u16_le())
            }
            FieldType::UInt32 => {
                need(buf, 4)?;
                FieldValue::UInt32(buf.get_u32_le())
            }
            FieldType::UInt64 => {
                need(buf, 8)?;
                FieldValue::UInt64(buf.get_u64_le())
            }
            FieldType::Int8 => {
                need(buf, 1)?;
                FieldValue::Int8(buf.get_i8())
            }
            FieldType::Int16 => {
                need(buf, 2)?;
                FieldValue::Int16(buf.get_i16_le())
            }
            FieldType::Int32 => {
                need(buf, 4)?;
                FieldValue::Int32(buf.get_i32_le())
            }
            FieldType::Int64 => {
                need(buf, 8)?;
                FieldValue::Int64(buf.get_i64_le())
            }
            FieldType::Float64 => {
                need(buf, 8)?;
                FieldValue::Float64(buf.get_f64_le())
            }
            FieldType::Char => {
                need(buf, 1)?;
                FieldValue::Char(buf.get_u8())
            }
            FieldType::String => {
                let bytes = take_prefixed(buf)?;
                let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
                FieldValue::String(text.to_owned())
            }
            FieldType::Blob => FieldValue::Blob(Bytes::copy_from_slice(take_prefixed(buf)?)),
            FieldType::Empty => FieldValue::Empty,
            FieldType::Tuple(members) => FieldValue::Tuple(
                members
                    .iter()
                    .map(|member| member.decode(buf))
                    .collect::<Result<_, _>>()?,
            ),
            FieldType::Array {
                element,
                fixed_len: Some(len),
            } => {
                let mut values = Vec::with_capacity((*len).min(buf.remaining()));
                for _ in 0..*len {
                    values.push(element.decode(buf)?);
                }
                FieldValue::Array {
                    element: (**element).clone(),
                    fixed_len: Some(*len),
                    values,
                }
            }
            FieldType::Array {
                element,
                fixed_len: None,
            } => {
                let mut region = take_prefixed(buf)?;
                let len = region.len();
                let mut values = Vec::new();

                if element.fixed_size() == Some(0) {
                    // Zero-width elements cannot be counted from a byte length
                    if len != 0 {
                        return Err(DecodeError::MisalignedArray { len });
                    }
                } else {
                    while region.has_remaining() {
                        let value = element.decode(&mut region).map_err(|e| match e {
                            DecodeError::Truncated { .. } => DecodeError::MisalignedArray { len },
                            other => other,
                        })?;
                        values.push(value);
                    }
                }

                FieldValue::Array {
                    element: (**element).clone(),
                    fixed_len: None,
                    values,
                }
            }
        };
        Ok(value)
    }

    /// Advance `buf` past one value of this type without building it
    pub fn skip(&self, buf: &mut &[u8]) -> Result<(), DecodeError> {
        if let Some(size) = self.fixed_size() {
            need(buf, size)?;
            buf.advance(size);
            return Ok(());
        }

        match self {
            FieldType::String | FieldType::Blob | FieldType::Array { fixed_len: None, .. } => {
                take_prefixed(buf)?;
            }
            FieldType::Tuple(members) => {
                for member in members {
                    member.skip(buf)?;
                }
            }
            FieldType::Array {
                element,
                fixed_len: Some(len),
            } => {
                for _ in 0..*len {
                    element.skip(buf)?;
                }
            }
            // Everything else has a fixed size
            _ => {}
        }
        Ok(())
    }
}

impl FieldValue {
    /// The type this value encodes as
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::UInt8(_) => FieldType::UInt8,
            FieldValue::UInt16(_) => FieldType::UInt16,
            FieldValue::UInt32(_) => FieldType::UInt32,
            FieldValue::UInt64(_) => FieldType::UInt64,
            FieldValue::Int8(_) => FieldType::Int8,
            FieldValue::Int16(_) => FieldType::Int16,
            FieldValue::Int32(_) => FieldType::Int32,
            FieldValue::Int64(_) => FieldType::Int64,
            FieldValue::Float64(_) => FieldType::Float64,
            FieldValue::Char(_) => FieldType::Char,
            FieldValue::String(_) => FieldType::String,
            FieldValue::Blob(_) => FieldType::Blob,
            FieldValue::Empty => FieldType::Empty,
            FieldValue::Tuple(members) => {
                FieldType::Tuple(members.iter().map(FieldValue::field_type).collect())
            }
            FieldValue::Array {
                element, fixed_len, ..
            } => FieldType::Array {
                element: Box::new(element.clone()),
                fixed_len: *fixed_len,
            },
        }
    }

    /// Whether this value can be encoded as `ty` and decoded back unchanged.
    ///
    /// Also rejects strings, blobs and variable arrays whose encoding would
    /// overflow the 16-bit length prefix.
    pub fn conforms_to(&self, ty: &FieldType) -> bool {
        match (self, ty) {
            (FieldValue::UInt8(_), FieldType::UInt8)
            | (FieldValue::UInt16(_), FieldType::UInt16)
            | (FieldValue::UInt32(_), FieldType::UInt32)
            | (FieldValue::UInt64(_), FieldType::UInt64)
            | (FieldValue::Int8(_), FieldType::Int8)
            | (FieldValue::Int16(_), FieldType::Int16)
            | (FieldValue::Int32(_), FieldType::Int32)
            | (FieldValue::Int64(_), FieldType::Int64)
            | (FieldValue::Float64(_), FieldType::Float64)
            | (FieldValue::Char(_), FieldType::Char)
            | (FieldValue::Empty, FieldType::Empty) => true,
            (FieldValue::String(s), FieldType::String) => s.len() <= MAX_PREFIXED_LEN,
            (FieldValue::Blob(b), FieldType::Blob) => b.len() <= MAX_PREFIXED_LEN,
            (FieldValue::Tuple(values), FieldType::Tuple(types)) => {
                values.len() == types.len()
                    && values.iter().zip(types).all(|(v, t)| v.conforms_to(t))
            }
            (
                FieldValue::Array {
                    element,
                    fixed_len,
                    values,
                },
                FieldType::Array {
                    element: expected,
                    fixed_len: expected_len,
                },
            ) => {
                element == expected.as_ref()
                    && fixed_len == expected_len
                    && values.iter().all(|v| v.conforms_to(element))
                    && match fixed_len {
                        Some(len) => values.len() == *len,
                        None => self.encoded_len() - 2 <= MAX_PREFIXED_LEN,
                    }
            }
            _ => false,
        }
    }

    /// Number of bytes [`encode`](Self::encode) writes
    pub fn encoded_len(&self) -> usize {
        match self {
            FieldValue::UInt8(_) | FieldValue::Int8(_) | FieldValue::Char(_) => 1,
            FieldValue::UInt16(_) | FieldValue::Int16(_) => 2,
            FieldValue::UInt32(_) | FieldValue::Int32(_) => 4,
            FieldValue::UInt64(_) | FieldValue::Int64(_) | FieldValue::Float64(_) => 8,
            FieldValue::String(s) => 2 + s.len(),
            FieldValue::Blob(b) => 2 + b.len(),
            FieldValue::Empty => 0,
            FieldValue::Tuple(members) => members.iter().map(FieldValue::encoded_len).sum(),
            FieldValue::Array {
                fixed_len, values, ..
            } => {
                let body: usize = values.iter().map(FieldValue::encoded_len).sum();
                match fixed_len {
                    Some(_) => body,
                    None => 2 + body,
                }
            }
        }
    }

    /// Append the wire encoding of this value
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        match self {
            FieldValue::UInt8(v) => buf.put_u8(*v),
            FieldValue::UInt16(v) => buf.put_u16_le(*v),
            FieldValue::UInt32(v) => buf.put_u32_le(*v),
            FieldValue::UInt64(v) => buf.put_u64_le(*v),
            FieldValue::Int8(v) => buf.put_i8(*v),
            FieldValue::Int16(v) => buf.put_i16_le(*v),
            FieldValue::Int32(v) => buf.put_i32_le(*v),
            FieldValue::Int64(v) => buf.put_i64_le(*v),
            FieldValue::Float64(v) => buf.put_f64_le(*v),
            FieldValue::Char(v) => buf.put_u8(*v),
            FieldValue::String(s) => {
                buf.put_u16_le(s.len() as u16);
                buf.put_slice(s.as_bytes());
            }
            FieldValue::Blob(b) => {
                buf.put_u16_le(b.len() as u16);
                buf.put_slice(b);
            }
            FieldValue::Empty => {}
            FieldValue::Tuple(members) => {
                for member in members {
                    member.encode(buf);
                }
            }
            FieldValue::Array {
                fixed_len, values, ..
            } => {
                if fixed_len.is_none() {
                    let body: usize = values.iter().map(FieldValue::encoded_len).sum();
                    buf.put_u16_le(body as u16);
                }
                for value in values {
                    value.encode(buf);
                }
            }
        }
    }

    /// Encode into a fresh buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Variable array built from its elements
    pub fn array(element: FieldType, values: Vec<FieldValue>) -> Self {
        FieldValue::Array {
            element,
            fixed_len: None,
            values,
        }
    }

    /// Fixed array built from its elements
    pub fn fixed_array(element: FieldType, values: Vec<FieldValue>) -> Self {
        FieldValue::Array {
            element,
            fixed_len: Some(values.len()),
            values,
        }
    }

    /// Numeric value widened to `f64`
    pub fn to_f64(&self) -> Option<f64> {
        match *self {
            FieldValue::UInt8(v) => Some(v as f64),
            FieldValue::UInt16(v) => Some(v as f64),
            FieldValue::UInt32(v) => Some(v as f64),
            FieldValue::UInt64(v) => Some(v as f64),
            FieldValue::Int8(v) => Some(v as f64),
            FieldValue::Int16(v) => Some(v as f64),
            FieldValue::Int32(v) => Some(v as f64),
            FieldValue::Int64(v) => Some(v as f64),
            FieldValue::Float64(v) => Some(v),
            _ => None,
        }
    }

    /// Unsigned integer widened to `u64`
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            FieldValue::UInt8(v) => Some(v.into()),
            FieldValue::UInt16(v) => Some(v.into()),
            FieldValue::UInt32(v) => Some(v.into()),
            FieldValue::UInt64(v) => Some(v),
            _ => None,
        }
    }

    /// Signed integer widened to `i64`
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            FieldValue::Int8(v) => Some(v.into()),
            FieldValue::Int16(v) => Some(v.into()),
            FieldValue::Int32(v) => Some(v.into()),
            FieldValue::Int64(v) => Some(v),
            _ => None,
        }
    }

    /// Text content
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Blob content
    pub fn as_blob(&self) -> Option<&Bytes> {
        match self {
            FieldValue::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Tuple members
    pub fn as_tuple(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Tuple(members) => Some(members),
            _ => None,
        }
    }

    /// Array elements
    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array { values, .. } => Some(values),
            _ => None,
        }
    }
}

fn need(buf: &&[u8], needed: usize) -> Result<(), DecodeError> {
    if buf.remaining() < needed {
        return Err(DecodeError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

// Reads a u16 byte count and returns that many bytes
fn take_prefixed<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    need(buf, 2)?;
    let len = buf.get_u16_le() as usize;
    need(buf, len)?;
    let slice: &'a [u8] = *buf;
    let (head, tail) = slice.split_at(len);
    *buf = tail;
    Ok(head)
}

macro_rules! impl_from_primitive {
    ($($raw:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$raw> for FieldValue {
                fn from(v: $raw) -> Self {
                    FieldValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive!(
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f64 => Float64,
    String => String,
    Bytes => Blob,
);

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_owned())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::UInt8(v as u8)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Blob(Bytes::from(v))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::UInt8 => f.write_str("uint8"),
            FieldType::UInt16 => f.write_str("uint16"),
            FieldType::UInt32 => f.write_str("uint32"),
            FieldType::UInt64 => f.write_str("uint64"),
            FieldType::Int8 => f.write_str("int8"),
            FieldType::Int16 => f.write_str("int16"),
            FieldType::Int32 => f.write_str("int32"),
            FieldType::Int64 => f.write_str("int64"),
            FieldType::Float64 => f.write_str("float64"),
            FieldType::Char => f.write_str("char"),
            FieldType::String => f.write_str("string"),
            FieldType::Blob => f.write_str("blob"),
            FieldType::Empty => f.write_str("empty"),
            FieldType::Tuple(members) => {
                f.write_str("(")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", member)?;
                }
                f.write_str(")")
            }
            FieldType::Array { element, fixed_len } => match fixed_len {
                Some(len) => write!(f, "{}[{}]", element, len),
                None => write!(f, "{}[]", element),
            },
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::UInt8(v) => write!(f, "{}", v),
            FieldValue::UInt16(v) => write!(f, "{}", v),
            FieldValue::UInt32(v) => write!(f, "{}", v),
            FieldValue::UInt64(v) => write!(f, "{}", v),
            FieldValue::Int8(v) => write!(f, "{}", v),
            FieldValue::Int16(v) => write!(f, "{}", v),
            FieldValue::Int32(v) => write!(f, "{}", v),
            FieldValue::Int64(v) => write!(f, "{}", v),
            FieldValue::Float64(v) => write!(f, "{}", v),
            FieldValue::Char(v) => write!(f, "{:?}", *v as char),
            FieldValue::String(s) => write!(f, "{:?}", s),
            FieldValue::Blob(b) => write!(f, "0x{}", hex::encode(b)),
            FieldValue::Empty => f.write_str("()"),
            FieldValue::Tuple(members) => {
                f.write_str("(")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", member)?;
                }
                f.write_str(")")
            }
            FieldValue::Array { values, .. } => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("]")
            }
        }
    }
}
