//! Cursor-style payload reader and writer
//!
//! Message bodies are a sequence of little-endian fixed-width ids followed by
//! schema-typed values. The reader never reads past the slice it was given,
//! which is always bounded by the frame's declared length.

use crate::core::error::DecodeError;
use crate::core::types::{ChannelId, ClassId, FieldId, InterestId, ObjectId, ZoneId};
use crate::wire::value::{FieldType, FieldValue};
use bytes::{BufMut, Bytes, BytesMut};

/// Reads ids and values from a message payload
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
}

macro_rules! read_fixed {
    ($($name:ident -> $ty:ty),* $(,)?) => {
        $(
            /// Read one little-endian value
            pub fn $name(&mut self) -> Result<$ty, DecodeError> {
                const N: usize = std::mem::size_of::<$ty>();
                let bytes = self.take(N)?;
                let mut raw = [0u8; N];
                raw.copy_from_slice(bytes);
                Ok(<$ty>::from_le_bytes(raw))
            }
        )*
    };
}

impl<'a> PayloadReader<'a> {
    /// Reader over `buf`
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    read_fixed!(read_u8 -> u8, read_u16 -> u16, read_u32 -> u32, read_u64 -> u64);

    /// Length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        match FieldType::String.decode(&mut self.buf)? {
            FieldValue::String(s) => Ok(s),
            _ => Err(DecodeError::InvalidUtf8),
        }
    }

    /// Value of the given type
    pub fn read_value(&mut self, ty: &FieldType) -> Result<FieldValue, DecodeError> {
        ty.decode(&mut self.buf)
    }

    /// Field id
    pub fn read_field_id(&mut self) -> Result<FieldId, DecodeError> {
        self.read_u16().map(FieldId::new)
    }

    /// Class id
    pub fn read_class_id(&mut self) -> Result<ClassId, DecodeError> {
        self.read_u16().map(ClassId::new)
    }

    /// Object id
    pub fn read_object_id(&mut self) -> Result<ObjectId, DecodeError> {
        self.read_u32().map(ObjectId::new)
    }

    /// Zone id
    pub fn read_zone_id(&mut self) -> Result<ZoneId, DecodeError> {
        self.read_u32().map(ZoneId::new)
    }

    /// Channel id
    pub fn read_channel_id(&mut self) -> Result<ChannelId, DecodeError> {
        self.read_u64().map(ChannelId::new)
    }

    /// Interest id
    pub fn read_interest_id(&mut self) -> Result<InterestId, DecodeError> {
        self.read_u16().map(InterestId::new)
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Whether the payload is fully consumed
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Fail unless the payload is fully consumed
    pub fn expect_end(&self) -> Result<(), DecodeError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes {
                remaining: self.remaining(),
            })
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.buf.len() < n {
            return Err(DecodeError::Truncated {
                needed: n,
                remaining: self.buf.len(),
            });
        }
        let slice: &'a [u8] = self.buf;
        let (head, tail) = slice.split_at(n);
        self.buf = tail;
        Ok(head)
    }
}

/// Builds a message payload
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    /// Empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer with reserved capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Append a u8
    pub fn put_u8(mut self, v: u8) -> Self {
        self.buf.put_u8(v);
        self
    }

    /// Append a little-endian u16
    pub fn put_u16(mut self, v: u16) -> Self {
        self.buf.put_u16_le(v);
        self
    }

    /// Append a little-endian u32
    pub fn put_u32(mut self, v: u32) -> Self {
        self.buf.put_u32_le(v);
        self
    }

    /// Append a little-endian u64
    pub fn put_u64(mut self, v: u64) -> Self {
        self.buf.put_u64_le(v);
        self
    }

    /// Append a length-prefixed string. Longer strings are cut at the
    /// 16-bit limit on a character boundary.
    pub fn put_string(self, s: &str) -> Self {
        let mut end = s.len().min(u16::MAX as usize);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let s = &s[..end];
        let mut this = self.put_u16(s.len() as u16);
        this.buf.put_slice(s.as_bytes());
        this
    }

    /// Append raw bytes with no prefix
    pub fn put_raw(mut self, bytes: &[u8]) -> Self {
        self.buf.put_slice(bytes);
        self
    }

    /// Append an encoded value
    pub fn put_value(mut self, value: &FieldValue) -> Self {
        value.encode(&mut self.buf);
        self
    }

    /// Append a field id
    pub fn put_field_id(self, id: FieldId) -> Self {
        self.put_u16(id.get())
    }

    /// Append a class id
    pub fn put_class_id(self, id: ClassId) -> Self {
        self.put_u16(id.get())
    }

    /// Append an object id
    pub fn put_object_id(self, id: ObjectId) -> Self {
        self.put_u32(id.get())
    }

    /// Append a zone id
    pub fn put_zone_id(self, id: ZoneId) -> Self {
        self.put_u32(id.get())
    }

    /// Append a channel id
    pub fn put_channel_id(self, id: ChannelId) -> Self {
        self.put_u64(id.get())
    }

    /// Append an interest id
    pub fn put_interest_id(self, id: InterestId) -> Self {
        self.put_u16(id.get())
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Freeze into an immutable payload
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
