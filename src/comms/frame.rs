//! Length-prefixed framing for the client and internal dialects
//!
//! Every frame starts with a little-endian `u16` holding the number of bytes
//! that follow. The client dialect then carries `u16 msg_type` and the
//! payload. The internal dialect puts a recipient list and a sender channel
//! in front of the message type; the sender is left out when the only
//! recipient is the CONTROL channel.

use crate::core::error::FramingError;
use crate::core::types::ChannelId;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Largest body that fits the 16-bit length prefix
pub const MAX_BODY_LEN: usize = u16::MAX as usize;

/// Bytes in the length prefix
pub const LENGTH_PREFIX: usize = 2;

/// A message in one of the wire dialects
pub trait Frame: Sized + Send + 'static {
    /// Smallest body that can hold the dialect header
    const MIN_BODY_LEN: usize;

    /// Message type
    fn msg_type(&self) -> u16;

    /// Type-specific payload
    fn payload(&self) -> &Bytes;

    /// Write the body (everything after the length prefix)
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FramingError>;

    /// Parse a body of exactly the declared length
    fn decode_body(body: Bytes) -> Result<Self, FramingError>;

    /// Encode with the length prefix
    fn to_frame(&self) -> Result<Bytes, FramingError> {
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX + Self::MIN_BODY_LEN + self.payload().len());
        buf.put_u16_le(0);
        self.encode_body(&mut buf)?;

        let size = buf.len() - LENGTH_PREFIX;
        if size > MAX_BODY_LEN {
            return Err(FramingError::MessageTooLarge {
                size,
                max_size: MAX_BODY_LEN,
            });
        }
        buf[..LENGTH_PREFIX].copy_from_slice(&(size as u16).to_le_bytes());
        Ok(buf.freeze())
    }
}

/// Client dialect message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMessage {
    /// Message type
    pub msg_type: u16,
    /// Payload after the message type
    pub payload: Bytes,
}

impl ClientMessage {
    /// New message
    pub fn new(msg_type: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
        }
    }
}

impl Frame for ClientMessage {
    const MIN_BODY_LEN: usize = 2;

    fn msg_type(&self) -> u16 {
        self.msg_type
    }

    fn payload(&self) -> &Bytes {
        &self.payload
    }

    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FramingError> {
        buf.put_u16_le(self.msg_type);
        buf.put_slice(&self.payload);
        Ok(())
    }

    fn decode_body(mut body: Bytes) -> Result<Self, FramingError> {
        if body.len() < Self::MIN_BODY_LEN {
            return Err(FramingError::TooShort {
                len: body.len(),
                needed: Self::MIN_BODY_LEN,
            });
        }
        let msg_type = body.get_u16_le();
        Ok(Self {
            msg_type,
            payload: body,
        })
    }
}

/// Internal (cluster) dialect message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalMessage {
    /// Destination channels
    pub recipients: Vec<ChannelId>,
    /// Originating channel; not on the wire for control messages
    pub sender: ChannelId,
    /// Message type
    pub msg_type: u16,
    /// Payload after the message type
    pub payload: Bytes,
}

impl InternalMessage {
    /// Message from `sender` to `recipients`
    pub fn new(
        recipients: Vec<ChannelId>,
        sender: ChannelId,
        msg_type: u16,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            recipients,
            sender,
            msg_type,
            payload: payload.into(),
        }
    }

    /// Message to a single recipient
    pub fn to(recipient: ChannelId, sender: ChannelId, msg_type: u16, payload: impl Into<Bytes>) -> Self {
        Self::new(vec![recipient], sender, msg_type, payload)
    }

    /// Message to the message director's control channel
    pub fn control(msg_type: u16, payload: impl Into<Bytes>) -> Self {
        Self::new(vec![ChannelId::CONTROL], ChannelId::ZERO, msg_type, payload)
    }

    /// Whether the recipient list is exactly the CONTROL channel
    pub fn is_control(&self) -> bool {
        is_control_route(&self.recipients)
    }
}

fn is_control_route(recipients: &[ChannelId]) -> bool {
    recipients == [ChannelId::CONTROL]
}

impl Frame for InternalMessage {
    // count + msg_type
    const MIN_BODY_LEN: usize = 3;

    fn msg_type(&self) -> u16 {
        self.msg_type
    }

    fn payload(&self) -> &Bytes {
        &self.payload
    }

    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), FramingError> {
        let count = u8::try_from(self.recipients.len())
            .map_err(|_| FramingError::TooManyRecipients(self.recipients.len()))?;
        buf.put_u8(count);
        for recipient in &self.recipients {
            buf.put_u64_le(recipient.get());
        }
        if !self.is_control() {
            buf.put_u64_le(self.sender.get());
        }
        buf.put_u16_le(self.msg_type);
        buf.put_slice(&self.payload);
        Ok(())
    }

    fn decode_body(mut body: Bytes) -> Result<Self, FramingError> {
        let len = body.len();
        if len < 1 {
            return Err(FramingError::TooShort {
                len,
                needed: Self::MIN_BODY_LEN,
            });
        }
        let count = body.get_u8() as usize;
        let mut needed = 1 + count * 8 + 2;
        if body.remaining() < count * 8 {
            return Err(FramingError::TooShort { len, needed });
        }
        let recipients: Vec<ChannelId> = (0..count).map(|_| ChannelId::new(body.get_u64_le())).collect();

        let sender = if is_control_route(&recipients) {
            ChannelId::ZERO
        } else {
            needed += 8;
            if body.remaining() < 8 + 2 {
                return Err(FramingError::TooShort { len, needed });
            }
            ChannelId::new(body.get_u64_le())
        };

        if body.remaining() < 2 {
            return Err(FramingError::TooShort { len, needed });
        }
        let msg_type = body.get_u16_le();
        Ok(Self {
            recipients,
            sender,
            msg_type,
            payload: body,
        })
    }
}

/// Split one complete frame body off the front of `buf`.
///
/// Returns `None` until the whole declared length has arrived.
pub fn split_frame(buf: &mut BytesMut) -> Option<Bytes> {
    if buf.len() < LENGTH_PREFIX {
        return None;
    }
    let len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
    if buf.len() < LENGTH_PREFIX + len {
        return None;
    }
    buf.advance(LENGTH_PREFIX);
    Some(buf.split_to(len).freeze())
}

/// Decode a complete frame, length prefix included.
///
/// Bytes beyond the declared length are not part of the frame and are ignored.
pub fn decode_frame<F: Frame>(frame: &[u8]) -> Result<F, FramingError> {
    if frame.len() < LENGTH_PREFIX {
        return Err(FramingError::Truncated {
            declared: LENGTH_PREFIX,
            available: frame.len(),
        });
    }
    let declared = u16::from_le_bytes([frame[0], frame[1]]) as usize;
    let available = frame.len() - LENGTH_PREFIX;
    if available < declared {
        return Err(FramingError::Truncated { declared, available });
    }
    F::decode_body(Bytes::copy_from_slice(&frame[LENGTH_PREFIX..LENGTH_PREFIX + declared]))
}
