//! Identifier types for the distributed object protocol
//!
//! Every identifier on the wire is a plain unsigned integer of a fixed width.
//! Each gets its own newtype so a field id can never be passed where an
//! object id or a channel id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! wire_id {
    ($(#[$meta:meta])* $name:ident($raw:ty)) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name($raw);

        impl $name {
            /// Wrap a raw wire value
            pub const fn new(raw: $raw) -> Self {
                Self(raw)
            }

            /// Raw wire value
            pub const fn get(self) -> $raw {
                self.0
            }
        }

        impl From<$raw> for $name {
            fn from(raw: $raw) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for $raw {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

wire_id!(
    /// Schema-wide field number, dense and assigned in declaration order
    FieldId(u16)
);

wire_id!(
    /// Declaration number of a distributed class
    ClassId(u16)
);

wire_id!(
    /// Distributed object id ("doId")
    ObjectId(u32)
);

wire_id!(
    /// Addressable endpoint on the internal cluster dialect
    ChannelId(u64)
);

wire_id!(
    /// Zone inside a parent object
    ZoneId(u32)
);

wire_id!(
    /// Client-chosen interest handle
    InterestId(u16)
);

impl ChannelId {
    /// Unset sender
    pub const ZERO: ChannelId = ChannelId(0);

    /// Reserved channel addressing the message director itself
    pub const CONTROL: ChannelId = ChannelId(1);
}

impl ObjectId {
    /// Objects are addressable on the channel with the same number
    pub const fn channel(self) -> ChannelId {
        ChannelId(self.0 as u64)
    }
}

impl FieldId {
    /// Position in the dense field table
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}
