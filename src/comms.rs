//! # Comms Module
//!
//! Wire framing, message bodies and the socket tasks shared by the client
//! and internal repositories.

pub mod frame;
pub mod messages;
pub mod network;
pub mod payload;
pub mod protocol;

pub use frame::{ClientMessage, Frame, InternalMessage};
pub use network::{Connection, FrameSender};
pub use payload::{PayloadReader, PayloadWriter};
