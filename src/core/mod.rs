//! Core system types and foundations
//!
//! Identifier newtypes, error handling, configuration and logging setup
//! shared by every other module.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used items
pub use config::Config;
pub use error::{Error, Result};
pub use types::{ChannelId, ClassId, FieldId, InterestId, ObjectId, ZoneId};
