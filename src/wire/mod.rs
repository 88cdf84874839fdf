//! Field value encoding
//!
//! The self-describing value model shared by the schema, the message bodies
//! and the object layer, plus the fixed-point transform helpers.

pub mod transform;
pub mod value;

pub use transform::{Transform, TransformOp};
pub use value::{FieldType, FieldValue};
