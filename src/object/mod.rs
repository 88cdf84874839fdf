//! Distributed objects and the registry of their local implementations

pub mod entity;
pub mod registry;

pub use entity::{
    CallbackObject, Discard, DistributedEntity, DistributedObject, FieldMap, Origin, UpdateSink,
};
pub use registry::{ClassRegistry, Factory, FieldSetter, ObjectContext, UberObject};
