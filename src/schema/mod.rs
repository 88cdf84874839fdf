//! Schema registry
//!
//! Class and struct declarations go in, in source order; an immutable
//! [`SchemaRepository`] comes out with dense field ids, per-class inherited
//! field sets and per-audience required-field lists.

pub mod declaration;
pub mod file;
pub mod model;
pub mod repository;

pub use declaration::{
    ClassBuilder, ClassDecl, Declaration, FieldDecl, FieldKind, SchemaBuilder, StructBuilder,
    StructDecl, StructField,
};
pub use file::{load_declarations, parse_json, parse_toml};
pub use model::{Audience, ClassSpec, FieldModifiers, FieldSpec, StructSpec};
pub use repository::SchemaRepository;
