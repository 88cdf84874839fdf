//! Schema declarations and the builder that assembles them
//!
//! Declarations are the input to [`SchemaRepository::build`]. Order matters:
//! field ids and class ids are assigned by walking the declarations in the
//! order given, so every process must build from the same list.

use crate::core::error::SchemaError;
use crate::schema::model::FieldModifiers;
use crate::schema::repository::SchemaRepository;
use crate::wire::value::{FieldType, FieldValue};

/// One class or struct declaration
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    /// Distributed class
    Class(ClassDecl),
    /// Value-only struct
    Struct(StructDecl),
}

impl Declaration {
    /// Declared name
    pub fn name(&self) -> &str {
        match self {
            Declaration::Class(class) => &class.name,
            Declaration::Struct(structure) => &structure.name,
        }
    }
}

/// Class declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    /// Class name
    pub name: String,
    /// Parent class names in declared order
    pub parents: Vec<String>,
    /// Own fields in declared order
    pub fields: Vec<FieldDecl>,
}

/// Struct declaration
#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    /// Struct name
    pub name: String,
    /// Members in declared order
    pub fields: Vec<StructField>,
}

/// Struct member
#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    /// Member name
    pub name: String,
    /// Member type
    pub field_type: FieldType,
}

/// Class field declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Atomic type or molecular atom list
    pub kind: FieldKind,
    /// Keywords; molecular fields take their first atom's keywords when empty
    pub modifiers: FieldModifiers,
    /// Optional default value
    pub default: Option<FieldValue>,
}

/// Atomic or molecular field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Field with its own wire type
    Atomic(FieldType),
    /// Composite of the named atom fields
    Molecular(Vec<String>),
}

/// Assembles declarations in source order
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    declarations: Vec<Declaration>,
}

/// Field list of a class under construction
#[derive(Debug, Default)]
pub struct ClassBuilder {
    fields: Vec<FieldDecl>,
}

/// Member list of a struct under construction
#[derive(Debug, Default)]
pub struct StructBuilder {
    fields: Vec<StructField>,
}

impl SchemaBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a class. Parents must already be declared.
    pub fn class<F>(mut self, name: &str, parents: &[&str], body: F) -> Self
    where
        F: FnOnce(&mut ClassBuilder),
    {
        let mut builder = ClassBuilder::default();
        body(&mut builder);
        self.declarations.push(Declaration::Class(ClassDecl {
            name: name.to_string(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            fields: builder.fields,
        }));
        self
    }

    /// Declare a struct
    pub fn structure<F>(mut self, name: &str, body: F) -> Self
    where
        F: FnOnce(&mut StructBuilder),
    {
        let mut builder = StructBuilder::default();
        body(&mut builder);
        self.declarations.push(Declaration::Struct(StructDecl {
            name: name.to_string(),
            fields: builder.fields,
        }));
        self
    }

    /// Append an already-formed declaration
    pub fn declaration(mut self, declaration: Declaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    /// Shape of a previously declared struct, as a tuple type
    pub fn struct_type(&self, name: &str) -> Result<FieldType, SchemaError> {
        self.declarations
            .iter()
            .find_map(|decl| match decl {
                Declaration::Struct(s) if s.name == name => Some(struct_tuple(s)),
                _ => None,
            })
            .ok_or_else(|| SchemaError::UnknownStruct(name.to_string()))
    }

    /// Declarations collected so far
    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Resolve into an immutable repository
    pub fn build(self) -> Result<SchemaRepository, SchemaError> {
        SchemaRepository::build(self.declarations)
    }
}

impl ClassBuilder {
    /// Add an atomic field
    pub fn field(&mut self, name: &str, field_type: FieldType, modifiers: FieldModifiers) -> &mut Self {
        self.fields.push(FieldDecl {
            name: name.to_string(),
            kind: FieldKind::Atomic(field_type),
            modifiers,
            default: None,
        });
        self
    }

    /// Add an atomic field with a default value
    pub fn field_with_default(
        &mut self,
        name: &str,
        field_type: FieldType,
        modifiers: FieldModifiers,
        default: FieldValue,
    ) -> &mut Self {
        self.fields.push(FieldDecl {
            name: name.to_string(),
            kind: FieldKind::Atomic(field_type),
            modifiers,
            default: Some(default),
        });
        self
    }

    /// Add a molecular field over the named atoms
    pub fn molecular(&mut self, name: &str, atoms: &[&str]) -> &mut Self {
        self.fields.push(FieldDecl {
            name: name.to_string(),
            kind: FieldKind::Molecular(atoms.iter().map(|a| a.to_string()).collect()),
            modifiers: FieldModifiers::default(),
            default: None,
        });
        self
    }
}

impl StructBuilder {
    /// Add a member
    pub fn field(&mut self, name: &str, field_type: FieldType) -> &mut Self {
        self.fields.push(StructField {
            name: name.to_string(),
            field_type,
        });
        self
    }
}

pub(crate) fn struct_tuple(decl: &StructDecl) -> FieldType {
    FieldType::Tuple(decl.fields.iter().map(|f| f.field_type.clone()).collect())
}
