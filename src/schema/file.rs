//! Declaration files
//!
//! A TOML or JSON document with one ordered `declaration` array. Entries are
//! tagged `kind = "class"` or `kind = "struct"`; field types are primitive
//! names, `{ tuple = [...] }`, `{ array = { element = ..., len = N } }` or
//! `{ struct = "Name" }` referring to an earlier struct.
//!
//! ```toml
//! [[declaration]]
//! kind = "class"
//! name = "DistributedAvatar"
//! parents = ["DistributedObject"]
//!
//! [[declaration.field]]
//! name = "hp"
//! type = "uint16"
//! modifiers = ["required", "broadcast"]
//! default = 100
//!
//! [[declaration.field]]
//! name = "pos"
//! molecular = ["x", "y"]
//! ```

use crate::core::error::SchemaError;
use crate::schema::declaration::{
    ClassDecl, Declaration, FieldDecl, FieldKind, StructDecl, StructField,
};
use crate::schema::model::FieldModifiers;
use crate::schema::repository::SchemaRepository;
use crate::wire::value::{FieldType, FieldValue};
use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct DeclarationFile {
    #[serde(default)]
    declaration: Vec<DeclarationRepr>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum DeclarationRepr {
    Class {
        name: String,
        #[serde(default)]
        parents: Vec<String>,
        #[serde(default, rename = "field")]
        fields: Vec<FieldRepr>,
    },
    Struct {
        name: String,
        #[serde(default, rename = "field")]
        fields: Vec<StructFieldRepr>,
    },
}

#[derive(Debug, Deserialize)]
struct FieldRepr {
    name: String,
    #[serde(rename = "type")]
    field_type: Option<TypeRepr>,
    molecular: Option<Vec<String>>,
    #[serde(default)]
    modifiers: Vec<String>,
    default: Option<DefaultRepr>,
}

#[derive(Debug, Deserialize)]
struct StructFieldRepr {
    name: String,
    #[serde(rename = "type")]
    field_type: TypeRepr,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TypeRepr {
    Name(String),
    Tuple { tuple: Vec<TypeRepr> },
    Array { array: ArrayRepr },
    Struct {
        #[serde(rename = "struct")]
        name: String,
    },
}

#[derive(Debug, Deserialize)]
struct ArrayRepr {
    element: Box<TypeRepr>,
    len: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DefaultRepr {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<DefaultRepr>),
}

/// Parse declarations from TOML text
pub fn parse_toml(text: &str) -> Result<Vec<Declaration>, SchemaError> {
    let file: DeclarationFile =
        toml::from_str(text).map_err(|e| SchemaError::Declaration(e.to_string()))?;
    convert(file)
}

/// Parse declarations from JSON text
pub fn parse_json(text: &str) -> Result<Vec<Declaration>, SchemaError> {
    let file: DeclarationFile =
        serde_json::from_str(text).map_err(|e| SchemaError::Declaration(e.to_string()))?;
    convert(file)
}

/// Read declarations from a `.toml` or `.json` file
pub fn load_declarations(path: impl AsRef<Path>) -> Result<Vec<Declaration>, SchemaError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| SchemaError::Declaration(format!("{}: {}", path.display(), e)))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&text),
        _ => parse_toml(&text),
    }
}

impl SchemaRepository {
    /// Build a repository straight from a declaration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        SchemaRepository::build(load_declarations(path)?)
    }
}

fn convert(file: DeclarationFile) -> Result<Vec<Declaration>, SchemaError> {
    let mut structs: HashMap<String, FieldType> = HashMap::new();
    let mut declarations = Vec::with_capacity(file.declaration.len());

    for repr in file.declaration {
        match repr {
            DeclarationRepr::Struct { name, fields } => {
                let fields = fields
                    .into_iter()
                    .map(|f| {
                        Ok(StructField {
                            field_type: resolve_type(&f.field_type, &structs)?,
                            name: f.name,
                        })
                    })
                    .collect::<Result<Vec<_>, SchemaError>>()?;
                structs.insert(
                    name.clone(),
                    FieldType::Tuple(fields.iter().map(|f| f.field_type.clone()).collect()),
                );
                declarations.push(Declaration::Struct(StructDecl { name, fields }));
            }
            DeclarationRepr::Class {
                name,
                parents,
                fields,
            } => {
                let fields = fields
                    .into_iter()
                    .map(|f| convert_field(&name, f, &structs))
                    .collect::<Result<Vec<_>, SchemaError>>()?;
                declarations.push(Declaration::Class(ClassDecl {
                    name,
                    parents,
                    fields,
                }));
            }
        }
    }

    Ok(declarations)
}

fn convert_field(
    class: &str,
    repr: FieldRepr,
    structs: &HashMap<String, FieldType>,
) -> Result<FieldDecl, SchemaError> {
    let modifiers = FieldModifiers::from_keywords(repr.modifiers.iter().map(String::as_str))
        .map_err(|e| SchemaError::Declaration(format!("{}.{}: {}", class, repr.name, e)))?;

    let kind = match (repr.field_type, repr.molecular) {
        (Some(ty), None) => FieldKind::Atomic(resolve_type(&ty, structs)?),
        (None, Some(atoms)) => FieldKind::Molecular(atoms),
        _ => {
            return Err(SchemaError::Declaration(format!(
                "{}.{}: a field needs exactly one of 'type' or 'molecular'",
                class, repr.name
            )))
        }
    };

    let default = match (&repr.default, &kind) {
        (None, _) => None,
        (Some(value), FieldKind::Atomic(ty)) => Some(default_value(value, ty).ok_or_else(|| {
            SchemaError::InvalidDefault(repr.name.clone())
        })?),
        (Some(_), FieldKind::Molecular(_)) => {
            return Err(SchemaError::Declaration(format!(
                "{}.{}: molecular fields take no default",
                class, repr.name
            )))
        }
    };

    Ok(FieldDecl {
        name: repr.name,
        kind,
        modifiers,
        default,
    })
}

fn resolve_type(
    repr: &TypeRepr,
    structs: &HashMap<String, FieldType>,
) -> Result<FieldType, SchemaError> {
    match repr {
        TypeRepr::Name(name) => FieldType::from_name(name)
            .ok_or_else(|| SchemaError::Declaration(format!("unknown type '{}'", name))),
        TypeRepr::Tuple { tuple } => Ok(FieldType::Tuple(
            tuple
                .iter()
                .map(|member| resolve_type(member, structs))
                .collect::<Result<_, _>>()?,
        )),
        TypeRepr::Array { array } => Ok(FieldType::Array {
            element: Box::new(resolve_type(&array.element, structs)?),
            fixed_len: array.len,
        }),
        TypeRepr::Struct { name } => structs
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownStruct(name.clone())),
    }
}

fn default_value(repr: &DefaultRepr, ty: &FieldType) -> Option<FieldValue> {
    match repr {
        DefaultRepr::Bool(b) => int_value(i128::from(*b), ty),
        DefaultRepr::Int(v) => int_value(i128::from(*v), ty),
        DefaultRepr::UInt(v) => int_value(i128::from(*v), ty),
        DefaultRepr::Float(v) => match ty {
            FieldType::Float64 => Some(FieldValue::Float64(*v)),
            _ => None,
        },
        DefaultRepr::Text(s) => match ty {
            FieldType::String => Some(FieldValue::String(s.clone())),
            FieldType::Char if s.len() == 1 => Some(FieldValue::Char(s.as_bytes()[0])),
            FieldType::Blob => hex::decode(s).ok().map(|b| FieldValue::Blob(Bytes::from(b))),
            _ => None,
        },
        DefaultRepr::List(items) => match ty {
            FieldType::Tuple(members) if members.len() == items.len() => Some(FieldValue::Tuple(
                items
                    .iter()
                    .zip(members)
                    .map(|(item, member)| default_value(item, member))
                    .collect::<Option<_>>()?,
            )),
            FieldType::Array { element, fixed_len } => Some(FieldValue::Array {
                element: (**element).clone(),
                fixed_len: *fixed_len,
                values: items
                    .iter()
                    .map(|item| default_value(item, element))
                    .collect::<Option<_>>()?,
            }),
            FieldType::Empty if items.is_empty() => Some(FieldValue::Empty),
            _ => None,
        },
    }
}

fn int_value(v: i128, ty: &FieldType) -> Option<FieldValue> {
    let value = match ty {
        FieldType::UInt8 => FieldValue::UInt8(u8::try_from(v).ok()?),
        FieldType::UInt16 => FieldValue::UInt16(u16::try_from(v).ok()?),
        FieldType::UInt32 => FieldValue::UInt32(u32::try_from(v).ok()?),
        FieldType::UInt64 => FieldValue::UInt64(u64::try_from(v).ok()?),
        FieldType::Int8 => FieldValue::Int8(i8::try_from(v).ok()?),
        FieldType::Int16 => FieldValue::Int16(i16::try_from(v).ok()?),
        FieldType::Int32 => FieldValue::Int32(i32::try_from(v).ok()?),
        FieldType::Int64 => FieldValue::Int64(i64::try_from(v).ok()?),
        FieldType::Float64 => FieldValue::Float64(v as f64),
        _ => return None,
    };
    Some(value)
}
