//! Immutable schema registry
//!
//! Field ids come from a single counter that walks every declaration in order,
//! structs included, so two processes that build from the same declaration
//! list agree on every id without exchanging them.

use crate::core::error::SchemaError;
use crate::core::types::{ClassId, FieldId};
use crate::schema::declaration::{struct_tuple, ClassDecl, Declaration, FieldKind, StructDecl};
use crate::schema::model::{Audience, ClassSpec, FieldModifiers, FieldSpec, StructSpec};
use crate::wire::value::{FieldType, FieldValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

const ID_SPACE: usize = u16::MAX as usize + 1;

/// Built schema: field table, class table and per-class field resolution
#[derive(Debug, Clone)]
pub struct SchemaRepository {
    fields: Vec<FieldSpec>,
    classes: BTreeMap<ClassId, ClassSpec>,
    structs: BTreeMap<ClassId, StructSpec>,
    class_names: HashMap<String, ClassId>,
    struct_names: HashMap<String, ClassId>,
    // Surviving field for each name, per class, after shadowing
    field_names: HashMap<ClassId, HashMap<String, FieldId>>,
    struct_decls: HashMap<String, FieldType>,
    hash: u32,
}

impl SchemaRepository {
    /// Resolve an ordered declaration list
    pub fn build(declarations: Vec<Declaration>) -> Result<Self, SchemaError> {
        let mut repo = SchemaRepository {
            fields: Vec::new(),
            classes: BTreeMap::new(),
            structs: BTreeMap::new(),
            class_names: HashMap::new(),
            struct_names: HashMap::new(),
            field_names: HashMap::new(),
            struct_decls: HashMap::new(),
            hash: 0,
        };
        let mut hasher = blake3::Hasher::new();

        for (index, declaration) in declarations.iter().enumerate() {
            let id = u16::try_from(index)
                .map(ClassId::new)
                .map_err(|_| SchemaError::TooManyClasses { max: ID_SPACE })?;

            let name = declaration.name();
            if repo.class_names.contains_key(name) || repo.struct_names.contains_key(name) {
                return Err(SchemaError::DuplicateName(name.to_string()));
            }

            hash_declaration(&mut hasher, declaration);

            match declaration {
                Declaration::Struct(decl) => repo.add_struct(id, decl)?,
                Declaration::Class(decl) => repo.add_class(id, decl)?,
            }
        }

        let digest = hasher.finalize();
        let bytes = digest.as_bytes();
        repo.hash = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

        debug!(
            classes = repo.classes.len(),
            structs = repo.structs.len(),
            fields = repo.fields.len(),
            hash = %format!("{:#010x}", repo.hash),
            "Schema built"
        );

        Ok(repo)
    }

    fn next_field_id(&self) -> Result<FieldId, SchemaError> {
        u16::try_from(self.fields.len())
            .map(FieldId::new)
            .map_err(|_| SchemaError::TooManyFields { max: ID_SPACE })
    }

    fn add_struct(&mut self, id: ClassId, decl: &StructDecl) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        let mut members = Vec::with_capacity(decl.fields.len());

        for member in &decl.fields {
            if !seen.insert(member.name.as_str()) {
                return Err(SchemaError::DuplicateName(format!("{}.{}", decl.name, member.name)));
            }
            let field_id = self.next_field_id()?;
            self.fields.push(FieldSpec {
                id: field_id,
                name: member.name.clone(),
                field_type: member.field_type.clone(),
                modifiers: FieldModifiers::default(),
                molecular: None,
                default: None,
                declared_in: id,
            });
            members.push(field_id);
        }

        self.struct_names.insert(decl.name.clone(), id);
        self.struct_decls.insert(decl.name.clone(), struct_tuple(decl));
        self.structs.insert(
            id,
            StructSpec {
                id,
                name: decl.name.clone(),
                fields: members,
            },
        );
        Ok(())
    }

    fn add_class(&mut self, id: ClassId, decl: &ClassDecl) -> Result<(), SchemaError> {
        // Inherited fields in processing order: each parent's resolved set,
        // parents in declared order
        let mut inherited = Vec::new();
        for parent in &decl.parents {
            let parent_id = self
                .class_names
                .get(parent)
                .ok_or_else(|| SchemaError::UnknownParent {
                    class: decl.name.clone(),
                    parent: parent.clone(),
                })?;
            if let Some(parent_spec) = self.classes.get(parent_id) {
                inherited.extend_from_slice(&parent_spec.fields);
            }
        }

        let mut seen = HashSet::new();
        let mut own = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateName(format!("{}.{}", decl.name, field.name)));
            }
            let field_id = self.next_field_id()?;
            let (field_type, molecular) = match &field.kind {
                FieldKind::Atomic(ty) => (ty.clone(), None),
                // Resolved below once every name in the class is known
                FieldKind::Molecular(_) => (FieldType::Empty, Some(Vec::new())),
            };
            self.fields.push(FieldSpec {
                id: field_id,
                name: field.name.clone(),
                field_type,
                modifiers: field.modifiers,
                molecular,
                default: None,
                declared_in: id,
            });
            own.push(field_id);
        }

        // Last processed wins: a re-declared name drops the earlier entry
        let mut by_name: HashMap<String, FieldId> = HashMap::new();
        for field_id in inherited.iter().chain(own.iter()) {
            by_name.insert(self.fields[field_id.index()].name.clone(), *field_id);
        }

        for (field, field_id) in decl.fields.iter().zip(&own) {
            let FieldKind::Molecular(atoms) = &field.kind else {
                continue;
            };
            if atoms.is_empty() {
                return Err(SchemaError::EmptyMolecular(field.name.clone()));
            }

            let mut atom_ids = Vec::with_capacity(atoms.len());
            let mut atom_types = Vec::with_capacity(atoms.len());
            let mut first_modifiers = None;
            for atom in atoms {
                let atom_id = *by_name.get(atom).ok_or_else(|| SchemaError::UnknownAtom {
                    field: field.name.clone(),
                    atom: atom.clone(),
                })?;
                let atom_spec = &self.fields[atom_id.index()];
                if atom_spec.is_molecular() {
                    return Err(SchemaError::NestedMolecular {
                        field: field.name.clone(),
                        atom: atom.clone(),
                    });
                }
                first_modifiers.get_or_insert(atom_spec.modifiers);
                atom_ids.push(atom_id);
                atom_types.push(atom_spec.field_type.clone());
            }

            let field_type = if atom_types.len() == 1 {
                atom_types.remove(0)
            } else {
                FieldType::Tuple(atom_types)
            };

            let spec = &mut self.fields[field_id.index()];
            spec.field_type = field_type;
            spec.molecular = Some(atom_ids);
            if spec.modifiers == FieldModifiers::default() {
                spec.modifiers = first_modifiers.unwrap_or_default();
            }
        }

        for (field, field_id) in decl.fields.iter().zip(&own) {
            if let Some(default) = &field.default {
                let spec = &mut self.fields[field_id.index()];
                if !default.conforms_to(&spec.field_type) {
                    return Err(SchemaError::InvalidDefault(field.name.clone()));
                }
                spec.default = Some(default.clone());
            }
        }

        let mut resolved: Vec<FieldId> = by_name.values().copied().collect();
        resolved.sort_unstable();

        // Inherited molecular fields keep the atom ids of their declaring
        // class, so every one of those atoms must survive here
        for field_id in &resolved {
            let spec = &self.fields[field_id.index()];
            let Some(atoms) = &spec.molecular else {
                continue;
            };
            if let Some(atom) = atoms.iter().find(|a| resolved.binary_search(a).is_err()) {
                return Err(SchemaError::ShadowedAtom {
                    class: decl.name.clone(),
                    field: spec.name.clone(),
                    atom: self.fields[atom.index()].name.clone(),
                });
            }
        }

        self.class_names.insert(decl.name.clone(), id);
        self.field_names.insert(id, by_name);
        self.classes.insert(
            id,
            ClassSpec {
                id,
                name: decl.name.clone(),
                parents: decl.parents.clone(),
                own_fields: own,
                fields: resolved,
            },
        );
        Ok(())
    }

    /// Field by id
    pub fn field(&self, id: FieldId) -> Result<&FieldSpec, SchemaError> {
        self.fields.get(id.index()).ok_or(SchemaError::UnknownField(id))
    }

    /// Field by id, checked to be part of `class`
    pub fn class_field(&self, class: ClassId, id: FieldId) -> Result<&FieldSpec, SchemaError> {
        if !self.class(class)?.has_field(id) {
            return Err(SchemaError::FieldNotInClass { class, field: id });
        }
        self.field(id)
    }

    /// Check that `value` may be stored in `field` of an object of `class`.
    /// A molecular field also needs every atom it fans out to.
    pub fn check_write(
        &self,
        class: ClassId,
        id: FieldId,
        value: &FieldValue,
    ) -> Result<&FieldSpec, SchemaError> {
        let spec = self.class_field(class, id)?;
        if !value.conforms_to(&spec.field_type) {
            return Err(SchemaError::TypeMismatch {
                field: id,
                expected: spec.field_type.to_string(),
            });
        }
        for atom in spec.molecular.iter().flatten() {
            self.class_field(class, *atom)?;
        }
        Ok(spec)
    }

    /// Class by id
    pub fn class(&self, id: ClassId) -> Result<&ClassSpec, SchemaError> {
        self.classes.get(&id).ok_or(SchemaError::UnknownClass(id))
    }

    /// Class id by name
    pub fn class_id(&self, name: &str) -> Result<ClassId, SchemaError> {
        self.class_names
            .get(name)
            .copied()
            .ok_or_else(|| SchemaError::UnknownClassName(name.to_string()))
    }

    /// Struct by name
    pub fn struct_spec(&self, name: &str) -> Result<&StructSpec, SchemaError> {
        self.struct_names
            .get(name)
            .and_then(|id| self.structs.get(id))
            .ok_or_else(|| SchemaError::UnknownStruct(name.to_string()))
    }

    /// Struct shape as a tuple type
    pub fn struct_type(&self, name: &str) -> Result<FieldType, SchemaError> {
        self.struct_decls
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownStruct(name.to_string()))
    }

    /// All classes in id order
    pub fn classes(&self) -> impl Iterator<Item = &ClassSpec> {
        self.classes.values()
    }

    /// Number of assigned field ids
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Own and inherited fields after shadowing, sorted by id
    pub fn fields_of(&self, class: ClassId) -> Result<&[FieldId], SchemaError> {
        Ok(&self.class(class)?.fields)
    }

    /// Resolve a field name on a class, inherited fields included
    pub fn field_by_name(&self, class: ClassId, name: &str) -> Result<&FieldSpec, SchemaError> {
        let spec = self.class(class)?;
        let id = self
            .field_names
            .get(&class)
            .and_then(|names| names.get(name))
            .ok_or_else(|| SchemaError::UnknownFieldName {
                class: spec.name.clone(),
                field: name.to_string(),
            })?;
        self.field(*id)
    }

    /// Fields that an initial-state message for `class` carries for the
    /// given audience, in wire order.
    ///
    /// Only required, non-molecular fields qualify. A client audience further
    /// needs `broadcast` or `clrecv`, or `ownrecv` when it owns the object.
    pub fn required_fields_for(
        &self,
        class: ClassId,
        audience: Audience,
    ) -> Result<Vec<FieldId>, SchemaError> {
        let spec = self.class(class)?;
        let mut required = Vec::new();
        for id in &spec.fields {
            let field = self.field(*id)?;
            if !field.modifiers.required || field.is_molecular() {
                continue;
            }
            if let Audience::Client { is_owner } = audience {
                if !field.modifiers.visible_to_client(is_owner) {
                    continue;
                }
            }
            required.push(*id);
        }
        Ok(required)
    }

    /// Deterministic 32-bit digest of the declaration list
    pub fn hash(&self) -> u32 {
        self.hash
    }
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u32).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_declaration(hasher: &mut blake3::Hasher, declaration: &Declaration) {
    match declaration {
        Declaration::Struct(decl) => {
            hash_str(hasher, "struct");
            hash_str(hasher, &decl.name);
            for member in &decl.fields {
                hash_str(hasher, &member.name);
                hash_str(hasher, &member.field_type.to_string());
            }
        }
        Declaration::Class(decl) => {
            hash_str(hasher, "class");
            hash_str(hasher, &decl.name);
            hash_str(hasher, &decl.parents.join(","));
            for field in &decl.fields {
                hash_str(hasher, &field.name);
                match &field.kind {
                    FieldKind::Atomic(ty) => hash_str(hasher, &ty.to_string()),
                    FieldKind::Molecular(atoms) => {
                        hash_str(hasher, "molecular");
                        hash_str(hasher, &atoms.join(","));
                    }
                }
                hash_str(hasher, &field.modifiers.to_string());
            }
        }
    }
    hash_str(hasher, ";");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::SchemaError;
    use crate::schema::declaration::SchemaBuilder;

    fn avatar_schema() -> SchemaBuilder {
        SchemaBuilder::new()
            .class("DistributedObject", &[], |c| {
                c.field("name", FieldType::String, FieldModifiers::new().required().broadcast());
            })
            .structure("Vec2", |s| {
                s.field("x", FieldType::Int16).field("y", FieldType::Int16);
            })
            .class("DistributedAvatar", &["DistributedObject"], |c| {
                c.field("x", FieldType::Int16, FieldModifiers::new().required().broadcast())
                    .field("y", FieldType::Int16, FieldModifiers::new().required().broadcast())
                    .field("secret", FieldType::UInt32, FieldModifiers::new().required().db())
                    .field("inventory", FieldType::Blob, FieldModifiers::new().required().ownrecv())
                    .molecular("pos", &["x", "y"]);
            })
    }

    #[test]
    fn test_ids_walk_all_declarations() {
        let schema = avatar_schema().build().unwrap();

        // Struct members consume field ids 1 and 2
        let avatar = schema.class_id("DistributedAvatar").unwrap();
        assert_eq!(avatar, ClassId::new(2));
        assert_eq!(schema.field_by_name(avatar, "x").unwrap().id, FieldId::new(3));
        assert_eq!(schema.field_count(), 8);

        // Structs share the class number space but are not classes
        assert!(schema.class(ClassId::new(1)).is_err());
        assert_eq!(schema.struct_spec("Vec2").unwrap().id, ClassId::new(1));
        assert_eq!(
            schema.struct_type("Vec2").unwrap(),
            FieldType::Tuple(vec![FieldType::Int16, FieldType::Int16])
        );
    }

    #[test]
    fn test_build_is_deterministic() {
        let first = avatar_schema().build().unwrap();
        let second = avatar_schema().build().unwrap();
        let avatar = first.class_id("DistributedAvatar").unwrap();

        assert_eq!(first.fields_of(avatar).unwrap(), second.fields_of(avatar).unwrap());
        assert_eq!(first.hash(), second.hash());
        for class in first.classes() {
            assert_eq!(second.class(class.id).unwrap(), class);
        }
    }

    #[test]
    fn test_hash_tracks_declarations() {
        let base = avatar_schema().build().unwrap();
        let changed = avatar_schema()
            .class("Extra", &[], |c| {
                c.field("n", FieldType::UInt8, FieldModifiers::new());
            })
            .build()
            .unwrap();
        assert_ne!(base.hash(), changed.hash());
    }

    #[test]
    fn test_inherited_fields_sorted() {
        let schema = avatar_schema().build().unwrap();
        let avatar = schema.class_id("DistributedAvatar").unwrap();
        let ids: Vec<u16> = schema.fields_of(avatar).unwrap().iter().map(|f| f.get()).collect();
        assert_eq!(ids, vec![0, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_child_shadows_parent_field() {
        let schema = SchemaBuilder::new()
            .class("Parent", &[], |c| {
                c.field("a", FieldType::UInt8, FieldModifiers::new())
                    .field("b", FieldType::UInt8, FieldModifiers::new().required());
            })
            .class("Child", &["Parent"], |c| {
                c.field("b", FieldType::String, FieldModifiers::new().required().broadcast())
                    .field("c", FieldType::UInt8, FieldModifiers::new());
            })
            .build()
            .unwrap();

        let child = schema.class_id("Child").unwrap();
        let fields = schema.fields_of(child).unwrap();
        assert_eq!(fields, &[FieldId::new(0), FieldId::new(2), FieldId::new(3)]);

        let b = schema.field_by_name(child, "b").unwrap();
        assert_eq!(b.id, FieldId::new(2));
        assert_eq!(b.field_type, FieldType::String);

        let names: Vec<&str> = fields
            .iter()
            .map(|id| schema.field(*id).unwrap().name.as_str())
            .collect();
        assert_eq!(names.iter().filter(|n| **n == "b").count(), 1);
    }

    #[test]
    fn test_shadowing_follows_processing_order() {
        // C lists B before A, so A's "x" is processed last and survives even
        // though it has the lower id
        let schema = SchemaBuilder::new()
            .class("A", &[], |c| {
                c.field("x", FieldType::UInt8, FieldModifiers::new());
            })
            .class("B", &[], |c| {
                c.field("x", FieldType::UInt16, FieldModifiers::new());
            })
            .class("C", &["B", "A"], |_| {})
            .build()
            .unwrap();

        let c = schema.class_id("C").unwrap();
        assert_eq!(schema.fields_of(c).unwrap(), &[FieldId::new(0)]);
    }

    #[test]
    fn test_required_fields_by_audience() {
        let schema = SchemaBuilder::new()
            .class("Thing", &[], |c| {
                c.field("seen", FieldType::UInt32, FieldModifiers::new().required().broadcast())
                    .field("hidden", FieldType::UInt32, FieldModifiers::new().required())
                    .field("mine", FieldType::UInt32, FieldModifiers::new().required().ownrecv());
            })
            .build()
            .unwrap();
        let thing = schema.class_id("Thing").unwrap();

        assert_eq!(
            schema
                .required_fields_for(thing, Audience::Client { is_owner: false })
                .unwrap(),
            vec![FieldId::new(0)]
        );
        assert_eq!(
            schema
                .required_fields_for(thing, Audience::Client { is_owner: true })
                .unwrap(),
            vec![FieldId::new(0), FieldId::new(2)]
        );
        assert_eq!(
            schema.required_fields_for(thing, Audience::Internal).unwrap(),
            vec![FieldId::new(0), FieldId::new(1), FieldId::new(2)]
        );
    }

    #[test]
    fn test_molecular_fields() {
        let schema = avatar_schema().build().unwrap();
        let avatar = schema.class_id("DistributedAvatar").unwrap();
        let pos = schema.field_by_name(avatar, "pos").unwrap();

        assert_eq!(pos.molecular, Some(vec![FieldId::new(3), FieldId::new(4)]));
        assert_eq!(pos.field_type, FieldType::Tuple(vec![FieldType::Int16, FieldType::Int16]));
        // Keywords come from the first atom
        assert!(pos.modifiers.broadcast);

        // Molecular fields never appear in required lists
        let required = schema.required_fields_for(avatar, Audience::Internal).unwrap();
        assert!(!required.contains(&pos.id));
    }

    #[test]
    fn test_single_atom_molecular_uses_atom_type() {
        let schema = SchemaBuilder::new()
            .class("T", &[], |c| {
                c.field("a", FieldType::UInt64, FieldModifiers::new())
                    .molecular("alias", &["a"]);
            })
            .build()
            .unwrap();
        let t = schema.class_id("T").unwrap();
        assert_eq!(schema.field_by_name(t, "alias").unwrap().field_type, FieldType::UInt64);
    }

    #[test]
    fn test_shadowed_atom_rejected() {
        let shadowed = SchemaBuilder::new()
            .class("Point", &[], |c| {
                c.field("x", FieldType::Int32, FieldModifiers::new())
                    .field("y", FieldType::Int32, FieldModifiers::new())
                    .molecular("pos", &["x", "y"]);
            })
            .class("Marker", &["Point"], |c| {
                c.field("x", FieldType::String, FieldModifiers::new());
            })
            .build();
        assert_eq!(
            shadowed.unwrap_err(),
            SchemaError::ShadowedAtom {
                class: "Marker".into(),
                field: "pos".into(),
                atom: "x".into(),
            }
        );

        // Shadowing a field no molecular depends on is still fine
        let schema = SchemaBuilder::new()
            .class("Point", &[], |c| {
                c.field("x", FieldType::Int32, FieldModifiers::new())
                    .field("y", FieldType::Int32, FieldModifiers::new())
                    .field("tag", FieldType::UInt8, FieldModifiers::new())
                    .molecular("pos", &["x", "y"]);
            })
            .class("Marker", &["Point"], |c| {
                c.field("tag", FieldType::String, FieldModifiers::new());
            })
            .build()
            .unwrap();
        let marker = schema.class_id("Marker").unwrap();
        assert!(schema.field_by_name(marker, "pos").is_ok());
    }

    #[test]
    fn test_check_write() {
        let schema = avatar_schema().build().unwrap();
        let avatar = schema.class_id("DistributedAvatar").unwrap();
        let pos = schema.field_by_name(avatar, "pos").unwrap().id;

        let ok = FieldValue::Tuple(vec![FieldValue::Int16(1), FieldValue::Int16(2)]);
        assert_eq!(schema.check_write(avatar, pos, &ok).unwrap().id, pos);

        let wrong = FieldValue::Tuple(vec![FieldValue::Int16(1)]);
        assert!(matches!(
            schema.check_write(avatar, pos, &wrong),
            Err(SchemaError::TypeMismatch { field, .. }) if field == pos
        ));

        let base = schema.class_id("DistributedObject").unwrap();
        assert_eq!(
            schema.check_write(base, pos, &ok).unwrap_err(),
            SchemaError::FieldNotInClass { class: base, field: pos }
        );
    }

    #[test]
    fn test_schema_errors() {
        let unknown_parent = SchemaBuilder::new().class("Child", &["Missing"], |_| {}).build();
        assert!(matches!(unknown_parent, Err(SchemaError::UnknownParent { .. })));

        let duplicate = SchemaBuilder::new()
            .class("Same", &[], |_| {})
            .structure("Same", |_| {})
            .build();
        assert_eq!(duplicate.unwrap_err(), SchemaError::DuplicateName("Same".into()));

        let bad_atom = SchemaBuilder::new()
            .class("T", &[], |c| {
                c.molecular("m", &["nope"]);
            })
            .build();
        assert!(matches!(bad_atom, Err(SchemaError::UnknownAtom { .. })));

        let nested = SchemaBuilder::new()
            .class("T", &[], |c| {
                c.field("a", FieldType::UInt8, FieldModifiers::new())
                    .molecular("m1", &["a"])
                    .molecular("m2", &["m1"]);
            })
            .build();
        assert!(matches!(nested, Err(SchemaError::NestedMolecular { .. })));

        let bad_default = SchemaBuilder::new()
            .class("T", &[], |c| {
                c.field_with_default("a", FieldType::UInt8, FieldModifiers::new(), FieldValue::from("x"));
            })
            .build();
        assert_eq!(bad_default.unwrap_err(), SchemaError::InvalidDefault("a".into()));
    }

    #[test]
    fn test_class_field_membership() {
        let schema = avatar_schema().build().unwrap();
        let base = schema.class_id("DistributedObject").unwrap();
        assert!(schema.class_field(base, FieldId::new(0)).is_ok());
        assert_eq!(
            schema.class_field(base, FieldId::new(3)).unwrap_err(),
            SchemaError::FieldNotInClass {
                class: base,
                field: FieldId::new(3)
            }
        );
        assert_eq!(
            schema.field(FieldId::new(500)).unwrap_err(),
            SchemaError::UnknownField(FieldId::new(500))
        );
    }

    #[test]
    fn test_defaults_are_kept() {
        let schema = SchemaBuilder::new()
            .class("T", &[], |c| {
                c.field_with_default("hp", FieldType::UInt16, FieldModifiers::new(), FieldValue::UInt16(100));
            })
            .build()
            .unwrap();
        let t = schema.class_id("T").unwrap();
        assert_eq!(
            schema.field_by_name(t, "hp").unwrap().default,
            Some(FieldValue::UInt16(100))
        );
    }
}
