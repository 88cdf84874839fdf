//! Resolved schema entries
//!
//! These are produced by [`SchemaRepository::build`](super::SchemaRepository::build)
//! and are immutable afterwards.

use crate::core::types::{ClassId, FieldId};
use crate::wire::value::{FieldType, FieldValue};
use std::fmt;

/// Visibility and persistence keywords of a field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FieldModifiers {
    /// Must be supplied when the object is created
    pub required: bool,
    /// Sent to every client with interest in the object
    pub broadcast: bool,
    /// Kept in the state server's memory
    pub ram: bool,
    /// Persisted to the database
    pub db: bool,
    /// The owning client may send updates
    pub ownsend: bool,
    /// The owning client receives updates
    pub ownrecv: bool,
    /// Any client may send updates
    pub clsend: bool,
    /// Any client receives updates
    pub clrecv: bool,
    /// AI processes receive updates
    pub airecv: bool,
}

/// Keyword spelling, in canonical order
pub const MODIFIER_KEYWORDS: [&str; 9] = [
    "required", "broadcast", "ram", "db", "ownsend", "ownrecv", "clsend", "clrecv", "airecv",
];

macro_rules! modifier_setters {
    ($($name:ident),*) => {
        $(
            #[doc = concat!("Set `", stringify!($name), "`")]
            pub fn $name(mut self) -> Self {
                self.$name = true;
                self
            }
        )*
    };
}

impl FieldModifiers {
    /// No keywords set
    pub fn new() -> Self {
        Self::default()
    }

    modifier_setters!(required, broadcast, ram, db, ownsend, ownrecv, clsend, clrecv, airecv);

    /// Parse from a list of keywords
    pub fn from_keywords<'a, I>(keywords: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut modifiers = Self::default();
        for keyword in keywords {
            let flag = match keyword {
                "required" => &mut modifiers.required,
                "broadcast" => &mut modifiers.broadcast,
                "ram" => &mut modifiers.ram,
                "db" => &mut modifiers.db,
                "ownsend" => &mut modifiers.ownsend,
                "ownrecv" => &mut modifiers.ownrecv,
                "clsend" => &mut modifiers.clsend,
                "clrecv" => &mut modifiers.clrecv,
                "airecv" => &mut modifiers.airecv,
                other => return Err(format!("unknown field keyword '{}'", other)),
            };
            *flag = true;
        }
        Ok(modifiers)
    }

    /// Keywords that are set, in canonical order
    pub fn keywords(&self) -> Vec<&'static str> {
        let flags = [
            self.required,
            self.broadcast,
            self.ram,
            self.db,
            self.ownsend,
            self.ownrecv,
            self.clsend,
            self.clrecv,
            self.airecv,
        ];
        MODIFIER_KEYWORDS
            .iter()
            .zip(flags)
            .filter(|(_, set)| *set)
            .map(|(keyword, _)| *keyword)
            .collect()
    }

    /// Whether a client (the owner, or any other client) receives this field
    pub fn visible_to_client(&self, is_owner: bool) -> bool {
        self.broadcast || self.clrecv || (is_owner && self.ownrecv)
    }

    /// Whether a client would be allowed to originate an update.
    ///
    /// Advisory only. The replication core never rejects updates on this
    /// basis; the state server is the enforcing party.
    pub fn client_may_send(&self, is_owner: bool) -> bool {
        self.clsend || (is_owner && self.ownsend)
    }
}

impl fmt::Display for FieldModifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.keywords().join(" "))
    }
}

/// A field with its assigned id
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Schema-wide id
    pub id: FieldId,
    /// Field name, unique within its declaring class
    pub name: String,
    /// Wire type; for molecular fields the atom type or tuple of atom types
    pub field_type: FieldType,
    /// Keywords
    pub modifiers: FieldModifiers,
    /// Atom ids when this is a molecular field
    pub molecular: Option<Vec<FieldId>>,
    /// Value assumed when none has been received
    pub default: Option<FieldValue>,
    /// Declaration (class or struct) the field belongs to
    pub declared_in: ClassId,
}

impl FieldSpec {
    /// Whether this field is a composite of other fields
    pub fn is_molecular(&self) -> bool {
        self.molecular.is_some()
    }
}

/// A distributed class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSpec {
    /// Declaration number
    pub id: ClassId,
    /// Class name
    pub name: String,
    /// Direct parents in declared order
    pub parents: Vec<String>,
    /// Fields declared by this class itself, in declared order
    pub own_fields: Vec<FieldId>,
    /// Own and inherited fields after shadowing, sorted by id
    pub fields: Vec<FieldId>,
}

impl ClassSpec {
    /// Whether the field is part of this class, inherited fields included
    pub fn has_field(&self, field: FieldId) -> bool {
        self.fields.binary_search(&field).is_ok()
    }
}

/// A reusable value shape; never replicated as an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructSpec {
    /// Declaration number
    pub id: ClassId,
    /// Struct name
    pub name: String,
    /// Member fields in declared order
    pub fields: Vec<FieldId>,
}

/// Who an initial-state message is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Another cluster participant (AI or state server)
    Internal,
    /// A client, possibly the object's owner
    Client {
        /// Whether the client owns the object
        is_owner: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_round_trip() {
        let modifiers = FieldModifiers::new().required().broadcast().airecv();
        assert_eq!(modifiers.keywords(), vec!["required", "broadcast", "airecv"]);
        assert_eq!(FieldModifiers::from_keywords(modifiers.keywords()), Ok(modifiers));
        assert_eq!(modifiers.to_string(), "required broadcast airecv");
        assert!(FieldModifiers::from_keywords(["owner"]).is_err());
    }

    #[test]
    fn test_client_visibility() {
        let owner_only = FieldModifiers::new().ownrecv();
        assert!(!owner_only.visible_to_client(false));
        assert!(owner_only.visible_to_client(true));
        assert!(FieldModifiers::new().clrecv().visible_to_client(false));
    }

    #[test]
    fn test_client_send_is_advisory() {
        let modifiers = FieldModifiers::new().ownsend();
        assert!(modifiers.client_may_send(true));
        assert!(!modifiers.client_may_send(false));
        assert!(FieldModifiers::new().clsend().client_may_send(false));
    }
}
