//! Live distributed objects
//!
//! A [`DistributedEntity`] holds the current field values of one replicated
//! object and the user implementations registered for its class. Every
//! mutation goes through [`DistributedEntity::set_field`], which stores the
//! value, runs callbacks, fans molecular fields out to their atoms and hands
//! locally originated updates to an [`UpdateSink`].

use crate::core::error::{Error, Result};
use crate::core::types::{ChannelId, ClassId, FieldId, ObjectId, ZoneId};
use crate::schema::SchemaRepository;
use crate::wire::value::FieldValue;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Current values by field id
pub type FieldMap = BTreeMap<FieldId, FieldValue>;

/// Where an update came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Requested by code in this process; propagated to the cluster
    Local,
    /// Received from the cluster, or derived from another update
    Network {
        /// Sending channel, when the dialect carries one
        sender: Option<ChannelId>,
    },
}

impl Origin {
    /// Sending channel of a network update
    pub fn sender(&self) -> Option<ChannelId> {
        match self {
            Origin::Local => None,
            Origin::Network { sender } => *sender,
        }
    }
}

/// Receives locally originated updates for sending
pub trait UpdateSink {
    /// Send one field update for `object`
    fn propagate(&mut self, object: ObjectId, field: FieldId, value: &FieldValue) -> Result<()>;
}

/// Sink that drops everything. Used while applying an initial state that
/// arrived as one message.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl UpdateSink for Discard {
    fn propagate(&mut self, _: ObjectId, _: FieldId, _: &FieldValue) -> Result<()> {
        Ok(())
    }
}

/// User implementation of a distributed class
///
/// All hooks run on the repository's dispatch task, in message order. To
/// change fields from inside a hook, queue the change through the
/// [`FieldSetter`](super::FieldSetter) handed to the factory.
pub trait DistributedObject: Send + 'static {
    /// A field was stored
    fn on_field_update(&mut self, _field: FieldId, _value: &FieldValue, _sender: Option<ChannelId>) {}

    /// All initial fields have been applied
    fn after_init(&mut self, _state: &FieldMap) {}

    /// The object was deleted, left interest, or the repository closed
    fn on_delete(&mut self) {}
}

type FieldCallback = Box<dyn FnMut(&FieldValue, Option<ChannelId>) + Send>;

/// [`DistributedObject`] assembled from closures
#[derive(Default)]
pub struct CallbackObject {
    fields: HashMap<FieldId, Vec<FieldCallback>>,
    init: Option<Box<dyn FnMut(&FieldMap) + Send>>,
    delete: Option<Box<dyn FnMut() + Send>>,
}

impl CallbackObject {
    /// No callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `f` whenever `field` is stored
    pub fn on_field<F>(mut self, field: FieldId, f: F) -> Self
    where
        F: FnMut(&FieldValue, Option<ChannelId>) + Send + 'static,
    {
        self.fields.entry(field).or_default().push(Box::new(f));
        self
    }

    /// Call `f` once the initial state is applied
    pub fn on_init<F>(mut self, f: F) -> Self
    where
        F: FnMut(&FieldMap) + Send + 'static,
    {
        self.init = Some(Box::new(f));
        self
    }

    /// Call `f` on deletion
    pub fn on_delete<F>(mut self, f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.delete = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for CallbackObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackObject")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("init", &self.init.is_some())
            .field("delete", &self.delete.is_some())
            .finish()
    }
}

impl DistributedObject for CallbackObject {
    fn on_field_update(&mut self, field: FieldId, value: &FieldValue, sender: Option<ChannelId>) {
        if let Some(callbacks) = self.fields.get_mut(&field) {
            for callback in callbacks {
                callback(value, sender);
            }
        }
    }

    fn after_init(&mut self, state: &FieldMap) {
        if let Some(init) = self.init.as_mut() {
            init(state);
        }
    }

    fn on_delete(&mut self) {
        if let Some(delete) = self.delete.as_mut() {
            delete();
        }
    }
}

/// One replicated object
pub struct DistributedEntity {
    id: ObjectId,
    class: ClassId,
    parent: ObjectId,
    zone: ZoneId,
    fields: FieldMap,
    implementations: Vec<Box<dyn DistributedObject>>,
    alive: bool,
}

impl DistributedEntity {
    /// Entity with no values and no implementations
    pub fn new(id: ObjectId, class: ClassId) -> Self {
        Self {
            id,
            class,
            parent: ObjectId::new(0),
            zone: ZoneId::new(0),
            fields: FieldMap::new(),
            implementations: Vec::new(),
            alive: true,
        }
    }

    /// Attach implementations
    pub fn with_implementations(mut self, implementations: Vec<Box<dyn DistributedObject>>) -> Self {
        self.implementations = implementations;
        self
    }

    /// Object id
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Class id
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Current parent and zone
    pub fn location(&self) -> (ObjectId, ZoneId) {
        (self.parent, self.zone)
    }

    /// Record a new parent and zone
    pub fn set_location(&mut self, parent: ObjectId, zone: ZoneId) {
        self.parent = parent;
        self.zone = zone;
    }

    /// Whether the entity has not been deleted
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Number of registered implementations
    pub fn implementation_count(&self) -> usize {
        self.implementations.len()
    }

    /// Last stored value
    pub fn get_field(&self, field: FieldId) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// Last stored value, else the field's declared default
    pub fn get_field_or_default<'a>(
        &'a self,
        schema: &'a SchemaRepository,
        field: FieldId,
    ) -> Option<&'a FieldValue> {
        self.fields
            .get(&field)
            .or_else(|| schema.field(field).ok().and_then(|spec| spec.default.as_ref()))
    }

    /// All stored values
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Store a value and run everything that follows from it.
    ///
    /// In order: the value is stored, every implementation's
    /// `on_field_update` runs, a molecular value is split and each atom set
    /// as a network update, and finally a `Local` update is handed to `sink`.
    /// Atoms are never propagated on their own.
    pub fn set_field(
        &mut self,
        schema: &SchemaRepository,
        field: FieldId,
        value: FieldValue,
        origin: Origin,
        sink: &mut dyn UpdateSink,
    ) -> Result<()> {
        if !self.alive {
            return Err(Error::DeadEntity { object: self.id });
        }
        let spec = schema.check_write(self.class, field, &value)?;

        self.fields.insert(field, value.clone());
        let sender = origin.sender();
        for implementation in &mut self.implementations {
            implementation.on_field_update(field, &value, sender);
        }

        if let Some(atoms) = &spec.molecular {
            let derived = Origin::Network { sender };
            if let [atom] = atoms.as_slice() {
                self.set_field(schema, *atom, value.clone(), derived, &mut Discard)?;
            } else if let Some(parts) = value.as_tuple() {
                for (atom, part) in atoms.iter().zip(parts) {
                    self.set_field(schema, *atom, part.clone(), derived, &mut Discard)?;
                }
            }
        }

        if origin == Origin::Local {
            sink.propagate(self.id, field, &value)?;
        }
        Ok(())
    }

    /// Run every implementation's `after_init`
    pub fn finish_init(&mut self) {
        for implementation in &mut self.implementations {
            implementation.after_init(&self.fields);
        }
    }

    /// Mark dead and run `on_delete`. Later calls do nothing.
    pub fn delete(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        for implementation in &mut self.implementations {
            implementation.on_delete();
        }
    }
}

impl fmt::Debug for DistributedEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedEntity")
            .field("id", &self.id)
            .field("class", &self.class)
            .field("parent", &self.parent)
            .field("zone", &self.zone)
            .field("fields", &self.fields)
            .field("implementations", &self.implementations.len())
            .field("alive", &self.alive)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::SchemaError;
    use crate::schema::{FieldModifiers, SchemaBuilder};
    use crate::wire::value::FieldType;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        sent: Vec<(ObjectId, FieldId, FieldValue)>,
    }

    impl UpdateSink for Recorder {
        fn propagate(&mut self, object: ObjectId, field: FieldId, value: &FieldValue) -> Result<()> {
            self.sent.push((object, field, value.clone()));
            Ok(())
        }
    }

    fn schema() -> SchemaRepository {
        let mods = FieldModifiers::new().broadcast().ram();
        SchemaBuilder::new()
            .class("Avatar", &[], |c| {
                c.field("x", FieldType::Int32, mods)
                    .field("y", FieldType::Int32, mods)
                    .field_with_default("name", FieldType::String, mods, FieldValue::from("anon"))
                    .molecular("pos", &["x", "y"])
                    .molecular("alias", &["name"]);
            })
            .build()
            .unwrap()
    }

    fn field(schema: &SchemaRepository, name: &str) -> FieldId {
        schema.field_by_name(ClassId::new(0), name).unwrap().id
    }

    /// Records (field, value, sender) for every callback
    fn logging_object(log: Arc<Mutex<Vec<(FieldId, FieldValue, Option<ChannelId>)>>>) -> Box<dyn DistributedObject> {
        struct Logger(Arc<Mutex<Vec<(FieldId, FieldValue, Option<ChannelId>)>>>);
        impl DistributedObject for Logger {
            fn on_field_update(&mut self, field: FieldId, value: &FieldValue, sender: Option<ChannelId>) {
                self.0.lock().unwrap().push((field, value.clone(), sender));
            }
        }
        Box::new(Logger(log))
    }

    #[test]
    fn test_molecular_fan_out() {
        let schema = schema();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut entity = DistributedEntity::new(ObjectId::new(9), ClassId::new(0))
            .with_implementations(vec![logging_object(log.clone())]);
        let mut sink = Recorder::default();

        let pos = field(&schema, "pos");
        let value = FieldValue::Tuple(vec![FieldValue::Int32(3), FieldValue::Int32(-4)]);
        entity
            .set_field(&schema, pos, value.clone(), Origin::Local, &mut sink)
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[0], (pos, value.clone(), None));
        assert_eq!(log[1], (field(&schema, "x"), FieldValue::Int32(3), None));
        assert_eq!(log[2], (field(&schema, "y"), FieldValue::Int32(-4), None));

        // Only the molecular update itself goes out
        assert_eq!(sink.sent, vec![(ObjectId::new(9), pos, value)]);
        assert_eq!(entity.get_field(field(&schema, "y")), Some(&FieldValue::Int32(-4)));
    }

    #[test]
    fn test_single_atom_molecular_passes_value_through() {
        let schema = schema();
        let mut entity = DistributedEntity::new(ObjectId::new(9), ClassId::new(0));
        let alias = field(&schema, "alias");
        let sender = Some(ChannelId::new(77));
        entity
            .set_field(
                &schema,
                alias,
                FieldValue::from("zed"),
                Origin::Network { sender },
                &mut Discard,
            )
            .unwrap();
        assert_eq!(
            entity.get_field(field(&schema, "name")),
            Some(&FieldValue::from("zed"))
        );
    }

    #[test]
    fn test_network_update_not_propagated() {
        let schema = schema();
        let mut entity = DistributedEntity::new(ObjectId::new(9), ClassId::new(0));
        let mut sink = Recorder::default();
        entity
            .set_field(
                &schema,
                field(&schema, "x"),
                FieldValue::Int32(1),
                Origin::Network { sender: None },
                &mut sink,
            )
            .unwrap();
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn test_sender_reaches_callbacks() {
        let schema = schema();
        let seen = Arc::new(Mutex::new(None));
        let seen_in = seen.clone();
        let x = field(&schema, "x");
        let object = CallbackObject::new().on_field(x, move |_, sender| {
            *seen_in.lock().unwrap() = sender;
        });
        let mut entity = DistributedEntity::new(ObjectId::new(9), ClassId::new(0))
            .with_implementations(vec![Box::new(object)]);
        entity
            .set_field(
                &schema,
                x,
                FieldValue::Int32(1),
                Origin::Network {
                    sender: Some(ChannelId::new(5)),
                },
                &mut Discard,
            )
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(ChannelId::new(5)));
    }

    #[test]
    fn test_dead_entity_rejects_updates() {
        let schema = schema();
        let deleted = Arc::new(Mutex::new(0));
        let deleted_in = deleted.clone();
        let object = CallbackObject::new().on_delete(move || *deleted_in.lock().unwrap() += 1);
        let mut entity = DistributedEntity::new(ObjectId::new(9), ClassId::new(0))
            .with_implementations(vec![Box::new(object)]);

        entity.delete();
        entity.delete();
        assert_eq!(*deleted.lock().unwrap(), 1);
        assert!(!entity.is_alive());

        let err = entity
            .set_field(&schema, field(&schema, "x"), FieldValue::Int32(1), Origin::Local, &mut Discard)
            .unwrap_err();
        assert!(matches!(err, Error::DeadEntity { object } if object == ObjectId::new(9)));
    }

    #[test]
    fn test_type_and_membership_checks() {
        let schema = schema();
        let mut entity = DistributedEntity::new(ObjectId::new(9), ClassId::new(0));
        let err = entity
            .set_field(&schema, field(&schema, "x"), FieldValue::UInt8(1), Origin::Local, &mut Discard)
            .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::TypeMismatch { .. })));

        let err = entity
            .set_field(&schema, FieldId::new(400), FieldValue::UInt8(1), Origin::Local, &mut Discard)
            .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::FieldNotInClass { .. })));
    }

    #[test]
    fn test_rejected_molecular_write_leaves_atoms_untouched() {
        let schema = schema();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut entity = DistributedEntity::new(ObjectId::new(9), ClassId::new(0))
            .with_implementations(vec![logging_object(log.clone())]);
        let mut sink = Recorder::default();

        let pos = field(&schema, "pos");
        let bad = FieldValue::Tuple(vec![FieldValue::Int32(3), FieldValue::from("north")]);
        let err = entity
            .set_field(&schema, pos, bad, Origin::Local, &mut sink)
            .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::TypeMismatch { .. })));

        assert_eq!(entity.get_field(pos), None);
        assert_eq!(entity.get_field(field(&schema, "x")), None);
        assert!(log.lock().unwrap().is_empty());
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn test_defaults_and_init() {
        let schema = schema();
        let name = field(&schema, "name");
        let inits = Arc::new(Mutex::new(0usize));
        let inits_in = inits.clone();
        let object = CallbackObject::new().on_init(move |state| {
            *inits_in.lock().unwrap() = state.len();
        });
        let mut entity = DistributedEntity::new(ObjectId::new(9), ClassId::new(0))
            .with_implementations(vec![Box::new(object)]);

        assert_eq!(entity.get_field(name), None);
        assert_eq!(
            entity.get_field_or_default(&schema, name),
            Some(&FieldValue::from("anon"))
        );

        entity
            .set_field(&schema, field(&schema, "x"), FieldValue::Int32(2), Origin::Network { sender: None }, &mut Discard)
            .unwrap();
        entity.finish_init();
        assert_eq!(*inits.lock().unwrap(), 1);
    }
}
