//! Implementation registry
//!
//! Maps each class to the factories that build its local implementations.
//! Registration is explicit; nothing is discovered at runtime.

use crate::core::error::{Error, NetworkError, Result};
use crate::core::types::{ClassId, FieldId, ObjectId};
use crate::object::entity::DistributedObject;
use crate::repository::Request;
use crate::schema::SchemaRepository;
use crate::wire::value::FieldValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Builds one implementation for a newly known object
pub type Factory = Box<dyn Fn(&ObjectContext) -> Box<dyn DistributedObject> + Send + Sync>;

/// Queues local field changes into the owning repository
#[derive(Clone)]
pub struct FieldSetter {
    object: ObjectId,
    requests: mpsc::UnboundedSender<Request>,
}

impl FieldSetter {
    pub(crate) fn new(object: ObjectId, requests: mpsc::UnboundedSender<Request>) -> Self {
        Self { object, requests }
    }

    /// Object this setter writes to
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Queue a local update of `field`. It is applied and sent after the
    /// current callback returns.
    pub fn set(&self, field: FieldId, value: FieldValue) -> Result<()> {
        self.requests
            .send(Request::SetField {
                object: self.object,
                field,
                value,
                recipient: None,
                reply: None,
            })
            .map_err(|_| Error::Network(NetworkError::Closed))
    }
}

impl fmt::Debug for FieldSetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSetter").field("object", &self.object).finish()
    }
}

/// What a factory knows about the object it builds for
#[derive(Debug, Clone)]
pub struct ObjectContext {
    /// Object id
    pub object_id: ObjectId,
    /// Object class
    pub class_id: ClassId,
    /// Schema the repository runs with
    pub schema: Arc<SchemaRepository>,
    /// Handle for local field changes
    pub setter: FieldSetter,
}

/// Well-known singleton object present from launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UberObject {
    /// Fixed object id
    pub object_id: ObjectId,
    /// Object class
    pub class_id: ClassId,
}

/// Factories by class, plus uber objects
#[derive(Default)]
pub struct ClassRegistry {
    factories: HashMap<ClassId, Vec<Factory>>,
    ubers: Vec<UberObject>,
}

impl ClassRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a factory for `class`. Several factories per class are allowed;
    /// each builds its own implementation of every object of the class.
    pub fn register<F>(&mut self, class: ClassId, factory: F) -> &mut Self
    where
        F: Fn(&ObjectContext) -> Box<dyn DistributedObject> + Send + Sync + 'static,
    {
        self.factories.entry(class).or_default().push(Box::new(factory));
        self
    }

    /// Declare a singleton object that exists from launch
    pub fn register_uber(&mut self, object_id: ObjectId, class_id: ClassId) -> &mut Self {
        self.ubers.push(UberObject {
            object_id,
            class_id,
        });
        self
    }

    /// Registered singletons in registration order
    pub fn ubers(&self) -> &[UberObject] {
        &self.ubers
    }

    /// Whether any factory is registered for `class`
    pub fn has_class(&self, class: ClassId) -> bool {
        self.factories.get(&class).is_some_and(|f| !f.is_empty())
    }

    /// Build every registered implementation for the object in `context`
    pub fn instantiate(&self, context: &ObjectContext) -> Vec<Box<dyn DistributedObject>> {
        self.factories
            .get(&context.class_id)
            .map(|factories| factories.iter().map(|factory| factory(context)).collect())
            .unwrap_or_default()
    }
}

impl fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self.factories.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("ClassRegistry")
            .field("factories", &counts)
            .field("ubers", &self.ubers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::entity::CallbackObject;
    use crate::schema::SchemaBuilder;

    fn context(class: ClassId, tx: mpsc::UnboundedSender<Request>) -> ObjectContext {
        let schema = SchemaBuilder::new().class("Empty", &[], |_| {}).build().unwrap();
        ObjectContext {
            object_id: ObjectId::new(100),
            class_id: class,
            schema: Arc::new(schema),
            setter: FieldSetter::new(ObjectId::new(100), tx),
        }
    }

    #[test]
    fn test_instantiate_all_factories() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = ClassRegistry::new();
        registry
            .register(ClassId::new(0), |_| Box::new(CallbackObject::new()))
            .register(ClassId::new(0), |_| Box::new(CallbackObject::new()));

        assert!(registry.has_class(ClassId::new(0)));
        assert!(!registry.has_class(ClassId::new(1)));
        assert_eq!(registry.instantiate(&context(ClassId::new(0), tx.clone())).len(), 2);
        assert!(registry.instantiate(&context(ClassId::new(1), tx)).is_empty());
    }

    #[test]
    fn test_setter_queues_request() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = context(ClassId::new(0), tx);
        ctx.setter.set(FieldId::new(3), FieldValue::UInt8(1)).unwrap();

        match rx.try_recv().unwrap() {
            Request::SetField {
                object, field, value, ..
            } => {
                assert_eq!(object, ObjectId::new(100));
                assert_eq!(field, FieldId::new(3));
                assert_eq!(value, FieldValue::UInt8(1));
            }
            other => panic!("unexpected request {:?}", other),
        }

        drop(rx);
        assert!(ctx.setter.set(FieldId::new(3), FieldValue::UInt8(1)).is_err());
    }

    #[test]
    fn test_uber_registration() {
        let mut registry = ClassRegistry::new();
        registry.register_uber(ObjectId::new(4665), ClassId::new(3));
        assert_eq!(
            registry.ubers(),
            &[UberObject {
                object_id: ObjectId::new(4665),
                class_id: ClassId::new(3)
            }]
        );
    }
}
