//! Dispatch machinery shared by the client and internal repositories
//!
//! One dispatch task per repository owns the entity table. Inbound frames
//! arrive on a bounded channel from the socket reader; local requests arrive
//! on an unbounded channel from handles and object callbacks. Both are
//! consumed by the same `select!` loop, so every mutation happens on one task.

use crate::comms::frame::Frame;
use crate::comms::messages::ObjectEntry;
use crate::comms::network::{Connection, FrameSender};
use crate::comms::protocol;
use crate::core::error::{Error, NetworkError, Result};
use crate::core::types::{ChannelId, ClassId, FieldId, InterestId, ObjectId, ZoneId};
use crate::object::{
    ClassRegistry, Discard, DistributedEntity, FieldSetter, ObjectContext, Origin, UpdateSink,
};
use crate::repository::client::ClientCommand;
use crate::repository::internal::InternalCommand;
use crate::schema::SchemaRepository;
use crate::system::metrics;
use crate::wire::value::FieldValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of a repository's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not started
    Disconnected,
    /// Socket open, nothing sent yet
    Connecting,
    /// Hello sent, waiting for the cluster's answer
    Handshaking,
    /// Exchanging messages
    Active,
    /// Connection ended; entities have been deleted
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Active => "active",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Something observable that happened in a repository
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryEvent {
    /// Connection state changed
    StateChanged(ConnectionState),
    /// A field was applied to a known object
    FieldSet {
        /// Object
        object: ObjectId,
        /// Field
        field: FieldId,
        /// New value
        value: FieldValue,
        /// Local request or network update
        origin: Origin,
    },
    /// An object became known, with its initial state applied
    ObjectEntered {
        /// Object
        object: ObjectId,
        /// Class
        class: ClassId,
    },
    /// An object was deleted or left interest
    ObjectRemoved {
        /// Object
        object: ObjectId,
    },
    /// An object moved
    LocationChanged {
        /// Object
        object: ObjectId,
        /// New parent
        parent: ObjectId,
        /// New zone
        zone: ZoneId,
    },
    /// The cluster acknowledged an interest
    InterestDone {
        /// Interest handle
        interest: InterestId,
    },
    /// The cluster ejected this client
    Ejected {
        /// Eject code
        code: u16,
        /// Reason text
        reason: String,
    },
}

/// Work queued into the dispatch task
#[derive(Debug)]
pub enum Request {
    /// Apply a local field change, then send it
    SetField {
        /// Object
        object: ObjectId,
        /// Field
        field: FieldId,
        /// New value
        value: FieldValue,
        /// Explicit destination; the object's own channel when `None`
        recipient: Option<ChannelId>,
        /// Receives the local outcome
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    /// Read a field's current value
    GetField {
        /// Object
        object: ObjectId,
        /// Field
        field: FieldId,
        /// Receives the value, or the field's default when unset
        reply: oneshot::Sender<Result<Option<FieldValue>>>,
    },
    /// Client role command
    Client(ClientCommand),
    /// Internal role command
    Internal(InternalCommand),
    /// Stop the repository
    Close,
}

/// Protocol role plugged into the dispatch loop
pub(crate) trait Role: Send + 'static {
    /// Wire dialect
    type Frame: Frame;

    /// Name used in logs
    const NAME: &'static str;

    /// Handle one inbound message
    fn handle_frame(&mut self, core: &mut RepositoryCore<Self::Frame>, frame: Self::Frame) -> Result<()>;

    /// Handle a role-specific request
    fn handle_command(&mut self, core: &mut RepositoryCore<Self::Frame>, request: Request) -> Result<()>;

    /// Encode a field update
    fn field_frame(
        &self,
        object: ObjectId,
        field: FieldId,
        value: &FieldValue,
        recipient: Option<ChannelId>,
    ) -> Result<Self::Frame>;

    /// Called once when the loop ends; `requested` is true for a local close
    fn shutdown(&mut self, core: &mut RepositoryCore<Self::Frame>, requested: bool);
}

/// Publishes events and connection state. Outlives the core so `Closed` can
/// be reported after the connection is gone.
struct Reporter {
    events: broadcast::Sender<RepositoryEvent>,
    state: watch::Sender<ConnectionState>,
}

impl Reporter {
    fn publish(&self, event: RepositoryEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state");
            self.publish(RepositoryEvent::StateChanged(state));
        }
    }
}

/// State owned by the dispatch task
pub(crate) struct RepositoryCore<F: Frame> {
    pub(crate) schema: Arc<SchemaRepository>,
    pub(crate) registry: ClassRegistry,
    pub(crate) entities: HashMap<ObjectId, DistributedEntity>,
    pub(crate) sender: FrameSender<F>,
    reporter: Reporter,
    requests: mpsc::UnboundedSender<Request>,
}

impl<F: Frame> RepositoryCore<F> {
    /// Core plus the request queue and a handle onto it
    pub(crate) fn new(
        schema: Arc<SchemaRepository>,
        registry: ClassRegistry,
        sender: FrameSender<F>,
        event_capacity: usize,
    ) -> (Self, mpsc::UnboundedReceiver<Request>, RepositoryHandle) {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let (state, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (requests, requests_rx) = mpsc::unbounded_channel();

        let handle = RepositoryHandle {
            requests: requests.clone(),
            events: events.clone(),
            state: state_rx,
            schema: schema.clone(),
        };
        let core = Self {
            schema,
            registry,
            entities: HashMap::new(),
            sender,
            reporter: Reporter { events, state },
            requests,
        };
        (core, requests_rx, handle)
    }

    /// Queue a frame for sending
    pub(crate) fn send(&self, frame: &F) -> Result<()> {
        self.sender.send(frame)
    }

    /// Publish an event; having no subscribers is fine
    pub(crate) fn publish(&self, event: RepositoryEvent) {
        self.reporter.publish(event);
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.reporter.set_state(state);
    }

    /// Log and count a message type this role does not handle
    pub(crate) fn unknown(&self, msg_type: u16) {
        warn!(msg_type, "no handler for message type");
        metrics::record(|m| m.unknown_messages.inc());
    }

    /// Create an entity from its initial state, replacing any previous
    /// entity with the same id.
    ///
    /// Every field is checked before any implementation is created. Fields
    /// are then applied in order without propagation, and every
    /// implementation's `after_init` runs.
    pub(crate) fn enter_object(&mut self, entry: ObjectEntry, origin: Origin) -> Result<()> {
        let ObjectEntry {
            object,
            parent,
            zone,
            class,
            required,
            other,
        } = entry;
        self.schema.class(class)?;
        for (field, value) in required.iter().chain(&other) {
            self.schema.check_write(class, *field, value)?;
        }

        let context = ObjectContext {
            object_id: object,
            class_id: class,
            schema: self.schema.clone(),
            setter: FieldSetter::new(object, self.requests.clone()),
        };
        let implementations = self.registry.instantiate(&context);
        if implementations.is_empty() {
            debug!(%object, %class, "no implementation registered for class");
        }

        let mut entity = DistributedEntity::new(object, class).with_implementations(implementations);
        entity.set_location(parent, zone);
        for (field, value) in required.into_iter().chain(other) {
            trace!(%object, %field, %value, "initial field");
            entity.set_field(&self.schema, field, value, origin, &mut Discard)?;
        }
        entity.finish_init();

        match self.entities.insert(object, entity) {
            Some(mut old) => {
                old.delete();
                debug!(%object, "replaced existing object");
            }
            None => metrics::record(|m| m.live_objects.inc()),
        }
        info!(%object, %class, "object entered");
        self.publish(RepositoryEvent::ObjectEntered { object, class });
        Ok(())
    }

    /// Apply an update received from the cluster. Updates for unknown
    /// objects are ignored.
    pub(crate) fn apply_network(
        &mut self,
        object: ObjectId,
        field: FieldId,
        value: FieldValue,
        sender: Option<ChannelId>,
    ) -> Result<()> {
        let Some(entity) = self.entities.get_mut(&object) else {
            debug!(%object, %field, "update for unknown object");
            return Ok(());
        };
        let origin = Origin::Network { sender };
        entity.set_field(&self.schema, field, value.clone(), origin, &mut Discard)?;
        trace!(%object, %field, %value, "field set from network");
        self.publish(RepositoryEvent::FieldSet {
            object,
            field,
            value,
            origin,
        });
        Ok(())
    }

    /// Record a new location for a known object
    pub(crate) fn set_location(&mut self, object: ObjectId, parent: ObjectId, zone: ZoneId) {
        if let Some(entity) = self.entities.get_mut(&object) {
            entity.set_location(parent, zone);
            self.publish(RepositoryEvent::LocationChanged {
                object,
                parent,
                zone,
            });
        }
    }

    /// Delete and forget an object. Returns whether it was known.
    pub(crate) fn remove_object(&mut self, object: ObjectId) -> bool {
        match self.entities.remove(&object) {
            Some(mut entity) => {
                entity.delete();
                metrics::record(|m| m.live_objects.dec());
                info!(%object, "object removed");
                self.publish(RepositoryEvent::ObjectRemoved { object });
                true
            }
            None => false,
        }
    }

    fn get_field(&self, object: ObjectId, field: FieldId) -> Result<Option<FieldValue>> {
        let entity = self
            .entities
            .get(&object)
            .ok_or(Error::UnknownObject(object))?;
        self.schema.class_field(entity.class(), field)?;
        Ok(entity.get_field_or_default(&self.schema, field).cloned())
    }

    /// Delete every entity and drop the core, keeping only the reporter.
    /// The writer task can only drain once this core's sender is gone.
    fn into_reporter(mut self) -> Reporter {
        let count = self.entities.len();
        for (_, mut entity) in self.entities.drain() {
            entity.delete();
        }
        metrics::record(|m| m.live_objects.sub(count as i64));
        self.reporter
    }
}

/// Sends locally originated updates through the role's encoder
struct FrameSink<'a, R: Role> {
    role: &'a R,
    sender: &'a FrameSender<R::Frame>,
    recipient: Option<ChannelId>,
}

impl<R: Role> UpdateSink for FrameSink<'_, R> {
    fn propagate(&mut self, object: ObjectId, field: FieldId, value: &FieldValue) -> Result<()> {
        let frame = self.role.field_frame(object, field, value, self.recipient)?;
        self.sender.send(&frame)
    }
}

fn apply_local<R: Role>(
    role: &R,
    core: &mut RepositoryCore<R::Frame>,
    object: ObjectId,
    field: FieldId,
    value: FieldValue,
    recipient: Option<ChannelId>,
) -> Result<()> {
    let schema = &core.schema;
    let mut sink = FrameSink {
        role,
        sender: &core.sender,
        recipient,
    };
    let entity = core
        .entities
        .get_mut(&object)
        .ok_or(Error::UnknownObject(object))?;
    entity.set_field(schema, field, value.clone(), Origin::Local, &mut sink)?;

    core.publish(RepositoryEvent::FieldSet {
        object,
        field,
        value,
        origin: Origin::Local,
    });
    Ok(())
}

fn handle_request<R: Role>(
    role: &mut R,
    core: &mut RepositoryCore<R::Frame>,
    request: Request,
) -> Result<()> {
    match request {
        Request::SetField {
            object,
            field,
            value,
            recipient,
            reply,
        } => {
            let result = apply_local(role, core, object, field, value, recipient);
            match reply {
                Some(reply) => {
                    let _ = reply.send(result);
                    Ok(())
                }
                None => result,
            }
        }
        Request::GetField {
            object,
            field,
            reply,
        } => {
            let _ = reply.send(core.get_field(object, field));
            Ok(())
        }
        Request::Close => Ok(()),
        other => role.handle_command(core, other),
    }
}

fn record_message_error(error: &Error) {
    match error {
        Error::Decode(_) => metrics::record(|m| m.decode_errors.inc()),
        Error::Schema(_) => metrics::record(|m| m.schema_errors.inc()),
        _ => {}
    }
}

/// Dispatch loop. Runs until the connection ends, a fatal error occurs or a
/// close is requested, then deletes every entity and reports `Closed`.
pub(crate) async fn run<R: Role>(
    mut role: R,
    mut core: RepositoryCore<R::Frame>,
    mut connection: Connection<R::Frame>,
    mut requests: mpsc::UnboundedReceiver<Request>,
) {
    let requested = loop {
        tokio::select! {
            frame = connection.frames.recv() => match frame {
                Some(Ok(frame)) => {
                    let msg_type = frame.msg_type();
                    trace!(role = R::NAME, "recv {}", protocol::describe(msg_type, frame.payload()));
                    if let Err(e) = role.handle_frame(&mut core, frame) {
                        if e.is_connection_fatal() {
                            error!(role = R::NAME, msg_type, "connection ended: {}", e);
                            break false;
                        }
                        record_message_error(&e);
                        warn!(role = R::NAME, msg_type, "dropped message: {}", e);
                    }
                }
                Some(Err(e)) => {
                    error!(role = R::NAME, "connection failed: {}", e);
                    break false;
                }
                None => {
                    info!(role = R::NAME, "connection closed by cluster");
                    break false;
                }
            },
            request = requests.recv() => match request {
                Some(Request::Close) | None => break true,
                Some(request) => {
                    if let Err(e) = handle_request(&mut role, &mut core, request) {
                        if e.is_connection_fatal() {
                            error!(role = R::NAME, "connection ended: {}", e);
                            break false;
                        }
                        warn!(role = R::NAME, "request failed: {}", e);
                    }
                }
            },
        }
    };

    role.shutdown(&mut core, requested);
    let reporter = core.into_reporter();
    drop(role);
    connection.close().await;
    reporter.set_state(ConnectionState::Closed);
    info!(role = R::NAME, "repository closed");
}

/// Cloneable handle onto a running repository
#[derive(Clone)]
pub struct RepositoryHandle {
    requests: mpsc::UnboundedSender<Request>,
    events: broadcast::Sender<RepositoryEvent>,
    state: watch::Receiver<ConnectionState>,
    schema: Arc<SchemaRepository>,
}

impl RepositoryHandle {
    /// Schema the repository runs with
    pub fn schema(&self) -> &Arc<SchemaRepository> {
        &self.schema
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Events published from now on
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.events.subscribe(),
        }
    }

    pub(crate) fn request(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| Error::Network(NetworkError::Closed))
    }

    pub(crate) async fn call<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<Result<T>>) -> Request,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.request(request(tx))?;
        rx.await.map_err(|_| Error::Network(NetworkError::Closed))?
    }

    /// Change a field locally, then send it. Resolves once the change is
    /// applied locally; nothing waits for the cluster.
    pub async fn set_field(&self, object: ObjectId, field: FieldId, value: FieldValue) -> Result<()> {
        self.call(|reply| Request::SetField {
            object,
            field,
            value,
            recipient: None,
            reply: Some(reply),
        })
        .await
    }

    /// Current value of a field, or its default when unset
    pub async fn get_field(&self, object: ObjectId, field: FieldId) -> Result<Option<FieldValue>> {
        self.call(|reply| Request::GetField {
            object,
            field,
            reply,
        })
        .await
    }

    /// Wait until the state is `target`, up to `deadline`
    pub async fn wait_for_state(&self, target: ConnectionState, deadline: Duration) -> Result<()> {
        let mut state = self.state.clone();
        let reached = tokio::time::timeout(deadline, state.wait_for(|s| *s == target))
            .await
            .map_err(|_| Error::timeout(format!("state {}", target)))?;
        reached
            .map(|_| ())
            .map_err(|_| Error::Network(NetworkError::Closed))
    }

    /// Ask the repository to stop and wait until it has
    pub async fn close(&self) {
        let _ = self.requests.send(Request::Close);
        self.closed().await;
    }

    /// Wait until the repository has stopped
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
    }
}

impl fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("state", &self.state())
            .finish()
    }
}

/// Subscription to a repository's events
pub struct EventStream {
    rx: broadcast::Receiver<RepositoryEvent>,
}

impl EventStream {
    /// Next event. Skips past events lost to lag.
    pub async fn next(&mut self) -> Option<RepositoryEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Wait for the first event `select` maps to a value, up to `deadline`.
    ///
    /// Fails with a timeout when the deadline passes and with `Closed` when
    /// the repository closes first.
    pub async fn await_event<T, S>(&mut self, deadline: Duration, mut select: S) -> Result<T>
    where
        S: FnMut(&RepositoryEvent) -> Option<T>,
    {
        let wait = async {
            while let Some(event) = self.next().await {
                if let Some(found) = select(&event) {
                    return Ok(found);
                }
                if event == RepositoryEvent::StateChanged(ConnectionState::Closed) {
                    break;
                }
            }
            Err(Error::Network(NetworkError::Closed))
        };
        tokio::time::timeout(deadline, wait)
            .await
            .map_err(|_| Error::timeout("repository event"))?
    }

    /// Wait for `field` of `object` to be set, up to `deadline`
    pub async fn await_field_set(
        &mut self,
        object: ObjectId,
        field: FieldId,
        deadline: Duration,
    ) -> Result<FieldValue> {
        self.await_event(deadline, |event| match event {
            RepositoryEvent::FieldSet {
                object: o,
                field: f,
                value,
                ..
            } if *o == object && *f == field => Some(value.clone()),
            _ => None,
        })
        .await
        .map_err(|e| {
            if e.is_timeout() {
                Error::timeout(format!("field {} of object {}", field, object))
            } else {
                e
            }
        })
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}

/// Forward the common handle operations from a role-specific repository type
macro_rules! delegate_handle {
    ($ty:ty) => {
        impl $ty {
            /// Underlying handle
            pub fn handle(&self) -> &$crate::repository::RepositoryHandle {
                &self.handle
            }

            /// Schema the repository runs with
            pub fn schema(&self) -> &std::sync::Arc<$crate::schema::SchemaRepository> {
                self.handle.schema()
            }

            /// Current connection state
            pub fn state(&self) -> $crate::repository::ConnectionState {
                self.handle.state()
            }

            /// Events published from now on
            pub fn subscribe(&self) -> $crate::repository::EventStream {
                self.handle.subscribe()
            }

            /// Change a field locally, then send it
            pub async fn set_field(
                &self,
                object: $crate::core::types::ObjectId,
                field: $crate::core::types::FieldId,
                value: $crate::wire::value::FieldValue,
            ) -> $crate::core::error::Result<()> {
                self.handle.set_field(object, field, value).await
            }

            /// Current value of a field, or its default when unset
            pub async fn get_field(
                &self,
                object: $crate::core::types::ObjectId,
                field: $crate::core::types::FieldId,
            ) -> $crate::core::error::Result<Option<$crate::wire::value::FieldValue>> {
                self.handle.get_field(object, field).await
            }

            /// Wait until the state is `target`, up to `deadline`
            pub async fn wait_for_state(
                &self,
                target: $crate::repository::ConnectionState,
                deadline: std::time::Duration,
            ) -> $crate::core::error::Result<()> {
                self.handle.wait_for_state(target, deadline).await
            }

            /// Ask the repository to stop and wait until it has
            pub async fn close(&self) {
                self.handle.close().await
            }

            /// Wait until the repository has stopped
            pub async fn closed(&self) {
                self.handle.closed().await
            }
        }
    };
}

pub(crate) use delegate_handle;
