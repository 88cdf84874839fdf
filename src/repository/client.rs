//! Client repository
//!
//! Speaks the client dialect to a client agent: hello handshake, heartbeat,
//! objects entering and leaving interest, and field updates in both
//! directions.

use crate::comms::frame::ClientMessage;
use crate::comms::messages::{
    AddInterest, Eject, EntryKind, Hello, InterestDone, ObjectEntry, ObjectLeaving, ObjectLocation,
    RemoveInterest, SetField, SetFields,
};
use crate::comms::network::{self, FrameSender};
use crate::comms::payload::PayloadWriter;
use crate::comms::protocol::msg;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::{ChannelId, FieldId, InterestId, ObjectId, ZoneId};
use crate::object::{ClassRegistry, Origin};
use crate::repository::core::{
    delegate_handle, run, ConnectionState, RepositoryCore, RepositoryEvent, RepositoryHandle,
    Request, Role,
};
use crate::schema::SchemaRepository;
use crate::system::metrics;
use crate::wire::value::FieldValue;
use bytes::Bytes;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Client-only requests
#[derive(Debug)]
pub enum ClientCommand {
    /// Open an interest
    AddInterest(AddInterest),
    /// Close an interest
    RemoveInterest(RemoveInterest),
    /// Move an object
    SetLocation(ObjectLocation),
    /// List acknowledged interests
    ActiveInterests(oneshot::Sender<Result<Vec<InterestId>>>),
}

struct ClientRole {
    heartbeat: Option<JoinHandle<()>>,
    interests: BTreeSet<InterestId>,
}

impl ClientRole {
    fn enter(&mut self, core: &mut RepositoryCore<ClientMessage>, kind: EntryKind, payload: &[u8]) -> Result<()> {
        let entry = ObjectEntry::decode(kind, payload, &core.schema)?;
        core.enter_object(entry, Origin::Network { sender: None })
    }
}

impl Role for ClientRole {
    type Frame = ClientMessage;

    const NAME: &'static str = "client";

    fn handle_frame(&mut self, core: &mut RepositoryCore<ClientMessage>, frame: ClientMessage) -> Result<()> {
        let payload = &frame.payload[..];
        match frame.msg_type {
            msg::CLIENT_HELLO_RESP => {
                info!("handshake accepted");
                core.set_state(ConnectionState::Active);
            }
            msg::CLIENT_EJECT => {
                let Eject { code, reason } = Eject::decode(payload)?;
                error!(code, %reason, "ejected by cluster");
                core.publish(RepositoryEvent::Ejected {
                    code,
                    reason: reason.clone(),
                });
                return Err(Error::Ejected { code, reason });
            }
            msg::CLIENT_OBJECT_SET_FIELD => {
                let update = SetField::decode(payload, &core.schema)?;
                core.apply_network(update.object, update.field, update.value, None)?;
            }
            msg::CLIENT_OBJECT_SET_FIELDS => {
                let update = SetFields::decode(payload, &core.schema)?;
                for (field, value) in update.fields {
                    core.apply_network(update.object, field, value, None)?;
                }
            }
            msg::CLIENT_OBJECT_LEAVING => {
                let leaving = ObjectLeaving::decode(payload)?;
                if !core.remove_object(leaving.object) {
                    debug!(object = %leaving.object, "unknown object left");
                }
            }
            msg::CLIENT_OBJECT_LOCATION => {
                let location = ObjectLocation::decode(payload)?;
                core.set_location(location.object, location.parent, location.zone);
            }
            msg::CLIENT_ENTER_OBJECT_REQUIRED
            | msg::CLIENT_ENTER_OBJECT_REQUIRED_OTHER
            | msg::CLIENT_ENTER_OBJECT_REQUIRED_OWNER
            | msg::CLIENT_ENTER_OBJECT_REQUIRED_OTHER_OWNER => {
                if let Some(kind) = EntryKind::from_msg_type(frame.msg_type) {
                    self.enter(core, kind, payload)?;
                }
            }
            msg::CLIENT_DONE_INTEREST_RESP => {
                let done = InterestDone::decode(payload)?;
                debug!(interest = %done.interest, "interest acknowledged");
                self.interests.insert(done.interest);
                core.publish(RepositoryEvent::InterestDone {
                    interest: done.interest,
                });
            }
            other => core.unknown(other),
        }
        Ok(())
    }

    fn handle_command(&mut self, core: &mut RepositoryCore<ClientMessage>, request: Request) -> Result<()> {
        let command = match request {
            Request::Client(command) => command,
            other => {
                return Err(Error::internal(format!(
                    "client repository cannot handle {:?}",
                    other
                )))
            }
        };
        match command {
            ClientCommand::AddInterest(interest) => {
                core.send(&ClientMessage::new(msg::CLIENT_ADD_INTEREST, interest.encode()))
            }
            ClientCommand::RemoveInterest(interest) => {
                self.interests.remove(&interest.interest);
                core.send(&ClientMessage::new(msg::CLIENT_REMOVE_INTEREST, interest.encode()))
            }
            ClientCommand::SetLocation(location) => {
                core.set_location(location.object, location.parent, location.zone);
                core.send(&ClientMessage::new(msg::CLIENT_OBJECT_LOCATION, location.encode()))
            }
            ClientCommand::ActiveInterests(reply) => {
                let _ = reply.send(Ok(self.interests.iter().copied().collect()));
                Ok(())
            }
        }
    }

    fn field_frame(
        &self,
        object: ObjectId,
        field: FieldId,
        value: &FieldValue,
        _recipient: Option<ChannelId>,
    ) -> Result<ClientMessage> {
        let payload = PayloadWriter::with_capacity(6 + value.encoded_len())
            .put_object_id(object)
            .put_field_id(field)
            .put_value(value)
            .finish();
        Ok(ClientMessage::new(msg::CLIENT_OBJECT_SET_FIELD, payload))
    }

    fn shutdown(&mut self, core: &mut RepositoryCore<ClientMessage>, requested: bool) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        if requested {
            let _ = core.send(&ClientMessage::new(msg::CLIENT_DISCONNECT, Bytes::new()));
        }
    }
}

/// Periodic heartbeat. Failures are counted and retried on the next tick.
fn spawn_heartbeat(sender: FrameSender<ClientMessage>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        let heartbeat = ClientMessage::new(msg::CLIENT_HEARTBEAT, Bytes::new());
        loop {
            ticker.tick().await;
            if let Err(e) = sender.send(&heartbeat) {
                debug!("heartbeat not sent: {}", e);
                metrics::record(|m| m.heartbeat_failures.inc());
            }
        }
    })
}

/// Handle onto a running client repository
#[derive(Clone, Debug)]
pub struct ClientRepository {
    handle: RepositoryHandle,
}

delegate_handle!(ClientRepository);

impl ClientRepository {
    /// Connect to the configured client agent and launch
    pub async fn connect(
        config: &Config,
        schema: Arc<SchemaRepository>,
        registry: ClassRegistry,
    ) -> Result<Self> {
        let stream = network::connect(&config.network.server_address, &config.network).await?;
        Self::launch(stream, config, schema, registry)
    }

    /// Launch over an already open stream.
    ///
    /// Sends the hello, instantiates uber objects, starts the heartbeat and
    /// the dispatch task. The repository is `Handshaking` until the cluster
    /// answers the hello.
    pub fn launch<S>(
        stream: S,
        config: &Config,
        schema: Arc<SchemaRepository>,
        registry: ClassRegistry,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let connection = network::spawn::<S, ClientMessage>(stream, config.network.frame_queue_capacity);
        let (mut core, requests, handle) = RepositoryCore::new(
            schema,
            registry,
            connection.sender.clone(),
            config.network.event_capacity,
        );
        core.set_state(ConnectionState::Connecting);

        let hello = Hello {
            dc_hash: config.client.dc_hash.unwrap_or_else(|| core.schema.hash()),
            version: config.client.version.clone(),
        };
        info!(dc_hash = hello.dc_hash, version = %hello.version, "sending hello");
        core.send(&ClientMessage::new(msg::CLIENT_HELLO, hello.encode()))?;
        core.set_state(ConnectionState::Handshaking);

        let ubers = core.registry.ubers().to_vec();
        for uber in ubers {
            core.enter_object(
                ObjectEntry {
                    object: uber.object_id,
                    parent: ObjectId::new(0),
                    zone: ZoneId::new(0),
                    class: uber.class_id,
                    required: Vec::new(),
                    other: Vec::new(),
                },
                Origin::Local,
            )?;
        }

        let heartbeat = spawn_heartbeat(connection.sender.clone(), config.client.heartbeat_interval);
        let role = ClientRole {
            heartbeat: Some(heartbeat),
            interests: BTreeSet::new(),
        };
        tokio::spawn(run(role, core, connection, requests));
        Ok(Self { handle })
    }

    /// Ask for objects under `parent` in `zone`. The cluster answers with
    /// the objects followed by an [`RepositoryEvent::InterestDone`].
    pub fn add_interest(&self, interest: InterestId, parent: ObjectId, zone: ZoneId) -> Result<()> {
        self.handle.request(Request::Client(ClientCommand::AddInterest(AddInterest {
            context: 0,
            interest,
            parent,
            zone,
        })))
    }

    /// Close an interest
    pub fn remove_interest(&self, interest: InterestId) -> Result<()> {
        self.handle
            .request(Request::Client(ClientCommand::RemoveInterest(RemoveInterest {
                context: 0,
                interest,
            })))
    }

    /// Move an object owned by this client
    pub fn set_location(&self, object: ObjectId, parent: ObjectId, zone: ZoneId) -> Result<()> {
        self.handle
            .request(Request::Client(ClientCommand::SetLocation(ObjectLocation {
                object,
                parent,
                zone,
            })))
    }

    /// Interests the cluster has acknowledged and that are still open
    pub async fn active_interests(&self) -> Result<Vec<InterestId>> {
        self.handle
            .call(|reply| Request::Client(ClientCommand::ActiveInterests(reply)))
            .await
    }
}
