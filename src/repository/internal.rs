//! Internal (cluster) repository
//!
//! Speaks the internal dialect to a message director as an AI process:
//! subscribes to its control channel, creates and deletes objects on the
//! state server, and exchanges field updates addressed by channel.

use crate::comms::frame::InternalMessage;
use crate::comms::messages::{
    ClientAgentState, ControlChannel, DeleteRam, EntryKind, FieldEntry, ObjectEntry, SetField,
    SetFields,
};
use crate::comms::network;
use crate::comms::payload::PayloadWriter;
use crate::comms::protocol::msg;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::types::{ChannelId, ClassId, FieldId, ObjectId, ZoneId};
use crate::object::{ClassRegistry, Origin};
use crate::repository::core::{
    delegate_handle, run, ConnectionState, RepositoryCore, RepositoryHandle, Request, Role,
};
use crate::schema::{Audience, SchemaRepository};
use crate::wire::value::FieldValue;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Internal-only requests
#[derive(Debug)]
pub enum InternalCommand {
    /// Create an object locally and on the state server
    CreateObject {
        /// Initial state, already checked against the schema
        entry: ObjectEntry,
        /// Receives the local outcome
        reply: oneshot::Sender<Result<()>>,
    },
    /// Delete an object locally and on the state server
    DeleteObject {
        /// Object to delete
        object: ObjectId,
    },
    /// Set a client's session state on its client agent
    SetClientState {
        /// Client channel
        client: ChannelId,
        /// New state
        state: ClientAgentState,
    },
    /// Subscribe to a channel
    AddChannel(ChannelId),
    /// Unsubscribe from a channel
    RemoveChannel(ChannelId),
}

struct InternalRole {
    control_channel: ChannelId,
    state_server: ChannelId,
}

impl InternalRole {
    fn to(&self, recipient: ChannelId, msg_type: u16, payload: bytes::Bytes) -> InternalMessage {
        InternalMessage::to(recipient, self.control_channel, msg_type, payload)
    }

    fn subscribe(&self, core: &RepositoryCore<InternalMessage>, channel: ChannelId) -> Result<()> {
        debug!(%channel, "subscribing");
        core.send(&InternalMessage::control(
            msg::CONTROL_ADD_CHANNEL,
            ControlChannel { channel }.encode(),
        ))
    }
}

impl Role for InternalRole {
    type Frame = InternalMessage;

    const NAME: &'static str = "internal";

    fn handle_frame(&mut self, core: &mut RepositoryCore<InternalMessage>, frame: InternalMessage) -> Result<()> {
        let payload = &frame.payload[..];
        let sender = Some(frame.sender);
        match frame.msg_type {
            msg::STATESERVER_OBJECT_SET_FIELD => {
                let update = SetField::decode(payload, &core.schema)?;
                core.apply_network(update.object, update.field, update.value, sender)?;
            }
            msg::STATESERVER_OBJECT_SET_FIELDS => {
                let update = SetFields::decode(payload, &core.schema)?;
                for (field, value) in update.fields {
                    core.apply_network(update.object, field, value, sender)?;
                }
            }
            msg::STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED
            | msg::STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED_OTHER => {
                if let Some(kind) = EntryKind::from_msg_type(frame.msg_type) {
                    let entry = ObjectEntry::decode(kind, payload, &core.schema)?;
                    core.enter_object(entry, Origin::Network { sender })?;
                }
            }
            msg::STATESERVER_OBJECT_DELETE_RAM => {
                let delete = DeleteRam::decode(payload)?;
                if !core.remove_object(delete.object) {
                    debug!(object = %delete.object, "delete for unknown object");
                }
            }
            other => core.unknown(other),
        }
        Ok(())
    }

    fn handle_command(&mut self, core: &mut RepositoryCore<InternalMessage>, request: Request) -> Result<()> {
        let command = match request {
            Request::Internal(command) => command,
            other => {
                return Err(Error::internal(format!(
                    "internal repository cannot handle {:?}",
                    other
                )))
            }
        };
        match command {
            InternalCommand::CreateObject { entry, reply } => {
                let kind = if entry.other.is_empty() {
                    EntryKind::Create
                } else {
                    EntryKind::CreateOther
                };
                let frame = self.to(self.state_server, kind.msg_type(), entry.encode(kind));
                let result = core
                    .enter_object(entry, Origin::Local)
                    .and_then(|_| core.send(&frame));
                let _ = reply.send(result);
                Ok(())
            }
            InternalCommand::DeleteObject { object } => {
                core.remove_object(object);
                core.send(&self.to(
                    object.channel(),
                    msg::STATESERVER_OBJECT_DELETE_RAM,
                    DeleteRam { object }.encode(),
                ))
            }
            InternalCommand::SetClientState { client, state } => {
                core.send(&self.to(client, msg::CLIENTAGENT_SET_STATE, state.encode()))
            }
            InternalCommand::AddChannel(channel) => self.subscribe(core, channel),
            InternalCommand::RemoveChannel(channel) => {
                debug!(%channel, "unsubscribing");
                core.send(&InternalMessage::control(
                    msg::CONTROL_REMOVE_CHANNEL,
                    ControlChannel { channel }.encode(),
                ))
            }
        }
    }

    fn field_frame(
        &self,
        object: ObjectId,
        field: FieldId,
        value: &FieldValue,
        recipient: Option<ChannelId>,
    ) -> Result<InternalMessage> {
        let payload = PayloadWriter::with_capacity(6 + value.encoded_len())
            .put_object_id(object)
            .put_field_id(field)
            .put_value(value)
            .finish();
        Ok(self.to(
            recipient.unwrap_or(object.channel()),
            msg::STATESERVER_OBJECT_SET_FIELD,
            payload,
        ))
    }

    fn shutdown(&mut self, _core: &mut RepositoryCore<InternalMessage>, _requested: bool) {}
}

/// Handle onto a running internal repository
#[derive(Clone, Debug)]
pub struct InternalRepository {
    handle: RepositoryHandle,
}

delegate_handle!(InternalRepository);

impl InternalRepository {
    /// Connect to the configured message director and launch
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
    /// Subscribes to the control channel, then subscribes to and
    /// instantiates each uber object. The repository is `Active` on return.
    pub fn launch<S>(
        stream: S,
        config: &Config,
        schema: Arc<SchemaRepository>,
        registry: ClassRegistry,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let connection = network::spawn::<S, InternalMessage>(stream, config.network.frame_queue_capacity);
        let (mut core, requests, handle) = RepositoryCore::new(
            schema,
            registry,
            connection.sender.clone(),
            config.network.event_capacity,
        );
        core.set_state(ConnectionState::Connecting);

        let role = InternalRole {
            control_channel: config.internal.control_channel,
            state_server: config.internal.state_server,
        };
        info!(control_channel = %role.control_channel, "registering with message director");
        role.subscribe(&core, role.control_channel)?;

        let ubers = core.registry.ubers().to_vec();
        for uber in ubers {
            role.subscribe(&core, uber.object_id.channel())?;
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
        core.set_state(ConnectionState::Active);

        tokio::spawn(run(role, core, connection, requests));
        Ok(Self { handle })
    }

    /// Create an object on the state server and locally.
    ///
    /// `required` must hold exactly the class's required fields in schema
    /// order; `other` may hold any further fields of the class.
    pub async fn create_object(
        &self,
        object: ObjectId,
        parent: ObjectId,
        zone: ZoneId,
        class: ClassId,
        required: Vec<FieldValue>,
        other: Vec<FieldEntry>,
    ) -> Result<()> {
        let schema = self.handle.schema();
        let entry = ObjectEntry::with_required(schema, Audience::Internal, object, parent, zone, class, required)?
            .with_other(schema, other)?;
        self.handle
            .call(|reply| Request::Internal(InternalCommand::CreateObject { entry, reply }))
            .await
    }

    /// Delete an object locally and on the state server
    pub fn delete_object(&self, object: ObjectId) -> Result<()> {
        self.handle
            .request(Request::Internal(InternalCommand::DeleteObject { object }))
    }

    /// Change a field locally and send it to `recipient` instead of the
    /// object's channel, e.g. straight to one client
    pub async fn set_field_to(
        &self,
        recipient: ChannelId,
        object: ObjectId,
        field: FieldId,
        value: FieldValue,
    ) -> Result<()> {
        self.handle
            .call(|reply| Request::SetField {
                object,
                field,
                value,
                recipient: Some(recipient),
                reply: Some(reply),
            })
            .await
    }

    /// Set a client's session state
    pub fn set_client_state(&self, client: ChannelId, state: ClientAgentState) -> Result<()> {
        self.handle
            .request(Request::Internal(InternalCommand::SetClientState { client, state }))
    }

    /// Subscribe to `channel`
    pub fn add_channel(&self, channel: ChannelId) -> Result<()> {
        self.handle
            .request(Request::Internal(InternalCommand::AddChannel(channel)))
    }

    /// Unsubscribe from `channel`
    pub fn remove_channel(&self, channel: ChannelId) -> Result<()> {
        self.handle
            .request(Request::Internal(InternalCommand::RemoveChannel(channel)))
    }
}
