//! Internal repository against a scripted message director

mod common;

use astron_replica::comms::frame::InternalMessage;
use astron_replica::comms::messages::{
    ClientAgentState, ControlChannel, DeleteRam, EntryKind, ObjectEntry, SetField,
};
use astron_replica::comms::protocol::msg;
use astron_replica::core::error::{Error, SchemaError};
use astron_replica::object::{CallbackObject, ClassRegistry};
use astron_replica::repository::{ConnectionState, InternalRepository, RepositoryEvent};
use astron_replica::schema::Audience;
use astron_replica::{ChannelId, FieldValue, ObjectId, ZoneId};
use common::{config, field, schema, Peer, AVATAR, UBER, WAIT};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type DirectorPeer = Peer<InternalMessage>;

const CONTROL: ChannelId = ChannelId::new(4000);
const STATE_SERVER: ChannelId = ChannelId::new(402000);
const AVATAR_ID: ObjectId = ObjectId::new(1000);

/// Launch an AI repository and consume its control-channel subscription
async fn launched(registry: ClassRegistry) -> (InternalRepository, DirectorPeer) {
    let (stream, mut peer) = DirectorPeer::pair();
    let ai = InternalRepository::launch(stream, &config(), schema(), registry).unwrap();

    let subscribe = peer.recv().await;
    assert_eq!(subscribe.msg_type, msg::CONTROL_ADD_CHANNEL);
    assert_eq!(
        ControlChannel::decode(&subscribe.payload).unwrap().channel,
        CONTROL
    );
    (ai, peer)
}

fn avatar_values() -> Vec<FieldValue> {
    vec![
        FieldValue::Int32(10),
        FieldValue::Int32(20),
        FieldValue::from("npc"),
        FieldValue::UInt32(7),
    ]
}

async fn create_avatar(ai: &InternalRepository, peer: &mut DirectorPeer) {
    ai.create_object(
        AVATAR_ID,
        ObjectId::new(1),
        ZoneId::new(2),
        AVATAR,
        avatar_values(),
        Vec::new(),
    )
    .await
    .unwrap();
    assert_eq!(
        peer.recv().await.msg_type,
        msg::STATESERVER_CREATE_OBJECT_WITH_REQUIRED
    );
}

#[tokio::test]
async fn test_launch_subscribes_control_channel_and_ubers() {
    let (stream, mut peer) = DirectorPeer::pair();
    let mut registry = ClassRegistry::new();
    registry.register_uber(ObjectId::new(4665), UBER);
    let ai = InternalRepository::launch(stream, &config(), schema(), registry).unwrap();
    assert_eq!(ai.state(), ConnectionState::Active);

    for expected in [CONTROL, ChannelId::new(4665)] {
        let frame = peer.recv().await;
        assert!(frame.is_control());
        assert_eq!(frame.recipients, vec![ChannelId::CONTROL]);
        assert_eq!(frame.sender, ChannelId::ZERO);
        assert_eq!(frame.msg_type, msg::CONTROL_ADD_CHANNEL);
        assert_eq!(ControlChannel::decode(&frame.payload).unwrap().channel, expected);
    }

    let motd = field(ai.schema(), UBER, "motd");
    assert!(ai.get_field(ObjectId::new(4665), motd).await.is_ok());
}

#[tokio::test]
async fn test_create_object_sends_to_state_server() {
    let (ai, mut peer) = launched(ClassRegistry::new()).await;
    let schema = ai.schema().clone();

    ai.create_object(
        AVATAR_ID,
        ObjectId::new(1),
        ZoneId::new(2),
        AVATAR,
        avatar_values(),
        Vec::new(),
    )
    .await
    .unwrap();

    let frame = peer.recv().await;
    assert_eq!(frame.msg_type, msg::STATESERVER_CREATE_OBJECT_WITH_REQUIRED);
    assert_eq!(frame.recipients, vec![STATE_SERVER]);
    assert_eq!(frame.sender, CONTROL);

    let entry = ObjectEntry::decode(EntryKind::Create, &frame.payload, &schema).unwrap();
    assert_eq!(entry.object, AVATAR_ID);
    assert_eq!(entry.parent, ObjectId::new(1));
    assert_eq!(entry.zone, ZoneId::new(2));
    let values: Vec<_> = entry.required.into_iter().map(|(_, v)| v).collect();
    assert_eq!(values, avatar_values());

    // The object also exists locally, without having been echoed back
    let secret = field(&schema, AVATAR, "secret");
    assert_eq!(
        ai.get_field(AVATAR_ID, secret).await.unwrap(),
        Some(FieldValue::UInt32(7))
    );
}

#[tokio::test]
async fn test_create_object_with_other_fields() {
    let (ai, mut peer) = launched(ClassRegistry::new()).await;
    let schema = ai.schema().clone();
    let emote = field(&schema, AVATAR, "emote");

    ai.create_object(
        AVATAR_ID,
        ObjectId::new(1),
        ZoneId::new(2),
        AVATAR,
        avatar_values(),
        vec![(emote, FieldValue::UInt8(3))],
    )
    .await
    .unwrap();

    let frame = peer.recv().await;
    assert_eq!(
        frame.msg_type,
        msg::STATESERVER_CREATE_OBJECT_WITH_REQUIRED_OTHER
    );
    let entry = ObjectEntry::decode(EntryKind::CreateOther, &frame.payload, &schema).unwrap();
    assert_eq!(entry.other, vec![(emote, FieldValue::UInt8(3))]);
}

#[tokio::test]
async fn test_create_object_checks_required_count() {
    let (ai, mut peer) = launched(ClassRegistry::new()).await;

    let result = ai
        .create_object(
            AVATAR_ID,
            ObjectId::new(1),
            ZoneId::new(2),
            AVATAR,
            vec![FieldValue::Int32(10)],
            Vec::new(),
        )
        .await;
    assert!(matches!(
        result,
        Err(Error::Schema(SchemaError::RequiredCountMismatch {
            expected: 4,
            actual: 1,
            ..
        }))
    ));
    assert!(peer.try_recv(Duration::from_millis(100)).await.is_none());

    let x = field(ai.schema(), AVATAR, "x");
    assert!(matches!(
        ai.get_field(AVATAR_ID, x).await,
        Err(Error::UnknownObject(_))
    ));
}

#[tokio::test]
async fn test_set_field_addressed_by_channel() {
    let (ai, mut peer) = launched(ClassRegistry::new()).await;
    create_avatar(&ai, &mut peer).await;
    let x = field(ai.schema(), AVATAR, "x");

    ai.set_field(AVATAR_ID, x, FieldValue::Int32(11)).await.unwrap();
    let frame = peer.recv().await;
    assert_eq!(frame.msg_type, msg::STATESERVER_OBJECT_SET_FIELD);
    assert_eq!(frame.recipients, vec![AVATAR_ID.channel()]);
    assert_eq!(frame.sender, CONTROL);
    let update = SetField::decode(&frame.payload, ai.schema()).unwrap();
    assert_eq!(update.value, FieldValue::Int32(11));

    let client = ChannelId::new(0x0001_0000_0000_0042);
    ai.set_field_to(client, AVATAR_ID, x, FieldValue::Int32(12))
        .await
        .unwrap();
    let frame = peer.recv().await;
    assert_eq!(frame.recipients, vec![client]);
    assert_eq!(
        ai.get_field(AVATAR_ID, x).await.unwrap(),
        Some(FieldValue::Int32(12))
    );
}

#[tokio::test]
async fn test_entered_object_reports_update_sender() {
    let senders: Arc<Mutex<Vec<Option<ChannelId>>>> = Arc::new(Mutex::new(Vec::new()));
    let schema = schema();
    let x = field(&schema, AVATAR, "x");

    let mut registry = ClassRegistry::new();
    let log = senders.clone();
    registry.register(AVATAR, move |_| {
        let log = log.clone();
        Box::new(CallbackObject::new().on_field(x, move |_, sender| log.lock().unwrap().push(sender)))
    });
    let (ai, mut peer) = launched(registry).await;
    let mut events = ai.subscribe();

    let entry = ObjectEntry::with_required(
        &schema,
        Audience::Internal,
        AVATAR_ID,
        ObjectId::new(1),
        ZoneId::new(2),
        AVATAR,
        avatar_values(),
    )
    .unwrap();
    peer.send(&InternalMessage::to(
        CONTROL,
        STATE_SERVER,
        msg::STATESERVER_OBJECT_ENTER_AI_WITH_REQUIRED,
        entry.encode(EntryKind::AiRequired),
    ))
    .await;

    let update = SetField {
        object: AVATAR_ID,
        field: x,
        value: FieldValue::Int32(-1),
    };
    peer.send(&InternalMessage::to(
        AVATAR_ID.channel(),
        ChannelId::new(77),
        msg::STATESERVER_OBJECT_SET_FIELD,
        update.encode(),
    ))
    .await;
    events.await_field_set(AVATAR_ID, x, WAIT).await.unwrap();

    assert_eq!(
        *senders.lock().unwrap(),
        vec![Some(STATE_SERVER), Some(ChannelId::new(77))]
    );
    // network updates are never sent back
    assert!(peer.try_recv(Duration::from_millis(100)).await.is_none());
}

#[tokio::test]
async fn test_delete_ram_removes_object() {
    let (ai, mut peer) = launched(ClassRegistry::new()).await;
    create_avatar(&ai, &mut peer).await;
    let mut events = ai.subscribe();

    peer.send(&InternalMessage::to(
        AVATAR_ID.channel(),
        STATE_SERVER,
        msg::STATESERVER_OBJECT_DELETE_RAM,
        DeleteRam { object: AVATAR_ID }.encode(),
    ))
    .await;
    let removed = events
        .await_event(WAIT, |e| match e {
            RepositoryEvent::ObjectRemoved { object } => Some(*object),
            _ => None,
        })
        .await
        .unwrap();
    assert_eq!(removed, AVATAR_ID);
}

#[tokio::test]
async fn test_delete_object_notifies_state_server() {
    let (ai, mut peer) = launched(ClassRegistry::new()).await;
    create_avatar(&ai, &mut peer).await;

    ai.delete_object(AVATAR_ID).unwrap();
    let frame = peer.recv().await;
    assert_eq!(frame.msg_type, msg::STATESERVER_OBJECT_DELETE_RAM);
    assert_eq!(frame.recipients, vec![AVATAR_ID.channel()]);
    assert_eq!(DeleteRam::decode(&frame.payload).unwrap().object, AVATAR_ID);

    let x = field(ai.schema(), AVATAR, "x");
    assert!(ai.get_field(AVATAR_ID, x).await.is_err());
}

#[tokio::test]
async fn test_client_state_and_channel_control() {
    let (ai, mut peer) = launched(ClassRegistry::new()).await;
    let client = ChannelId::new(0x0001_0000_0000_0042);

    ai.set_client_state(client, ClientAgentState::Established)
        .unwrap();
    let frame = peer.recv().await;
    assert_eq!(frame.msg_type, msg::CLIENTAGENT_SET_STATE);
    assert_eq!(frame.recipients, vec![client]);
    assert_eq!(frame.sender, CONTROL);
    assert_eq!(&frame.payload[..], &[2, 0]);

    ai.add_channel(ChannelId::new(555)).unwrap();
    ai.remove_channel(ChannelId::new(555)).unwrap();
    for expected in [msg::CONTROL_ADD_CHANNEL, msg::CONTROL_REMOVE_CHANNEL] {
        let frame = peer.recv().await;
        assert!(frame.is_control());
        assert_eq!(frame.msg_type, expected);
        assert_eq!(
            ControlChannel::decode(&frame.payload).unwrap().channel,
            ChannelId::new(555)
        );
    }
}

#[tokio::test]
async fn test_close_deletes_objects() {
    let deleted = Arc::new(Mutex::new(0));
    let mut registry = ClassRegistry::new();
    let count = deleted.clone();
    registry.register(AVATAR, move |_| {
        let count = count.clone();
        Box::new(CallbackObject::new().on_delete(move || *count.lock().unwrap() += 1))
    });
    let (ai, mut peer) = launched(registry).await;
    create_avatar(&ai, &mut peer).await;

    tokio::time::timeout(WAIT, ai.close()).await.unwrap();
    assert_eq!(ai.state(), ConnectionState::Closed);
    assert_eq!(*deleted.lock().unwrap(), 1);
}
