//! Scripted cluster peer for repository tests

#![allow(dead_code)]

use astron_replica::comms::frame::Frame;
use astron_replica::comms::network::read_frame;
use astron_replica::core::config::Config;
use astron_replica::schema::{FieldModifiers, SchemaBuilder, SchemaRepository};
use astron_replica::wire::FieldType;
use astron_replica::{ClassId, FieldId};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(2);

pub const AVATAR: ClassId = ClassId::new(0);
pub const UBER: ClassId = ClassId::new(1);

/// Two-class schema:
///
/// - `Avatar`: `x`, `y` (required broadcast), `name` (required broadcast),
///   `secret` (required ownrecv), `pos` (molecular x y), `emote` (ownsend)
/// - `Uber`: `motd` (broadcast)
pub fn schema() -> Arc<SchemaRepository> {
    let shared = FieldModifiers::new().required().broadcast().ram();
    let schema = SchemaBuilder::new()
        .class("Avatar", &[], |c| {
            c.field("x", FieldType::Int32, shared)
                .field("y", FieldType::Int32, shared)
                .field("name", FieldType::String, shared)
                .field("secret", FieldType::UInt32, FieldModifiers::new().required().ownrecv())
                .molecular("pos", &["x", "y"])
                .field("emote", FieldType::UInt8, FieldModifiers::new().ownsend());
        })
        .class("Uber", &[], |c| {
            c.field("motd", FieldType::String, FieldModifiers::new().broadcast());
        })
        .build()
        .unwrap();
    Arc::new(schema)
}

/// Field id of `name` in `class`
pub fn field(schema: &SchemaRepository, class: ClassId, name: &str) -> FieldId {
    schema.field_by_name(class, name).unwrap().id
}

/// Configuration with a heartbeat slow enough to stay out of the way
pub fn config() -> Config {
    let mut config = Config::default();
    config.client.heartbeat_interval = Duration::from_secs(60);
    config.client.version = "test-client".to_string();
    config
}

/// The cluster side of a duplex connection
pub struct Peer<F> {
    stream: DuplexStream,
    _frame: PhantomData<F>,
}

impl<F: Frame> Peer<F> {
    /// Repository end and peer end of a fresh in-memory connection
    pub fn pair() -> (DuplexStream, Self) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        (
            ours,
            Self {
                stream: theirs,
                _frame: PhantomData,
            },
        )
    }

    /// Next frame from the repository
    pub async fn recv(&mut self) -> F {
        let body = tokio::time::timeout(WAIT, read_frame(&mut self.stream))
            .await
            .expect("timed out waiting for a frame")
            .expect("read failed")
            .expect("stream ended");
        F::decode_body(body).expect("undecodable frame")
    }

    /// Next frame, or `None` when nothing arrives within `wait`
    pub async fn try_recv(&mut self, wait: Duration) -> Option<F> {
        match tokio::time::timeout(wait, read_frame(&mut self.stream)).await {
            Ok(Ok(Some(body))) => Some(F::decode_body(body).expect("undecodable frame")),
            _ => None,
        }
    }

    /// Send a frame to the repository
    pub async fn send(&mut self, frame: &F) {
        let bytes = frame.to_frame().unwrap();
        self.stream.write_all(&bytes).await.unwrap();
    }

    /// Send raw bytes
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }
}
