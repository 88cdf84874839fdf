//! Astron Replica - distributed object replication over the Astron protocol
//!
//! Keeps local replicas of distributed objects in step with an Astron-style
//! cluster, either as a game client talking to a client agent or as an AI
//! process talking to a message director. The schema describes classes and
//! fields; the wire layer encodes their values; repositories own the
//! connection, the live objects and the dispatch of every update.
#![warn(missing_docs)]

// Core foundational modules
pub mod core;
pub mod wire;
pub mod schema;

// Protocol and replication
pub mod comms;
pub mod object;
pub mod repository;
pub mod system;

// Re-export commonly used items for convenience
pub use crate::core::{ChannelId, ClassId, Config, Error, FieldId, InterestId, ObjectId, Result, ZoneId};
pub use object::{CallbackObject, ClassRegistry, DistributedObject, ObjectContext};
pub use repository::{ClientRepository, ConnectionState, InternalRepository, RepositoryEvent};
pub use schema::{SchemaBuilder, SchemaRepository};
pub use wire::{FieldType, FieldValue};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Install logging from `config` and register metrics
pub fn init(config: &Config) -> Result<()> {
    crate::core::logging::init_logging(&config.logging)?;
    tracing::info!("Initializing {} v{}", NAME, VERSION);

    if system::metrics::Metrics::global().is_none() {
        tracing::warn!("metrics unavailable");
    }
    Ok(())
}
