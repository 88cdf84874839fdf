//! Repositories
//!
//! A repository owns one connection, the table of live objects seen through
//! it and the dispatch task that applies every change. The client and
//! internal variants differ only in dialect and message handling.

pub mod client;
mod core;
pub mod internal;

pub use self::core::{ConnectionState, EventStream, RepositoryEvent, RepositoryHandle, Request};
pub use client::{ClientCommand, ClientRepository};
pub use internal::{InternalCommand, InternalRepository};
