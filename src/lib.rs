#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! ## Module Structure
//!
//! - **[types]** - Resource contract, optional capabilities, verbs and response codes
//! - **[error]** - Error types and result handling
//! - **[storage]** - Storage port and the default in-memory store
//! - **[protocol]** - Path templates and SSE framing shared by server and client
//! - **[server]** - Resource nodes, tree composition, broadcast hubs and serving (Axum)
//! - **[client]** - Client mirrors and the name-keyed client tree
//! - **[cli]** - Command-line dispatch over a client tree
//! - **[music]** - Example Artist → Album → Song tree

pub mod cli;
pub mod client;
pub mod error;
pub mod music;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod types;

pub use client::{Client, ClientConfig, ClientTree};
pub use error::{ApiError, CanopyError, ConfigError, Result, StorageError};
pub use protocol::ServerSentEvent;
pub use server::{Api, BroadcastHub, Group, NodeId, ResourceTree, ServerConfig};
pub use storage::{Filter, MemoryStorage, Storage};
pub use types::{EndDated, Patchable, Resource, ResponseCodes, StatusBody, Verb};
