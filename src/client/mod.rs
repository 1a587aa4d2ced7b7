//! Client mirrors of a resource tree.
//!
//! Every resource node of a [`ResourceTree`](crate::server::ResourceTree) can be
//! addressed from the outside through a [`Client`] that reproduces the node's
//! path shape. A [`ClientTree`] builds those mirrors for a whole tree at once
//! and resolves them by node name; it is what the CLI dispatches through.
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── fetch        - Client<T>, one mirrored node and its verbs
//! ├── tree         - ClientTree, name -> mirror map for a whole tree
//! ├── parser       - incremental text/event-stream parser
//! ├── subscription - EventStream over an open SSE response
//! ├── config       - ClientConfig
//! └── utils        - address and URL helpers
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Typed mirror of one resource node |
//! | [`ClientTree`] | Untyped mirrors of every node, keyed by name |
//! | [`EventParser`] | Incremental SSE frame parser |
//! | [`EventStream`] | Stream of events from one SSE endpoint |
//! | [`ClientConfig`] | Timeouts, pooling, proxy and logging |
//!
//! # Examples
//!
//! ```ignore
//! use canopy_axum_http::client::ClientTree;
//!
//! let clients = tree.client_tree("http://127.0.0.1:8080")?;
//! let albums = clients.get("Albums")?;
//! let listed = albums.list(&[&artist_id]).await?;
//! ```
//!
//! ```
//! use canopy_axum_http::client::is_retryable_status;
//!
//! assert!(is_retryable_status(503));
//! assert!(!is_retryable_status(404));
//! ```

mod config;
mod fetch;
mod parser;
mod subscription;
mod tree;
mod utils;

pub use config::ClientConfig;
pub use fetch::{Client, RawResponse, RequestEditor};
pub use parser::{EventParser, ParseState, DEFAULT_EVENT};
pub use subscription::EventStream;
pub use tree::ClientTree;
pub use utils::*;
