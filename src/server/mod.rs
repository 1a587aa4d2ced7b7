//! Server side: resource nodes, tree composition, event streams and serving.
//!
//! # Module Organization
//!
//! ```text
//! server/
//! ├── api        - Api<T>, the CRUD resource node builder
//! ├── group      - Group, a pure grouping node
//! ├── tree       - ResourceTree, route rendering and route tables
//! ├── node       - Node trait and route mounting helpers
//! ├── handlers   - default CRUD handlers
//! ├── middleware - Middleware type, item loader, bearer-token guard
//! ├── broadcast  - BroadcastHub fan-out
//! ├── sse        - text/event-stream responses
//! └── config     - ServerConfig and the serve loop
//! ```
//!
//! # Examples
//!
//! ```ignore
//! use canopy_axum_http::server::{serve, shutdown_signal, Api, ResourceTree, ServerConfig};
//!
//! let mut tree = ResourceTree::new(Api::<Artist>::new("Artists", "artists"));
//! tree.add_child(tree.root(), Api::<Album>::new("Albums", "albums"))?;
//! serve(&tree, ServerConfig::default(), shutdown_signal()).await?;
//! ```

mod api;
mod broadcast;
mod config;
mod group;
mod handlers;
mod middleware;
mod node;
mod sse;
mod tree;

pub use api::Api;
pub use broadcast::{BroadcastHub, HubControl, HubState, PublishReport, Subscription, DEFAULT_CAPACITY};
pub use config::{serve, serve_listener, shutdown_signal, ServerConfig};
pub use group::Group;
pub use handlers::{PathIds, END_DATED_PARAM};
pub use middleware::{middleware_fn, require_bearer_token, Middleware};
pub use node::{Mounted, Node, RouteEntry, RouteScope};
pub use sse::EventStreamResponse;
pub use tree::{NodeId, ResourceTree, RouteTable};
