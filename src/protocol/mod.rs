//! Wire-level contract shared by server and client.
//!
//! - [`paths`]: path templates and concrete request paths for tree nodes
//! - [`sse`]: Server-Sent-Event framing

pub mod paths;
pub mod sse;

pub use paths::{
    collection_template, concrete_segments, id_param, is_valid_segment, item_template,
    required_ids, PathLevel,
};
pub use sse::ServerSentEvent;
