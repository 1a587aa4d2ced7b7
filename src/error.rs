//! Error types for resource trees, storage, clients and the HTTP surface.
//!
//! Three layers of errors exist, one per audience:
//!
//! | Type | Audience | Example |
//! |------|----------|---------|
//! | [`CanopyError`] | in-process callers (tree assembly, client, CLI) | wrong ancestor-ID count |
//! | [`StorageError`] | storage port implementations | item not found |
//! | [`ApiError`] | HTTP callers (converted to a status + JSON body) | 404 Not Found |
//!
//! Tree configuration problems are collected into a single
//! [`CanopyError::Config`] batch when the tree is rendered.

use crate::types::StatusBody;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CanopyError>;

/// Crate-level error.
#[derive(Debug, Error)]
pub enum CanopyError {
    /// One or more structural problems found while rendering a tree.
    #[error("invalid resource tree: {}", ConfigErrors(.0))]
    Config(Vec<ConfigError>),

    /// The tree was already rendered into a router or client tree.
    #[error("resource tree topology is frozen after rendering")]
    AlreadyRendered,

    /// Node handle does not belong to this tree.
    #[error("unknown node id {0}")]
    UnknownNode(usize),

    /// Wrong number of ancestor identifiers passed to a client mirror.
    #[error("expected {expected} ancestor id(s), got {got}")]
    ArgumentCount {
        /// Ids the node's ancestor chain needs.
        expected: usize,
        /// Ids supplied.
        got: usize,
    },

    /// CLI or test harness asked for a client that the tree does not have.
    #[error("unknown target {name:?}: valid options are: [{}]", .options.join(", "))]
    UnknownTarget {
        /// Name asked for.
        name: String,
        /// Every valid name, sorted.
        options: Vec<String>,
    },

    /// The server answered with a status the client did not expect.
    #[error("unexpected status {status} (expected {expected}): {body}")]
    UnexpectedStatus {
        /// Success code configured for the verb.
        expected: u16,
        /// Code received.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// Transport level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A body could not be encoded or decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Address or path could not be turned into a URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Malformed command-line or harness input.
    #[error("usage error: {0}")]
    Usage(String),

    /// Listener or server I/O failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Storage port failure surfaced to an in-process caller.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CanopyError {
    /// Whether a caller-side retry could plausibly succeed.
    ///
    /// The crate itself never retries; this only classifies.
    pub fn is_retryable(&self) -> bool {
        match self {
            CanopyError::Http(_) => true,
            CanopyError::UnexpectedStatus { status, .. } => {
                crate::client::is_retryable_status(*status)
            }
            _ => false,
        }
    }

    /// Whether this error is a local programming or usage error.
    pub fn is_contract_error(&self) -> bool {
        matches!(
            self,
            CanopyError::ArgumentCount { .. }
                | CanopyError::UnknownTarget { .. }
                | CanopyError::Usage(_)
                | CanopyError::Config(_)
                | CanopyError::AlreadyRendered
                | CanopyError::UnknownNode(_)
        )
    }

    /// HTTP status carried by an [`CanopyError::UnexpectedStatus`].
    pub fn status(&self) -> Option<u16> {
        match self {
            CanopyError::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CanopyError {
    fn from(err: reqwest::Error) -> Self {
        CanopyError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for CanopyError {
    fn from(err: serde_json::Error) -> Self {
        CanopyError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for CanopyError {
    fn from(err: url::ParseError) -> Self {
        CanopyError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for CanopyError {
    fn from(err: std::io::Error) -> Self {
        CanopyError::Io(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for CanopyError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        CanopyError::Decode(err.to_string())
    }
}

/// A single structural problem in a resource tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Two siblings share a name.
    #[error("node {parent:?} has more than one child named {name:?}")]
    DuplicateChild {
        /// Parent node.
        parent: String,
        /// The repeated name.
        name: String,
    },

    /// Item middleware or item routes on a grouping node.
    #[error("grouping node {node:?} cannot carry item-scoped {what}")]
    ItemScopedOnGroup {
        /// Offending node.
        node: String,
        /// What was attached.
        what: &'static str,
    },

    /// Root routes or root middleware below the root.
    #[error("{what} on node {node:?} is only valid at the tree root")]
    RootOnly {
        /// Offending node.
        node: String,
        /// What was attached.
        what: &'static str,
    },

    /// Empty segment, or one with characters outside the unreserved set.
    #[error("node {node:?} has invalid path segment {segment:?}")]
    InvalidSegment {
        /// Offending node.
        node: String,
        /// The segment as given.
        segment: String,
    },

    /// Custom route pattern that is malformed or repeated.
    #[error("node {node:?} has invalid custom route pattern {pattern:?}")]
    InvalidPattern {
        /// Offending node.
        node: String,
        /// The pattern as given.
        pattern: String,
    },

    /// Custom route on a method axum cannot dispatch.
    #[error("node {node:?} uses unroutable method {method}")]
    UnsupportedMethod {
        /// Offending node.
        node: String,
        /// The method as given.
        method: String,
    },

    /// Two nodes anywhere in the tree share a client-tree name.
    #[error("more than one node is named {name:?}")]
    AmbiguousClientName {
        /// The repeated name.
        name: String,
    },

    /// A route that the router would refuse to mount next to an earlier one.
    #[error("route {method} {path} of node {node:?} collides with a route already mounted")]
    ConflictingRoute {
        /// Node owning the later route.
        node: String,
        /// Method of the later route.
        method: String,
        /// Path of the later route.
        path: String,
    },
}

struct ConfigErrors<'a>(&'a [ConfigError]);

impl fmt::Display for ConfigErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Errors returned by a [`Storage`](crate::storage::Storage) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No item with the requested id.
    #[error("resource not found")]
    NotFound,

    /// The backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// An item could not be encoded for, or decoded from, the backend.
    #[error("storage serialization error: {0}")]
    Serialization(String),
}

/// HTTP-facing error taxonomy.
///
/// Every variant maps to exactly one status code and a [`StatusBody`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// 404
    #[error("resource not found")]
    NotFound,

    /// 400
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// 405
    #[error("method not allowed")]
    MethodNotAllowed,

    /// 403
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// 500; the message is logged, never sent to the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Create an invalid-request error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a forbidden error.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wrap a storage failure with the operation it happened in.
    pub fn from_storage(op: &str, err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::NotFound,
            other => Self::Internal(format!("error {op}: {other}")),
        }
    }

    /// Status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Body sent to the caller.
    pub fn body(&self) -> StatusBody {
        match self {
            Self::NotFound => StatusBody::new("Resource not found."),
            Self::InvalidRequest(msg) => StatusBody::new("Invalid request.").with_error(msg),
            Self::MethodNotAllowed => StatusBody::new("Method not allowed."),
            Self::Forbidden(msg) => StatusBody::new("Forbidden").with_error(msg),
            Self::Internal(_) => StatusBody::new("Internal server error."),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(cause) => tracing::error!(error = %cause, "internal error"),
            other => tracing::debug!(error = %other, "request rejected"),
        }
        (self.status_code(), Json(self.body())).into_response()
    }
}
