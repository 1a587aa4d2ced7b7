//! Core resource contract and shared wire types.
//!
//! A domain type joins a resource tree by implementing [`Resource`]. Optional
//! behaviour (soft delete, partial update) is exposed through capability
//! accessors that return `None` by default; handlers check them at the single
//! point where the behaviour is needed.
//!
//! # Examples
//!
//! ```
//! use canopy_axum_http::{Resource, Verb, ApiError};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, Default, Serialize, Deserialize)]
//! struct Note {
//!     #[serde(default)]
//!     id: String,
//!     text: String,
//! }
//!
//! impl Resource for Note {
//!     fn id(&self) -> &str {
//!         &self.id
//!     }
//!
//!     fn set_id(&mut self, id: String) {
//!         self.id = id;
//!     }
//!
//!     fn bind(&mut self, _verb: Verb) -> Result<(), ApiError> {
//!         if self.text.is_empty() {
//!             return Err(ApiError::invalid("text is required"));
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use crate::error::ApiError;
use axum::http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;

/// Query parameters of an incoming request, as passed to [`Resource::matches`].
pub type Query = BTreeMap<String, String>;

/// The capability set a domain type needs to participate in a resource tree.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Identity of this item. An empty string means "not set".
    fn id(&self) -> &str;

    /// Replace the identity.
    fn set_id(&mut self, id: String);

    /// Identity of the parent item this one is scoped under, if recorded.
    fn parent_id(&self) -> Option<&str> {
        None
    }

    /// Record the parent identity. Child resources override this so that
    /// storage can scope searches by parent.
    fn set_parent_id(&mut self, _parent_id: String) {}

    /// Verb-specific validation, run after the body is decoded and before any write.
    fn bind(&mut self, _verb: Verb) -> Result<(), ApiError> {
        Ok(())
    }

    /// Finishing step run before the item is written into a successful response.
    fn render(&mut self) -> Result<(), ApiError> {
        Ok(())
    }

    /// Domain filter applied by list requests.
    fn matches(&self, _query: &Query) -> bool {
        true
    }

    /// Soft-delete capability.
    fn as_end_dated(&self) -> Option<&dyn EndDated> {
        None
    }

    /// Mutable soft-delete capability.
    fn as_end_dated_mut(&mut self) -> Option<&mut dyn EndDated> {
        None
    }

    /// Partial-update capability. PATCH answers 405 when this is `None`.
    fn as_patchable_mut(&mut self) -> Option<&mut dyn Patchable> {
        None
    }
}

/// Items that are logically deleted by setting an end date.
pub trait EndDated {
    /// When the item was end-dated, if it was.
    fn end_date(&self) -> Option<OffsetDateTime>;

    /// Set or clear the end date.
    fn set_end_date(&mut self, at: Option<OffsetDateTime>);

    /// Whether the item is end-dated.
    fn is_ended(&self) -> bool {
        self.end_date().is_some()
    }
}

/// Items that accept partial updates.
pub trait Patchable {
    /// Merge a JSON patch into this item.
    fn apply_patch(&mut self, patch: serde_json::Value) -> Result<(), ApiError>;
}

/// The operations a resource node serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    /// `GET` on the collection
    List,
    /// `GET` on an item
    Get,
    /// `POST` on the collection
    Create,
    /// `PUT` on an item
    Put,
    /// `PATCH` on an item
    Patch,
    /// `DELETE` on an item
    Delete,
}

impl Verb {
    /// Every verb, collection verbs first.
    pub const ALL: [Verb; 6] = [
        Verb::List,
        Verb::Create,
        Verb::Get,
        Verb::Put,
        Verb::Patch,
        Verb::Delete,
    ];

    /// HTTP method for this verb.
    pub fn method(self) -> Method {
        match self {
            Verb::List | Verb::Get => Method::GET,
            Verb::Create => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Patch => Method::PATCH,
            Verb::Delete => Method::DELETE,
        }
    }

    /// Whether the verb addresses a single item by identity.
    pub fn is_item(self) -> bool {
        !matches!(self, Verb::List | Verb::Create)
    }

    /// Parse a CLI verb name.
    pub fn parse(value: &str) -> Option<Verb> {
        match value.to_ascii_lowercase().as_str() {
            "list" => Some(Verb::List),
            "get" => Some(Verb::Get),
            "post" | "create" => Some(Verb::Create),
            "put" => Some(Verb::Put),
            "patch" => Some(Verb::Patch),
            "delete" => Some(Verb::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verb::List => "list",
            Verb::Get => "get",
            Verb::Create => "post",
            Verb::Put => "put",
            Verb::Patch => "patch",
            Verb::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Status codes a node answers with on success, per verb.
///
/// A `put` or `delete` code of `204 No Content` suppresses the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseCodes {
    /// `200` by default.
    pub list: StatusCode,
    /// `200` by default.
    pub get: StatusCode,
    /// `201` by default.
    pub create: StatusCode,
    /// `200` by default.
    pub put: StatusCode,
    /// `200` by default.
    pub patch: StatusCode,
    /// `204` by default.
    pub delete: StatusCode,
}

impl ResponseCodes {
    /// Code for a verb.
    pub fn for_verb(&self, verb: Verb) -> StatusCode {
        match verb {
            Verb::List => self.list,
            Verb::Get => self.get,
            Verb::Create => self.create,
            Verb::Put => self.put,
            Verb::Patch => self.patch,
            Verb::Delete => self.delete,
        }
    }

    /// Override the code for a verb.
    #[must_use]
    pub fn with(mut self, verb: Verb, code: StatusCode) -> Self {
        match verb {
            Verb::List => self.list = code,
            Verb::Get => self.get = code,
            Verb::Create => self.create = code,
            Verb::Put => self.put = code,
            Verb::Patch => self.patch = code,
            Verb::Delete => self.delete = code,
        }
        self
    }
}

impl Default for ResponseCodes {
    fn default() -> Self {
        Self {
            list: StatusCode::OK,
            get: StatusCode::OK,
            create: StatusCode::CREATED,
            put: StatusCode::OK,
            patch: StatusCode::OK,
            delete: StatusCode::NO_CONTENT,
        }
    }
}

/// JSON body for status-only and error responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBody {
    /// Human readable outcome, e.g. `Resource not found.`
    pub status: String,
    /// Detail for the caller, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusBody {
    /// Body with only a status line.
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            error: None,
        }
    }

    /// Attach a detail message.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Generate a fresh resource identity.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
