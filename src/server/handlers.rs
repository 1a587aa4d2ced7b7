//! Default CRUD handlers.
//!
//! These enforce the identity and mutation policy every resource node shares:
//!
//! | Verb | Rule |
//! |------|------|
//! | create | body must not carry an id; one is generated and the path parent is recorded |
//! | put | body id must equal the path id |
//! | patch | 405 without the [`Patchable`](crate::Patchable) capability; the id cannot change |
//! | get / put / patch / delete | 404 if the item belongs to another parent |
//! | list | end-dated items only with `?end_dated=true` |

use crate::error::ApiError;
use crate::storage::{Filter, Storage};
use crate::types::{new_id, Query, Resource, ResponseCodes, StatusBody, Verb};
use axum::extract::rejection::PathRejection;
use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Query parameter that opts a list request into end-dated items.
pub const END_DATED_PARAM: &str = "end_dated";

/// Identifier path parameters of the matched route, keyed `id0`, `id1`, ...
///
/// Unlike `Path<HashMap<..>>` this extracts an empty map on routes without
/// parameters instead of rejecting.
#[derive(Debug, Clone, Default)]
pub struct PathIds(pub HashMap<String, String>);

impl PathIds {
    /// Value of parameter `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for PathIds {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<HashMap<String, String>>::from_request_parts(parts, state).await {
            Ok(Path(params)) => Ok(PathIds(params)),
            Err(PathRejection::MissingPathParams(_)) => Ok(PathIds::default()),
            Err(err) => Err(ApiError::invalid(err.body_text())),
        }
    }
}

pub(crate) type BeforeWrite<T> = Arc<dyn Fn(&mut T, Verb) -> Result<(), ApiError> + Send + Sync>;
pub(crate) type AfterWrite<T> = Arc<dyn Fn(&T, Verb) -> Result<(), ApiError> + Send + Sync>;
pub(crate) type AfterDelete = Arc<dyn Fn(&str) -> Result<(), ApiError> + Send + Sync>;

pub(crate) struct Hooks<T> {
    pub before_write: Option<BeforeWrite<T>>,
    pub after_write: Option<AfterWrite<T>>,
    pub after_delete: Option<AfterDelete>,
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            before_write: None,
            after_write: None,
            after_delete: None,
        }
    }
}

impl<T> Clone for Hooks<T> {
    fn clone(&self) -> Self {
        Self {
            before_write: self.before_write.clone(),
            after_write: self.after_write.clone(),
            after_delete: self.after_delete.clone(),
        }
    }
}

/// Everything a handler needs to know about the node it serves.
pub(crate) struct NodeShared<T: Resource> {
    pub name: String,
    pub storage: Arc<dyn Storage<T>>,
    pub codes: ResponseCodes,
    pub hooks: Hooks<T>,
    /// Path parameter holding this node's item id.
    pub id_param: String,
    /// Path parameter of the nearest identity-bearing ancestor.
    pub parent_param: Option<String>,
}

impl<T: Resource> NodeShared<T> {
    pub fn own_id<'a>(&self, ids: &'a PathIds) -> Result<&'a str, ApiError> {
        ids.get(&self.id_param)
            .ok_or_else(|| ApiError::internal(format!("route is missing {}", self.id_param)))
    }

    pub fn parent_id<'a>(&self, ids: &'a PathIds) -> Option<&'a str> {
        self.parent_param.as_deref().and_then(|param| ids.get(param))
    }

    /// File `item` under the parent named in the path. Returns `false` when the
    /// type does not keep the parent, which hides the item from scoped lists.
    fn adopt(&self, ids: &PathIds, item: &mut T) -> bool {
        let Some(parent) = self.parent_id(ids) else {
            return true;
        };
        item.set_parent_id(parent.to_string());
        if item.parent_id() == Some(parent) {
            return true;
        }
        tracing::warn!(
            node = %self.name,
            parent,
            "resource did not record its parent; override Resource::set_parent_id and parent_id"
        );
        false
    }

    fn check_parent(&self, ids: &PathIds, item: &T) -> Result<(), ApiError> {
        match (self.parent_id(ids), item.parent_id()) {
            (Some(expected), Some(actual)) if expected != actual => Err(ApiError::NotFound),
            _ => Ok(()),
        }
    }

    /// Fetch the addressed item, scoped to the parent in the path.
    pub async fn load(&self, ids: &PathIds) -> Result<T, ApiError> {
        let id = self.own_id(ids)?;
        let item = self
            .storage
            .get(id)
            .await
            .map_err(|e| ApiError::from_storage("getting resource", e))?;
        self.check_parent(ids, &item)?;
        Ok(item)
    }

    async fn persist(&self, mut item: T, verb: Verb) -> Result<T, ApiError> {
        item.bind(verb)?;
        if let Some(hook) = &self.hooks.before_write {
            hook(&mut item, verb)?;
        }
        self.storage
            .set(item.clone())
            .await
            .map_err(|e| ApiError::from_storage("storing resource", e))?;
        if let Some(hook) = &self.hooks.after_write {
            if let Err(err) = hook(&item, verb) {
                tracing::warn!(
                    node = %self.name,
                    id = item.id(),
                    %verb,
                    error = %err,
                    "after-write hook failed; change was persisted"
                );
                return Err(err);
            }
        }
        Ok(item)
    }
}

fn decode<B: DeserializeOwned>(body: &[u8]) -> Result<B, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::invalid(format!("invalid body: {e}")))
}

fn respond<B: Serialize>(code: StatusCode, body: &B) -> Response {
    if code == StatusCode::NO_CONTENT {
        code.into_response()
    } else {
        (code, Json(body)).into_response()
    }
}

fn rendered<T: Resource>(mut item: T) -> Result<T, ApiError> {
    item.render()?;
    Ok(item)
}

pub(crate) async fn list<T: Resource>(
    node: Arc<NodeShared<T>>,
    ids: PathIds,
    mut query: Query,
) -> Result<Response, ApiError> {
    let include_ended = query.remove(END_DATED_PARAM).is_some_and(|v| v == "true");
    let filter = Filter::new(move |item: &T| item.matches(&query)).including_ended(include_ended);

    let items = node
        .storage
        .search(node.parent_id(&ids), &filter)
        .await
        .map_err(|e| ApiError::from_storage("searching resources", e))?;
    let items = items
        .into_iter()
        .map(rendered)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(respond(node.codes.list, &items))
}

pub(crate) async fn create<T: Resource>(
    node: Arc<NodeShared<T>>,
    ids: PathIds,
    body: Bytes,
) -> Result<Response, ApiError> {
    let mut item: T = decode(&body)?;
    if !item.id().is_empty() {
        return Err(ApiError::invalid("id must not be supplied on create"));
    }
    item.set_id(new_id());
    node.adopt(&ids, &mut item);

    let item = node.persist(item, Verb::Create).await?;
    tracing::debug!(node = %node.name, id = item.id(), "created resource");
    Ok(respond(node.codes.create, &rendered(item)?))
}

pub(crate) async fn get<T: Resource>(
    node: Arc<NodeShared<T>>,
    ids: PathIds,
) -> Result<Response, ApiError> {
    let item = node.load(&ids).await?;
    Ok(respond(node.codes.get, &rendered(item)?))
}

pub(crate) async fn put<T: Resource>(
    node: Arc<NodeShared<T>>,
    ids: PathIds,
    body: Bytes,
) -> Result<Response, ApiError> {
    let id = node.own_id(&ids)?;
    let mut item: T = decode(&body)?;
    if item.id() != id {
        return Err(ApiError::invalid("id in body must match the path"));
    }

    match node.storage.get(id).await {
        Ok(existing) => node.check_parent(&ids, &existing)?,
        Err(crate::error::StorageError::NotFound) => {}
        Err(e) => return Err(ApiError::from_storage("getting resource", e)),
    }
    node.adopt(&ids, &mut item);

    let item = node.persist(item, Verb::Put).await?;
    Ok(respond(node.codes.put, &rendered(item)?))
}

pub(crate) async fn patch<T: Resource>(
    node: Arc<NodeShared<T>>,
    ids: PathIds,
    body: Bytes,
) -> Result<Response, ApiError> {
    let id = node.own_id(&ids)?.to_string();
    let mut item = node.load(&ids).await?;
    let parent_before = item.parent_id().map(str::to_string);
    let Some(patchable) = item.as_patchable_mut() else {
        return Err(ApiError::MethodNotAllowed);
    };

    let patch: serde_json::Value = decode(&body)?;
    if let Some(patched_id) = patch.get("id") {
        if patched_id.as_str() != Some(id.as_str()) {
            return Err(ApiError::invalid("id cannot be changed"));
        }
    }
    patchable.apply_patch(patch)?;

    if item.id() != id {
        return Err(ApiError::invalid("id cannot be changed"));
    }
    if item.parent_id() != parent_before.as_deref() {
        return Err(ApiError::invalid("parent cannot be changed"));
    }

    let item = node.persist(item, Verb::Patch).await?;
    Ok(respond(node.codes.patch, &rendered(item)?))
}

pub(crate) async fn delete<T: Resource>(
    node: Arc<NodeShared<T>>,
    ids: PathIds,
) -> Result<Response, ApiError> {
    let id = node.own_id(&ids)?;
    node.load(&ids).await?;
    node.storage
        .delete(id)
        .await
        .map_err(|e| ApiError::from_storage("deleting resource", e))?;

    if let Some(hook) = &node.hooks.after_delete {
        if let Err(err) = hook(id) {
            tracing::warn!(node = %node.name, id, error = %err, "after-delete hook failed");
            return Err(err);
        }
    }
    tracing::debug!(node = %node.name, id, "deleted resource");
    Ok(respond(node.codes.delete, &StatusBody::new("Deleted.")))
}
