//! Resource node builder.
//!
//! An [`Api<T>`] serves the CRUD surface of one domain type at one position in
//! a [`ResourceTree`](super::ResourceTree):
//!
//! | Method | Path | Verb |
//! |--------|------|------|
//! | `GET` | collection | list |
//! | `POST` | collection | create |
//! | `GET` | item | get |
//! | `PUT` | item | put |
//! | `PATCH` | item | patch |
//! | `DELETE` | item | delete |
//!
//! # Examples
//!
//! ```ignore
//! use canopy_axum_http::server::{Api, ResourceTree};
//!
//! let mut tree = ResourceTree::new(Api::<Artist>::new("Artists", "artists"));
//! let albums = tree.add_child(tree.root(), Api::<Album>::new("Albums", "albums"))?;
//! tree.add_child(albums, Api::<Song>::new("Songs", "songs"))?;
//! let app = tree.router()?;
//! ```

use super::broadcast::{BroadcastHub, HubControl};
use super::handlers::{self, AfterDelete, AfterWrite, BeforeWrite, Hooks, NodeShared, PathIds};
use super::middleware::{item_loader, middleware_fn, Middleware};
use super::node::{describe, mount_custom, CustomRoute, Extras, Mounted, Node, RouteEntry, RouteScope};
use super::sse::EventStreamResponse;
use crate::error::{ApiError, ConfigError};
use crate::protocol::{collection_template, id_param, item_template, required_ids, PathLevel};
use crate::protocol::ServerSentEvent;
use crate::storage::{MemoryStorage, Storage};
use crate::types::{Resource, ResponseCodes, Verb};
use axum::extract::{Query, Request};
use axum::handler::Handler;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::{self, MethodRouter};
use bytes::Bytes;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

/// A CRUD resource node for domain type `T`.
pub struct Api<T: Resource> {
    name: String,
    segment: String,
    storage: Arc<dyn Storage<T>>,
    codes: ResponseCodes,
    overrides: HashMap<Verb, MethodRouter>,
    hooks: Hooks<T>,
    extras: Extras,
}

impl<T: Resource> Api<T> {
    /// New node named `name`, mounted at `segment` below its parent, backed by
    /// a fresh [`MemoryStorage`].
    pub fn new(name: impl Into<String>, segment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            segment: segment.into(),
            storage: Arc::new(MemoryStorage::<T>::new()),
            codes: ResponseCodes::default(),
            overrides: HashMap::new(),
            hooks: Hooks::default(),
            extras: Extras::default(),
        }
    }

    /// Replace the storage port.
    pub fn with_storage(mut self, storage: impl Storage<T> + 'static) -> Self {
        self.storage = Arc::new(storage);
        self
    }

    /// Replace the storage port with an already shared one.
    pub fn with_shared_storage(mut self, storage: Arc<dyn Storage<T>>) -> Self {
        self.storage = storage;
        self
    }

    /// Override the success code of individual verbs.
    pub fn with_response_codes(mut self, codes: ResponseCodes) -> Self {
        self.codes = codes;
        self
    }

    /// Replace the default handler of one verb.
    ///
    /// The handler is mounted on the verb's method and path. Node and item
    /// middleware still wrap it.
    pub fn with_handler<H, X>(mut self, verb: Verb, handler: H) -> Self
    where
        H: Handler<X, ()>,
        X: 'static,
    {
        let route = match verb {
            Verb::List | Verb::Get => routing::get(handler),
            Verb::Create => routing::post(handler),
            Verb::Put => routing::put(handler),
            Verb::Patch => routing::patch(handler),
            Verb::Delete => routing::delete(handler),
        };
        self.overrides.insert(verb, route);
        self
    }

    /// Run `hook` after `bind` and before a create, put or patch is written.
    pub fn before_create_or_update(
        mut self,
        hook: impl Fn(&mut T, Verb) -> Result<(), ApiError> + Send + Sync + 'static,
    ) -> Self {
        let hook: BeforeWrite<T> = Arc::new(hook);
        self.hooks.before_write = Some(hook);
        self
    }

    /// Run `hook` after a create, put or patch was written.
    ///
    /// A failing hook fails the request, but the write is kept.
    pub fn after_create_or_update(
        mut self,
        hook: impl Fn(&T, Verb) -> Result<(), ApiError> + Send + Sync + 'static,
    ) -> Self {
        let hook: AfterWrite<T> = Arc::new(hook);
        self.hooks.after_write = Some(hook);
        self
    }

    /// Run `hook` with the item id after a delete.
    pub fn after_delete(
        mut self,
        hook: impl Fn(&str) -> Result<(), ApiError> + Send + Sync + 'static,
    ) -> Self {
        let hook: AfterDelete = Arc::new(hook);
        self.hooks.after_delete = Some(hook);
        self
    }

    /// Wrap this node's collection, items and children.
    pub fn add_middleware<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.extras.middleware.push(middleware_fn(f));
        self
    }

    /// Wrap this node's item routes and children.
    pub fn add_id_middleware<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.extras.id_middleware.push(middleware_fn(f));
        self
    }

    /// Wrap the whole application. Only valid on the tree root.
    pub fn add_root_middleware<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.extras.root_middleware.push(middleware_fn(f));
        self
    }

    /// Add an already boxed [`Middleware`] at node scope.
    pub fn with_middleware(mut self, mw: Middleware) -> Self {
        self.extras.middleware.push(mw);
        self
    }

    /// Add an already boxed [`Middleware`] at item scope.
    pub fn with_id_middleware(mut self, mw: Middleware) -> Self {
        self.extras.id_middleware.push(mw);
        self
    }

    /// Route `pattern` below the collection path, e.g. `/stats`.
    pub fn add_custom_route<H, X>(mut self, method: Method, pattern: &str, handler: H) -> Self
    where
        H: Handler<X, ()>,
        X: 'static,
    {
        let route = CustomRoute::new(method.clone(), pattern, handler);
        self.extras
            .push_route(&self.name, RouteScope::CustomCollection, route, &method);
        self
    }

    /// Route `pattern` below the item path. The handler can extract the loaded
    /// item with `Extension<T>`.
    pub fn add_custom_id_route<H, X>(mut self, method: Method, pattern: &str, handler: H) -> Self
    where
        H: Handler<X, ()>,
        X: 'static,
    {
        let route = CustomRoute::new(method.clone(), pattern, handler);
        self.extras
            .push_route(&self.name, RouteScope::CustomItem, route, &method);
        self
    }

    /// Route `pattern` at the application root. Only valid on the tree root.
    pub fn add_custom_root_route<H, X>(mut self, method: Method, pattern: &str, handler: H) -> Self
    where
        H: Handler<X, ()>,
        X: 'static,
    {
        let route = CustomRoute::new(method.clone(), pattern, handler);
        self.extras
            .push_route(&self.name, RouteScope::Root, route, &method);
        self
    }

    /// Stream events published on `hub` from `GET <collection><pattern>`.
    pub fn add_server_sent_events(
        mut self,
        pattern: &str,
        hub: BroadcastHub<ServerSentEvent>,
    ) -> Self {
        self.extras.hubs.push(Arc::new(hub.clone()));
        let route = CustomRoute::new(Method::GET, pattern, move || {
            let hub = hub.clone();
            async move { EventStreamResponse::from_hub(&hub) }
        });
        self.extras
            .push_route(&self.name, RouteScope::CustomCollection, route, &Method::GET);
        self
    }

    fn shared(&self, ancestors: &[PathLevel]) -> Arc<NodeShared<T>> {
        let depth = required_ids(ancestors);
        Arc::new(NodeShared {
            name: self.name.clone(),
            storage: Arc::clone(&self.storage),
            codes: self.codes,
            hooks: self.hooks.clone(),
            id_param: id_param(depth),
            parent_param: depth.checked_sub(1).map(id_param),
        })
    }

    fn verb_route(&self, verb: Verb, node: &Arc<NodeShared<T>>) -> MethodRouter {
        if let Some(route) = self.overrides.get(&verb) {
            return route.clone();
        }
        let node = Arc::clone(node);
        match verb {
            Verb::List => routing::get(
                move |ids: PathIds, Query(query): Query<BTreeMap<String, String>>| {
                    handlers::list(node, ids, query)
                },
            ),
            Verb::Create => {
                routing::post(move |ids: PathIds, body: Bytes| handlers::create(node, ids, body))
            }
            Verb::Get => routing::get(move |ids: PathIds| handlers::get(node, ids)),
            Verb::Put => routing::put(move |ids: PathIds, body: Bytes| handlers::put(node, ids, body)),
            Verb::Patch => {
                routing::patch(move |ids: PathIds, body: Bytes| handlers::patch(node, ids, body))
            }
            Verb::Delete => routing::delete(move |ids: PathIds| handlers::delete(node, ids)),
        }
    }

    fn method_router(&self, verbs: &[Verb], node: &Arc<NodeShared<T>>) -> MethodRouter {
        verbs
            .iter()
            .map(|verb| self.verb_route(*verb, node))
            .reduce(MethodRouter::merge)
            .unwrap_or_else(MethodRouter::new)
    }
}

impl<T: Resource> Node for Api<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn segment(&self) -> &str {
        &self.segment
    }

    fn level(&self) -> PathLevel {
        PathLevel::resource(&self.segment)
    }

    fn response_codes(&self) -> Option<ResponseCodes> {
        Some(self.codes)
    }

    fn resource_type(&self) -> Option<TypeId> {
        Some(TypeId::of::<T>())
    }

    fn validate(&self, is_root: bool, errors: &mut Vec<ConfigError>) {
        self.extras
            .validate(&self.name, &self.segment, is_root, true, errors);
    }

    fn mount(&self, ancestors: &[PathLevel], children: Mounted) -> Mounted {
        let node = self.shared(ancestors);
        let collection_path = collection_template(ancestors, &self.segment);
        let item_path = item_template(ancestors, &self.segment);

        let loaded = mount_custom(Mounted::empty(), &item_path, &self.extras.custom_id_routes)
            .merge(children)
            .layer(&item_loader(Arc::clone(&node)));

        let item = Mounted::empty()
            .route(
                &item_path,
                self.method_router(&[Verb::Get, Verb::Put, Verb::Patch, Verb::Delete], &node),
            )
            .merge(loaded)
            .layer_all(&self.extras.id_middleware);

        let collection = Mounted::empty().route(
            &collection_path,
            self.method_router(&[Verb::List, Verb::Create], &node),
        );
        mount_custom(collection, &collection_path, &self.extras.custom_routes)
            .merge(item)
            .layer_all(&self.extras.middleware)
    }

    fn mount_root(&self, app: Mounted) -> Mounted {
        mount_custom(app, "", &self.extras.root_routes).layer_all(&self.extras.root_middleware)
    }

    fn routes(&self, ancestors: &[PathLevel]) -> Vec<RouteEntry> {
        let collection_path = collection_template(ancestors, &self.segment);
        let item_path = item_template(ancestors, &self.segment);

        let mut entries: Vec<RouteEntry> = Verb::ALL
            .iter()
            .map(|verb| RouteEntry {
                node: self.name.clone(),
                method: verb.method(),
                path: if verb.is_item() {
                    item_path.clone()
                } else {
                    collection_path.clone()
                },
                scope: if verb.is_item() {
                    RouteScope::Item
                } else {
                    RouteScope::Collection
                },
            })
            .collect();
        entries.extend(describe(
            &self.name,
            &collection_path,
            &self.extras.custom_routes,
            RouteScope::CustomCollection,
        ));
        entries.extend(describe(
            &self.name,
            &item_path,
            &self.extras.custom_id_routes,
            RouteScope::CustomItem,
        ));
        entries.extend(describe(&self.name, "", &self.extras.root_routes, RouteScope::Root));
        entries
    }

    fn hubs(&self) -> Vec<Arc<dyn HubControl>> {
        self.extras.hubs.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct Tag {
        #[serde(default)]
        id: String,
        label: String,
    }

    impl Resource for Tag {
        fn id(&self) -> &str {
            &self.id
        }
        fn set_id(&mut self, id: String) {
            self.id = id;
        }
    }

    #[test]
    fn test_route_description() {
        let api = Api::<Tag>::new("Tags", "tags")
            .add_custom_route(Method::GET, "/popular", || async { "[]" })
            .add_custom_id_route(Method::POST, "/pin", || async { "ok" });
        let ancestors = [PathLevel::resource("posts")];
        let routes = api.routes(&ancestors);

        assert_eq!(routes.len(), 8);
        assert!(routes.iter().any(|r| r.method == Method::POST
            && r.path == "/posts/{id0}/tags"
            && r.scope == RouteScope::Collection));
        assert!(routes.iter().any(|r| r.method == Method::PATCH
            && r.path == "/posts/{id0}/tags/{id1}"
            && r.scope == RouteScope::Item));
        assert!(routes
            .iter()
            .any(|r| r.path == "/posts/{id0}/tags/popular" && r.scope == RouteScope::CustomCollection));
        assert!(routes
            .iter()
            .any(|r| r.path == "/posts/{id0}/tags/{id1}/pin" && r.scope == RouteScope::CustomItem));
    }

    #[test]
    fn test_param_names_follow_depth() {
        let api = Api::<Tag>::new("Tags", "tags");
        let shared = api.shared(&[PathLevel::grouping("v1"), PathLevel::resource("posts")]);
        assert_eq!(shared.id_param, "id1");
        assert_eq!(shared.parent_param.as_deref(), Some("id0"));

        let root = api.shared(&[]);
        assert_eq!(root.id_param, "id0");
        assert_eq!(root.parent_param, None);
    }

    #[test]
    fn test_root_only_customisation_flagged_below_root() {
        let api = Api::<Tag>::new("Tags", "tags")
            .add_custom_root_route(Method::GET, "/health", || async { "ok" });
        let mut errors = Vec::new();
        api.validate(false, &mut errors);
        assert_eq!(
            errors,
            [ConfigError::RootOnly {
                node: "Tags".into(),
                what: "custom root route"
            }]
        );

        errors.clear();
        api.validate(true, &mut errors);
        assert!(errors.is_empty());
    }
}
