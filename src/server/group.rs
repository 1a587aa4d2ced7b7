//! Pure collection nodes.
//!
//! A [`Group`] has no item type and no CRUD surface. It only contributes a
//! path segment (`/music`), plus whatever custom routes, middleware and event
//! streams are attached to it. Its children mount directly below that segment
//! and do not gain an identifier parameter from it.

use super::broadcast::{BroadcastHub, HubControl};
use super::middleware::middleware_fn;
use super::node::{describe, mount_custom, CustomRoute, Extras, Mounted, Node, RouteEntry, RouteScope};
use super::sse::EventStreamResponse;
use crate::error::ConfigError;
use crate::protocol::{collection_template, PathLevel, ServerSentEvent};
use crate::types::ResponseCodes;
use axum::extract::Request;
use axum::handler::Handler;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use std::any::TypeId;
use std::future::Future;
use std::sync::Arc;

/// A grouping node with no resource type.
pub struct Group {
    name: String,
    segment: String,
    extras: Extras,
}

impl Group {
    /// New group named `name`, mounted at `segment` below its parent.
    pub fn new(name: impl Into<String>, segment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            segment: segment.into(),
            extras: Extras::default(),
        }
    }

    /// Wrap everything below this group.
    pub fn add_middleware<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.extras.middleware.push(middleware_fn(f));
        self
    }

    /// Always rejected when the tree is rendered: a group has no items.
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

    /// Route `pattern` below the group's path.
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

    /// Always rejected when the tree is rendered: a group has no items.
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

    /// Stream events published on `hub` from `GET <group path><pattern>`.
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
}

impl Node for Group {
    fn name(&self) -> &str {
        &self.name
    }

    fn segment(&self) -> &str {
        &self.segment
    }

    fn level(&self) -> PathLevel {
        PathLevel::grouping(&self.segment)
    }

    fn response_codes(&self) -> Option<ResponseCodes> {
        None
    }

    fn resource_type(&self) -> Option<TypeId> {
        None
    }

    fn validate(&self, is_root: bool, errors: &mut Vec<ConfigError>) {
        if !self.extras.id_middleware.is_empty() {
            errors.push(ConfigError::ItemScopedOnGroup {
                node: self.name.clone(),
                what: "middleware",
            });
        }
        if !self.extras.custom_id_routes.is_empty() {
            errors.push(ConfigError::ItemScopedOnGroup {
                node: self.name.clone(),
                what: "custom route",
            });
        }
        self.extras
            .validate(&self.name, &self.segment, is_root, false, errors);
    }

    fn mount(&self, ancestors: &[PathLevel], children: Mounted) -> Mounted {
        let path = collection_template(ancestors, &self.segment);
        mount_custom(Mounted::empty(), &path, &self.extras.custom_routes)
            .merge(children)
            .layer_all(&self.extras.middleware)
    }

    fn mount_root(&self, app: Mounted) -> Mounted {
        mount_custom(app, "", &self.extras.root_routes).layer_all(&self.extras.root_middleware)
    }

    fn routes(&self, ancestors: &[PathLevel]) -> Vec<RouteEntry> {
        let path = collection_template(ancestors, &self.segment);
        let mut entries = describe(
            &self.name,
            &path,
            &self.extras.custom_routes,
            RouteScope::CustomCollection,
        );
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

    #[test]
    fn test_item_scoped_customisation_is_rejected() {
        let group = Group::new("Music", "music")
            .add_id_middleware(|req, next: Next| async move { next.run(req).await })
            .add_custom_id_route(Method::GET, "/x", || async { "x" });
        let mut errors = Vec::new();
        group.validate(true, &mut errors);
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ConfigError::ItemScopedOnGroup { .. })));
    }

    #[test]
    fn test_group_routes() {
        let group = Group::new("Music", "music").add_custom_route(Method::GET, "/stats", || async {
            "{}"
        });
        let routes = group.routes(&[]);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].path, "/music/stats");
        assert_eq!(group.level(), PathLevel::grouping("music"));
    }
}
