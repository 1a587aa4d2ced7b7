//! Shared building blocks for tree nodes.
//!
//! [`Node`] is the type-erased face every entry of a [`ResourceTree`](super::ResourceTree)
//! presents to the route composition engine. [`Api`](super::Api) (a CRUD resource) and
//! [`Group`](super::Group) (a pure grouping collection) are the two implementations
//! shipped with the crate.

use super::broadcast::HubControl;
use super::middleware::Middleware;
use crate::error::ConfigError;
use crate::protocol::{is_valid_segment, PathLevel};
use crate::types::ResponseCodes;
use axum::extract::Request;
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use std::any::TypeId;
use std::collections::HashSet;
use std::sync::Arc;

/// Where a route sits relative to its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteScope {
    /// list / create
    Collection,
    /// get / put / patch / delete
    Item,
    /// custom collection-level route
    CustomCollection,
    /// custom item-level route
    CustomItem,
    /// custom route mounted at the application root
    Root,
}

/// One row of a rendered route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Node that mounts the route.
    pub node: String,
    /// HTTP method.
    pub method: Method,
    /// Absolute path template, e.g. `/artists/{id0}`.
    pub path: String,
    /// Where the route sits relative to the node.
    pub scope: RouteScope,
}

/// A custom route: verb, pattern relative to its mount point, and handler.
#[derive(Clone)]
pub(crate) struct CustomRoute {
    pub method: Method,
    pub pattern: String,
    pub route: MethodRouter,
}

impl CustomRoute {
    /// `None` when axum cannot route the method.
    pub fn new<H, X>(method: Method, pattern: &str, handler: H) -> Option<Self>
    where
        H: axum::handler::Handler<X, ()>,
        X: 'static,
    {
        let filter = MethodFilter::try_from(method.clone()).ok()?;
        Some(Self {
            method,
            pattern: pattern.to_string(),
            route: axum::routing::on(filter, handler),
        })
    }
}

/// A router under construction, tracking whether it holds any route.
///
/// Axum refuses `route_layer` on a router with no routes, so layering an
/// empty `Mounted` is a no-op.
pub struct Mounted {
    router: Router,
    routes: usize,
}

impl Mounted {
    /// No routes yet.
    pub fn empty() -> Self {
        Self {
            router: Router::new(),
            routes: 0,
        }
    }

    /// Mount `method_router` at `path`.
    pub fn route(mut self, path: &str, method_router: MethodRouter) -> Self {
        tracing::debug!(path, "mounting route");
        self.router = self.router.route(path, method_router);
        self.routes += 1;
        self
    }

    /// Take over every route of `other`.
    pub fn merge(mut self, other: Mounted) -> Self {
        if other.routes == 0 {
            return self;
        }
        self.router = self.router.merge(other.router);
        self.routes += other.routes;
        self
    }

    /// Wrap every route currently mounted in `mw`.
    pub fn layer(mut self, mw: &Middleware) -> Self {
        if self.routes == 0 {
            return self;
        }
        let mw = mw.clone();
        self.router = self
            .router
            .route_layer(middleware::from_fn(move |req: Request, next: Next| mw(req, next)));
        self
    }

    /// Wrap in each middleware so that the first one runs outermost.
    pub fn layer_all(self, chain: &[Middleware]) -> Self {
        chain.iter().rev().fold(self, |mounted, mw| mounted.layer(mw))
    }

    /// Whether no route was mounted.
    pub fn is_empty(&self) -> bool {
        self.routes == 0
    }

    /// The finished router.
    pub fn into_router(self) -> Router {
        self.router
    }
}

impl Default for Mounted {
    fn default() -> Self {
        Self::empty()
    }
}

/// A node of a resource tree, as seen by the composition engine.
pub trait Node: Send + Sync + 'static {
    /// Unique name among siblings; also the client-tree lookup key.
    fn name(&self) -> &str;

    /// Path fragment relative to the parent.
    fn segment(&self) -> &str;

    /// The level this node contributes to its descendants' paths.
    fn level(&self) -> PathLevel;

    /// Success codes of the CRUD surface; `None` for nodes without one.
    fn response_codes(&self) -> Option<ResponseCodes>;

    /// Type of the resource served, if any.
    fn resource_type(&self) -> Option<TypeId>;

    /// Record structural problems with this node's own configuration.
    fn validate(&self, is_root: bool, errors: &mut Vec<ConfigError>);

    /// Render this node's routes, placing the already rendered `children`
    /// underneath its item scope.
    fn mount(&self, ancestors: &[PathLevel], children: Mounted) -> Mounted;

    /// Add root-only routes and middleware around the fully rendered app.
    fn mount_root(&self, app: Mounted) -> Mounted;

    /// Describe the routes [`Node::mount`] produces.
    fn routes(&self, ancestors: &[PathLevel]) -> Vec<RouteEntry>;

    /// Broadcast hubs owned by this node's endpoints.
    fn hubs(&self) -> Vec<Arc<dyn HubControl>>;
}

/// Customisation shared by every node kind.
#[derive(Default, Clone)]
pub(crate) struct Extras {
    pub middleware: Vec<Middleware>,
    pub id_middleware: Vec<Middleware>,
    pub root_middleware: Vec<Middleware>,
    pub custom_routes: Vec<CustomRoute>,
    pub custom_id_routes: Vec<CustomRoute>,
    pub root_routes: Vec<CustomRoute>,
    pub hubs: Vec<Arc<dyn HubControl>>,
    pub problems: Vec<ConfigError>,
}

impl Extras {
    pub fn push_route(
        &mut self,
        node: &str,
        scope: RouteScope,
        route: Option<CustomRoute>,
        method: &Method,
    ) {
        let Some(route) = route else {
            self.problems.push(ConfigError::UnsupportedMethod {
                node: node.to_string(),
                method: method.to_string(),
            });
            return;
        };
        match scope {
            RouteScope::CustomItem => self.custom_id_routes.push(route),
            RouteScope::Root => self.root_routes.push(route),
            _ => self.custom_routes.push(route),
        }
    }

    /// Checks common to [`Api`](super::Api) and [`Group`](super::Group).
    pub fn validate(
        &self,
        name: &str,
        segment: &str,
        is_root: bool,
        item_params: bool,
        errors: &mut Vec<ConfigError>,
    ) {
        errors.extend(self.problems.iter().cloned());

        if !is_valid_segment(segment) {
            errors.push(ConfigError::InvalidSegment {
                node: name.to_string(),
                segment: segment.to_string(),
            });
        }

        if !is_root {
            if !self.root_routes.is_empty() {
                errors.push(ConfigError::RootOnly {
                    node: name.to_string(),
                    what: "custom root route",
                });
            }
            if !self.root_middleware.is_empty() {
                errors.push(ConfigError::RootOnly {
                    node: name.to_string(),
                    what: "root middleware",
                });
            }
        }

        for (routes, first_may_be_param) in [
            (&self.custom_routes, !item_params),
            (&self.custom_id_routes, true),
            (&self.root_routes, true),
        ] {
            let mut seen = HashSet::new();
            for route in routes {
                let invalid = !valid_pattern(&route.pattern)
                    || (!first_may_be_param && route.pattern.starts_with("/{"))
                    || !seen.insert((route.method.clone(), route.pattern.clone()));
                if invalid {
                    errors.push(ConfigError::InvalidPattern {
                        node: name.to_string(),
                        pattern: route.pattern.clone(),
                    });
                }
            }
        }
    }
}

/// Mount custom routes below `base`.
pub(crate) fn mount_custom(mut mounted: Mounted, base: &str, routes: &[CustomRoute]) -> Mounted {
    for route in routes {
        mounted = mounted.route(&format!("{base}{}", route.pattern), route.route.clone());
    }
    mounted
}

/// Route-table rows for custom routes below `base`.
pub(crate) fn describe(
    node: &str,
    base: &str,
    routes: &[CustomRoute],
    scope: RouteScope,
) -> Vec<RouteEntry> {
    routes
        .iter()
        .map(|route| RouteEntry {
            node: node.to_string(),
            method: route.method.clone(),
            path: format!("{base}{}", route.pattern),
            scope,
        })
        .collect()
}

fn valid_pattern(pattern: &str) -> bool {
    pattern.len() > 1 && pattern.starts_with('/') && !pattern.ends_with('/')
}
