//! Resource trees and route composition.
//!
//! A [`ResourceTree`] is an arena of [`Node`]s. Each slot keeps its children
//! and a non-owning back-reference to its parent, so any node can compute its
//! ancestor chain (and with it, its absolute path) without owning cycles.
//!
//! Rendering walks the tree depth first: every node receives its already
//! rendered children and places them below its own item scope. The same walk
//! backs [`ResourceTree::route_table`], and the client side derives its paths
//! from [`ResourceTree::path_levels`], both through
//! [`crate::protocol::paths`], so routes and client mirrors agree by
//! construction.
//!
//! Rendering freezes the topology: [`ResourceTree::add_child`] fails with
//! [`CanopyError::AlreadyRendered`] afterwards.

use super::broadcast::HubControl;
use super::node::{Mounted, Node, RouteEntry, RouteScope};
use crate::client::{Client, ClientConfig, ClientTree};
use crate::error::{CanopyError, ConfigError, Result};
use crate::protocol::{collection_template, PathLevel};
use axum::http::Method;
use axum::Router;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle of a node inside one [`ResourceTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Position in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

struct Slot {
    node: Box<dyn Node>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A tree of resource and grouping nodes.
pub struct ResourceTree {
    slots: Vec<Slot>,
    frozen: AtomicBool,
}

impl ResourceTree {
    /// Start a tree from its root node.
    pub fn new(root: impl Node) -> Self {
        Self {
            slots: vec![Slot {
                node: Box::new(root),
                parent: None,
                children: Vec::new(),
            }],
            frozen: AtomicBool::new(false),
        }
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Attach `node` below `parent`.
    pub fn add_child(&mut self, parent: NodeId, node: impl Node) -> Result<NodeId> {
        if self.is_frozen() {
            return Err(CanopyError::AlreadyRendered);
        }
        self.slot(parent)?;
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            node: Box::new(node),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.slots[parent.0].children.push(id);
        tracing::debug!(parent = parent.0, child = id.0, "added node");
        Ok(id)
    }

    fn slot(&self, id: NodeId) -> Result<&Slot> {
        self.slots.get(id.0).ok_or(CanopyError::UnknownNode(id.0))
    }

    /// Whether a render already happened.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Freeze the topology. Called by every rendering entry point.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always `false`: a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Name of node `id`.
    pub fn name(&self, id: NodeId) -> Result<&str> {
        Ok(self.slot(id)?.node.name())
    }

    /// Parent of node `id`; `None` for the root.
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.slot(id)?.parent)
    }

    /// Children of node `id`, in insertion order.
    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.slot(id)?.children)
    }

    /// Child of `parent` named `name`.
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.slots
            .get(parent.0)?
            .children
            .iter()
            .copied()
            .find(|child| self.slots[child.0].node.name() == name)
    }

    /// First node named `name`, depth first.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.preorder()
            .into_iter()
            .find(|id| self.slots[id.0].node.name() == name)
    }

    /// Ancestors of `id`, root first, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut chain = Vec::new();
        let mut cursor = self.slot(id)?.parent;
        while let Some(parent) = cursor {
            chain.push(parent);
            cursor = self.slots[parent.0].parent;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Path levels contributed by the ancestors of `id`.
    pub fn path_levels(&self, id: NodeId) -> Result<Vec<PathLevel>> {
        Ok(self
            .ancestors(id)?
            .into_iter()
            .map(|ancestor| self.slots[ancestor.0].node.level())
            .collect())
    }

    /// Collection path template of `id`, e.g. `/artists/{id0}/albums`.
    pub fn absolute_path(&self, id: NodeId) -> Result<String> {
        let segment = self.slot(id)?.node.segment();
        Ok(collection_template(&self.path_levels(id)?, segment))
    }

    /// Every node, depth first, parents before children.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.slots.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.slots[id.0].children.iter().rev().copied());
        }
        order
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&dyn Node> {
        Ok(self.slot(id)?.node.as_ref())
    }

    /// Check the whole tree, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        for id in self.preorder() {
            let slot = &self.slots[id.0];
            slot.node.validate(id == self.root(), &mut errors);

            let mut seen = HashSet::new();
            for child in &slot.children {
                let name = self.slots[child.0].node.name();
                if !seen.insert(name) {
                    errors.push(ConfigError::DuplicateChild {
                        parent: slot.node.name().to_string(),
                        name: name.to_string(),
                    });
                }
            }
        }
        self.route_conflicts(&mut errors)?;
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CanopyError::Config(errors))
        }
    }

    /// Axum refuses a method twice on one path, and one path shape spelled
    /// with different parameter names.
    fn route_conflicts(&self, errors: &mut Vec<ConfigError>) -> Result<()> {
        let mut methods = HashSet::new();
        let mut spellings: HashMap<String, String> = HashMap::new();
        for id in self.preorder() {
            for entry in self.slots[id.0].node.routes(&self.path_levels(id)?) {
                let shape = route_shape(&entry.path);
                let spelled = spellings
                    .entry(shape.clone())
                    .or_insert_with(|| entry.path.clone());
                if *spelled != entry.path || !methods.insert((entry.method.clone(), shape)) {
                    errors.push(ConfigError::ConflictingRoute {
                        node: entry.node,
                        method: entry.method.to_string(),
                        path: entry.path,
                    });
                }
            }
        }
        Ok(())
    }

    fn mount_subtree(&self, id: NodeId, ancestors: &mut Vec<PathLevel>) -> Mounted {
        let slot = &self.slots[id.0];
        ancestors.push(slot.node.level());
        let children = slot
            .children
            .iter()
            .fold(Mounted::empty(), |mounted, child| {
                mounted.merge(self.mount_subtree(*child, ancestors))
            });
        ancestors.pop();
        slot.node.mount(ancestors, children)
    }

    /// Render the tree into an axum [`Router`].
    pub fn router(&self) -> Result<Router> {
        self.freeze();
        self.validate()?;

        let app = self.mount_subtree(self.root(), &mut Vec::new());
        let app = self.slots[self.root().0].node.mount_root(app);
        tracing::debug!(nodes = self.slots.len(), "rendered resource tree");
        Ok(app.into_router())
    }

    /// Describe every route [`ResourceTree::router`] mounts.
    pub fn route_table(&self) -> Result<RouteTable> {
        self.freeze();
        self.validate()?;

        let mut entries = Vec::new();
        for id in self.preorder() {
            entries.extend(self.slots[id.0].node.routes(&self.path_levels(id)?));
        }
        Ok(RouteTable { entries })
    }

    /// Broadcast hubs registered anywhere in the tree.
    pub fn hubs(&self) -> Vec<Arc<dyn HubControl>> {
        self.preorder()
            .into_iter()
            .flat_map(|id| self.slots[id.0].node.hubs())
            .collect()
    }

    /// Client mirrors of every node, keyed by node name.
    pub fn client_tree(&self, address: &str) -> Result<ClientTree> {
        ClientTree::build(self, address, ClientConfig::default())
    }

    /// Typed client mirror of one node.
    ///
    /// `T` must be the node's resource type, or `serde_json::Value`.
    pub fn client<T>(&self, id: NodeId, address: &str) -> Result<Client<T>>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let node = self.node(id)?;
        let erased = TypeId::of::<T>() == TypeId::of::<serde_json::Value>();
        if !erased && node.resource_type() != Some(TypeId::of::<T>()) {
            return Err(CanopyError::UnknownTarget {
                name: format!("{} as {}", node.name(), std::any::type_name::<T>()),
                options: vec![node.name().to_string()],
            });
        }
        Client::from_node(self, id, address, ClientConfig::default())
    }
}

fn route_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.starts_with("{*") {
                "{*}"
            } else if segment.starts_with('{') {
                "{}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Introspectable list of rendered routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// Rows in render order.
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// Iterate the rows.
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }

    /// Routes of one node.
    pub fn for_node<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a RouteEntry> + 'a {
        self.entries.iter().filter(move |entry| entry.node == node)
    }

    /// Path served for `method` at `scope` by `node`.
    pub fn path(&self, node: &str, scope: RouteScope, method: &Method) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.node == node && entry.scope == scope && &entry.method == method)
            .map(|entry| entry.path.as_str())
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is routed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
