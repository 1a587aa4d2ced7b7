//! Name-keyed client mirrors of a whole resource tree.
//!
//! [`ClientTree`] walks a [`ResourceTree`] in the same depth-first order the
//! router is rendered in and registers one untyped [`Client`] per resource
//! node. Grouping nodes get no client of their own; their segment still shows
//! up in the ancestor chain of every descendant.
//!
//! The CLI and test harnesses resolve targets through this map, so adding a
//! node to the tree is the only bookkeeping needed to reach it.

use super::config::ClientConfig;
use super::fetch::Client;
use super::utils::parse_address;
use crate::error::{CanopyError, ConfigError, Result};
use crate::server::ResourceTree;
use reqwest::RequestBuilder;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Client mirrors keyed by node name.
#[derive(Debug, Clone, Default)]
pub struct ClientTree {
    clients: BTreeMap<String, Client<Value>>,
}

impl ClientTree {
    /// Mirror every resource node of `tree` against the server at `address`.
    ///
    /// Freezes the tree's topology. Node names must be unique across the
    /// whole tree, not only among siblings, since they are the lookup keys.
    pub fn build(tree: &ResourceTree, address: &str, config: ClientConfig) -> Result<Self> {
        tree.freeze();
        tree.validate()?;

        let base = parse_address(address)?;
        let http = config.build_http()?;
        let config = Arc::new(config);

        let mut clients = BTreeMap::new();
        let mut errors = Vec::new();
        for id in tree.preorder() {
            let node = tree.node(id)?;
            let Some(codes) = node.response_codes() else {
                continue;
            };
            let client = Client::from_parts(
                node.name().to_string(),
                base.clone(),
                node.segment().to_string(),
                tree.path_levels(id)?,
                codes,
                http.clone(),
                Arc::clone(&config),
            );
            if clients.insert(node.name().to_string(), client).is_some() {
                errors.push(ConfigError::AmbiguousClientName {
                    name: node.name().to_string(),
                });
            }
        }
        if !errors.is_empty() {
            return Err(CanopyError::Config(errors));
        }

        tracing::debug!(clients = clients.len(), %base, "built client tree");
        Ok(Self { clients })
    }

    /// Client registered under `name`.
    pub fn get(&self, name: &str) -> Result<&Client<Value>> {
        self.clients
            .get(name)
            .ok_or_else(|| CanopyError::UnknownTarget {
                name: name.to_string(),
                options: self.names().map(str::to_string).collect(),
            })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    /// Number of mirrored nodes.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no node was mirrored.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Apply `editor` to every request sent by every client.
    pub fn with_request_editor(
        mut self,
        editor: impl Fn(RequestBuilder) -> RequestBuilder + Send + Sync + 'static,
    ) -> Self {
        let editor: super::fetch::RequestEditor = Arc::new(editor);
        for client in self.clients.values_mut() {
            client.push_editor(Arc::clone(&editor));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{Api, Group};
    use crate::types::Resource;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct Thing {
        #[serde(default)]
        id: String,
    }

    impl Resource for Thing {
        fn id(&self) -> &str {
            &self.id
        }
        fn set_id(&mut self, id: String) {
            self.id = id;
        }
    }

    #[test]
    fn test_grouping_root_has_no_client() {
        let mut tree = ResourceTree::new(Group::new("Music", "music"));
        let artists = tree
            .add_child(tree.root(), Api::<Thing>::new("Artists", "artists"))
            .unwrap();
        tree.add_child(artists, Api::<Thing>::new("Albums", "albums"))
            .unwrap();

        let clients = ClientTree::build(&tree, "localhost:1", ClientConfig::default()).unwrap();
        assert_eq!(clients.names().collect::<Vec<_>>(), ["Albums", "Artists"]);
        assert_eq!(
            clients.get("Albums").unwrap().path_template(),
            "/music/artists/{id0}/albums"
        );
    }

    #[test]
    fn test_unknown_target_lists_options() {
        let tree = ResourceTree::new(Api::<Thing>::new("Artists", "artists"));
        let clients = tree.client_tree("http://localhost:1").unwrap();
        let err = clients.get("Bands").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown target \"Bands\": valid options are: [Artists]"
        );
    }

    #[test]
    fn test_duplicate_names_across_branches() {
        let mut tree = ResourceTree::new(Group::new("Music", "music"));
        let artists = tree
            .add_child(tree.root(), Api::<Thing>::new("Artists", "artists"))
            .unwrap();
        let labels = tree
            .add_child(tree.root(), Api::<Thing>::new("Labels", "labels"))
            .unwrap();
        tree.add_child(artists, Api::<Thing>::new("Releases", "releases"))
            .unwrap();
        tree.add_child(labels, Api::<Thing>::new("Releases", "releases"))
            .unwrap();

        match tree.client_tree("http://localhost:1").unwrap_err() {
            CanopyError::Config(errors) => assert_eq!(
                errors,
                [ConfigError::AmbiguousClientName {
                    name: "Releases".into()
                }]
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_build_freezes_tree() {
        let mut tree = ResourceTree::new(Api::<Thing>::new("Artists", "artists"));
        tree.client_tree("http://localhost:1").unwrap();
        assert!(tree.is_frozen());
        assert!(matches!(
            tree.add_child(tree.root(), Api::<Thing>::new("Albums", "albums")),
            Err(CanopyError::AlreadyRendered)
        ));
    }
}
