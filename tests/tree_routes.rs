mod common;

use axum::http::{Method, StatusCode};
use canopy_axum_http::server::{require_bearer_token, Api, Group, NodeId, ResourceTree, RouteScope};
use canopy_axum_http::{CanopyError, ConfigError, Resource};
use common::call;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Thing {
    #[serde(default)]
    id: String,
    #[serde(default)]
    parent: Option<String>,
}

impl Resource for Thing {
    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn parent_id(&self) -> Option<&str> {
        self.parent.as_deref()
    }
    fn set_parent_id(&mut self, parent_id: String) {
        self.parent = Some(parent_id);
    }
}

fn api(name: &str) -> Api<Thing> {
    Api::new(name, name.to_lowercase())
}

/// A few shapes: plain chain, grouping root, grouping in the middle, wide fan-out.
fn trees() -> Vec<ResourceTree> {
    let mut chain = ResourceTree::new(api("A"));
    let b = chain.add_child(chain.root(), api("B")).unwrap();
    let c = chain.add_child(b, api("C")).unwrap();
    chain.add_child(c, api("D")).unwrap();

    let mut grouped = ResourceTree::new(Group::new("Root", "v1"));
    let users = grouped.add_child(grouped.root(), api("Users")).unwrap();
    grouped.add_child(grouped.root(), api("Teams")).unwrap();
    let extras = grouped
        .add_child(users, Group::new("Extras", "extras"))
        .unwrap();
    let keys = grouped.add_child(extras, api("Keys")).unwrap();
    grouped.add_child(keys, api("Scopes")).unwrap();

    let mut wide = ResourceTree::new(api("Hub"));
    for name in ["S1", "S2", "S3"] {
        let child = wide.add_child(wide.root(), api(name)).unwrap();
        wide.add_child(child, api(&format!("{name}x"))).unwrap();
    }

    vec![chain, grouped, wide]
}

fn resource_nodes(tree: &ResourceTree) -> Vec<NodeId> {
    tree.preorder()
        .into_iter()
        .filter(|id| {
            let name = tree.name(*id).unwrap();
            !matches!(name, "Root" | "Extras")
        })
        .collect()
}

#[test]
fn test_routes_and_client_mirrors_agree() {
    for tree in trees() {
        let table = tree.route_table().unwrap();
        let clients = tree.client_tree("http://localhost:1").unwrap();

        for id in resource_nodes(&tree) {
            let name = tree.name(id).unwrap();
            let client = clients.get(name).unwrap();
            assert_eq!(
                table.path(name, RouteScope::Collection, &Method::GET),
                Some(client.path_template().as_str()),
                "collection path of {name}"
            );
            assert_eq!(
                table.path(name, RouteScope::Item, &Method::DELETE),
                Some(client.item_path_template().as_str()),
                "item path of {name}"
            );
            assert_eq!(tree.absolute_path(id).unwrap(), client.path_template());

            // Substituting concrete ids into the template gives the client's URL.
            let ids: Vec<String> = (0..client.required_ids()).map(|i| format!("x{i}")).collect();
            let parents: Vec<&str> = ids.iter().map(String::as_str).collect();
            let mut expected = client.item_path_template();
            for (depth, value) in ids.iter().map(String::as_str).chain(["me"]).enumerate() {
                expected = expected.replace(&format!("{{id{depth}}}"), value);
            }
            let url = client.url(&parents, Some("me")).unwrap();
            assert_eq!(url.path(), expected);
        }
    }
}

#[test]
fn test_wrong_ancestor_count_never_builds_a_url() {
    for tree in trees() {
        let clients = tree.client_tree("http://localhost:1").unwrap();
        for id in resource_nodes(&tree) {
            let client = clients.get(tree.name(id).unwrap()).unwrap();
            let depth = client.required_ids();
            assert_eq!(depth, tree.ancestors(id).unwrap().len() - grouping_ancestors(&tree, id));

            for k in (0..=depth + 2).filter(|k| *k != depth) {
                let ids = vec!["x"; k];
                match client.url(&ids, None) {
                    Err(CanopyError::ArgumentCount { expected, got }) => {
                        assert_eq!((expected, got), (depth, k));
                    }
                    other => panic!("expected argument count error, got {other:?}"),
                }
            }
        }
    }
}

fn grouping_ancestors(tree: &ResourceTree, id: NodeId) -> usize {
    tree.ancestors(id)
        .unwrap()
        .into_iter()
        .filter(|a| matches!(tree.name(*a).unwrap(), "Root" | "Extras"))
        .count()
}

#[test]
fn test_topology_is_frozen_after_any_render() {
    let mut by_router = ResourceTree::new(api("A"));
    by_router.router().unwrap();
    let mut by_table = ResourceTree::new(api("A"));
    by_table.route_table().unwrap();
    let mut by_clients = ResourceTree::new(api("A"));
    by_clients.client_tree("http://localhost:1").unwrap();

    for tree in [&mut by_router, &mut by_table, &mut by_clients] {
        let root = tree.root();
        assert!(matches!(
            tree.add_child(root, api("B")),
            Err(CanopyError::AlreadyRendered)
        ));
    }
}

#[test]
fn test_configuration_errors_are_batched() {
    let mut tree = ResourceTree::new(
        Group::new("Root", "v1").add_id_middleware(|req, next: axum::middleware::Next| async move {
            next.run(req).await
        }),
    );
    tree.add_child(
        tree.root(),
        api("Users")
            .add_custom_root_route(Method::GET, "/health", || async { "ok" })
            .add_custom_route(Method::GET, "stats", || async { "{}" }),
    )
    .unwrap();
    tree.add_child(
        tree.root(),
        api("Teams").add_custom_route(
            Method::from_bytes(b"BREW").unwrap(),
            "/coffee",
            || async { "" },
        ),
    )
    .unwrap();
    tree.add_child(tree.root(), Api::<Thing>::new("Teams", "crews"))
        .unwrap();

    let errors = match tree.router().unwrap_err() {
        CanopyError::Config(errors) => errors,
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(errors.len(), 5, "{errors:?}");
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::ItemScopedOnGroup { node, .. } if node == "Root")));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::RootOnly { node, .. } if node == "Users")));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::InvalidPattern { pattern, .. } if pattern == "stats")));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::UnsupportedMethod { method, .. } if method == "BREW")));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::DuplicateChild { name, .. } if name == "Teams")));
}

fn conflicts(tree: &ResourceTree) -> Vec<ConfigError> {
    let table_errors = match tree.route_table().unwrap_err() {
        CanopyError::Config(errors) => errors,
        other => panic!("unexpected {other:?}"),
    };
    let router_errors = match tree.router() {
        Err(CanopyError::Config(errors)) => errors,
        Err(other) => panic!("unexpected {other:?}"),
        Ok(_) => panic!("router rendered a conflicting tree"),
    };
    assert_eq!(table_errors, router_errors);
    router_errors
}

#[test]
fn test_sibling_segments_must_differ() {
    let mut tree = ResourceTree::new(api("Artists"));
    tree.add_child(tree.root(), api("Albums")).unwrap();
    tree.add_child(tree.root(), Api::<Thing>::new("Records", "albums"))
        .unwrap();

    let errors = conflicts(&tree);
    assert_eq!(errors.len(), 6, "{errors:?}");
    assert!(errors.contains(&ConfigError::ConflictingRoute {
        node: "Records".into(),
        method: "GET".into(),
        path: "/artists/{id0}/albums/{id1}".into(),
    }));
    assert!(errors
        .iter()
        .all(|e| matches!(e, ConfigError::ConflictingRoute { node, .. } if node == "Records")));
}

#[test]
fn test_custom_item_route_cannot_shadow_a_child() {
    let mut tree = ResourceTree::new(api("Artists").add_custom_id_route(
        Method::GET,
        "/albums",
        || async { "[]" },
    ));
    tree.add_child(tree.root(), api("Albums")).unwrap();

    assert_eq!(
        conflicts(&tree),
        [ConfigError::ConflictingRoute {
            node: "Albums".into(),
            method: "GET".into(),
            path: "/artists/{id0}/albums".into(),
        }]
    );
}

#[test]
fn test_group_route_cannot_shadow_a_child() {
    let mut tree = ResourceTree::new(
        Group::new("Music", "music").add_custom_route(Method::GET, "/artists", || async { "[]" }),
    );
    tree.add_child(tree.root(), api("Artists")).unwrap();

    assert_eq!(
        conflicts(&tree),
        [ConfigError::ConflictingRoute {
            node: "Artists".into(),
            method: "GET".into(),
            path: "/music/artists".into(),
        }]
    );
}

#[tokio::test]
async fn test_item_middleware_stays_in_its_subtree() {
    let mut tree = ResourceTree::new(Group::new("Root", "v1"));
    let users = tree
        .add_child(
            tree.root(),
            api("Users").with_id_middleware(require_bearer_token("s3cret")),
        )
        .unwrap();
    tree.add_child(users, api("Keys")).unwrap();
    tree.add_child(tree.root(), api("Teams")).unwrap();
    let app = tree.router().unwrap();

    // Collection of the guarded node and its sibling are open.
    assert_eq!(call(&app, Method::GET, "/v1/users", None).await.0, StatusCode::OK);
    assert_eq!(call(&app, Method::GET, "/v1/teams", None).await.0, StatusCode::OK);
    assert_eq!(
        call(&app, Method::GET, "/v1/teams/t1", None).await.0,
        StatusCode::NOT_FOUND
    );

    // Item scope and the child subtree are guarded.
    assert_eq!(
        call(&app, Method::GET, "/v1/users/u1", None).await.0,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        call(&app, Method::GET, "/v1/users/u1/keys", None).await.0,
        StatusCode::FORBIDDEN
    );
}
