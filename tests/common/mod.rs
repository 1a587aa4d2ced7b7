#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use canopy_axum_http::server::{serve_listener, ServerConfig};
use canopy_axum_http::{CanopyError, ClientTree, ResourceTree};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceExt;

/// A tree served on an ephemeral local port.
pub struct TestServer {
    pub address: String,
    pub clients: ClientTree,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), CanopyError>>,
}

impl TestServer {
    pub async fn start(tree: ResourceTree) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        let clients = tree.client_tree(&address).unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let config = ServerConfig::default()
            .with_trace_requests(false)
            .with_shutdown_grace(Duration::from_secs(5));
        let handle = tokio::spawn(async move {
            serve_listener(&tree, listener, &config, async {
                let _ = rx.await;
            })
            .await
        });

        Self {
            address,
            clients,
            shutdown: Some(tx),
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.address)
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

/// Send one request through a rendered router.
pub async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let res = app.clone().oneshot(request).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// The `id` field of a JSON body.
pub fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}
