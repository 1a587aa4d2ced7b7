//! Typed client mirrors of resource nodes.
//!
//! A [`Client<T>`] addresses one node of a served tree. It knows the node's
//! segment and a copy of its ancestor chain, so every call takes the
//! identifiers of the identity-bearing ancestors, root first, and fails with
//! [`CanopyError::ArgumentCount`] before any I/O when the count is wrong.
//!
//! # Examples
//!
//! ## Root and child mirrors
//!
//! ```ignore
//! use canopy_axum_http::client::Client;
//!
//! let artists = Client::<Artist>::new("Artists", "http://127.0.0.1:8080", "artists")?;
//! let albums = artists.child::<Album>("Albums", "albums");
//!
//! let artist = artists.post(&Artist::named("Nina Simone"), &[]).await?;
//! let album = albums.post(&Album::titled("Pastel Blues"), &[artist.id()]).await?;
//! let listed = albums.list(&[artist.id()]).await?;
//! ```
//!
//! ## Editing requests
//!
//! ```ignore
//! let albums = albums.with_bearer_token("s3cret");
//! ```
//!
//! No request is ever retried; callers that want retries can wrap calls
//! themselves using [`CanopyError::is_retryable`].

use super::config::ClientConfig;
use super::subscription::EventStream;
use super::utils::{build_url, parse_address};
use crate::error::{CanopyError, Result};
use crate::protocol::{collection_template, concrete_segments, item_template, required_ids, PathLevel};
use crate::server::{NodeId, ResourceTree};
use crate::types::{ResponseCodes, Verb};
use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use url::Url;

/// Hook applied to every outgoing request, e.g. to add headers.
pub type RequestEditor = Arc<dyn Fn(RequestBuilder) -> RequestBuilder + Send + Sync>;

/// Status and body of a response that matched the expected status.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Undecoded body.
    pub body: Bytes,
}

impl RawResponse {
    /// Body as UTF-8 text.
    pub fn text(&self) -> Result<String> {
        Ok(String::from_utf8(self.body.to_vec())?)
    }

    /// Body decoded as JSON.
    pub fn json<B: DeserializeOwned>(&self) -> Result<B> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Client mirror of one resource node.
pub struct Client<T> {
    name: String,
    base: Url,
    segment: String,
    ancestors: Vec<PathLevel>,
    codes: ResponseCodes,
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    editors: Vec<RequestEditor>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            base: self.base.clone(),
            segment: self.segment.clone(),
            ancestors: self.ancestors.clone(),
            codes: self.codes,
            http: self.http.clone(),
            config: Arc::clone(&self.config),
            editors: self.editors.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name)
            .field("base", &self.base.as_str())
            .field("path", &self.path_template())
            .finish()
    }
}

impl<T> Client<T> {
    /// Mirror of a root node served at `address`.
    pub fn new(name: impl Into<String>, address: &str, segment: impl Into<String>) -> Result<Self> {
        Self::with_config(name, address, segment, ClientConfig::default())
    }

    /// Mirror of a root node with explicit client settings.
    pub fn with_config(
        name: impl Into<String>,
        address: &str,
        segment: impl Into<String>,
        config: ClientConfig,
    ) -> Result<Self> {
        let http = config.build_http()?;
        Ok(Self::from_parts(
            name.into(),
            parse_address(address)?,
            segment.into(),
            Vec::new(),
            ResponseCodes::default(),
            http,
            Arc::new(config),
        ))
    }

    pub(crate) fn from_parts(
        name: String,
        base: Url,
        segment: String,
        ancestors: Vec<PathLevel>,
        codes: ResponseCodes,
        http: reqwest::Client,
        config: Arc<ClientConfig>,
    ) -> Self {
        Self {
            name,
            base,
            segment,
            ancestors,
            codes,
            http,
            config,
            editors: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Mirror of node `id` of `tree`, with paths and codes taken from the node.
    pub(crate) fn from_node(
        tree: &ResourceTree,
        id: NodeId,
        address: &str,
        config: ClientConfig,
    ) -> Result<Self> {
        let node = tree.node(id)?;
        let http = config.build_http()?;
        Ok(Self::from_parts(
            node.name().to_string(),
            parse_address(address)?,
            node.segment().to_string(),
            tree.path_levels(id)?,
            node.response_codes().unwrap_or_default(),
            http,
            Arc::new(config),
        ))
    }

    /// Mirror of a child resource mounted at `segment` below this node's items.
    ///
    /// The ancestor chain is copied, so later changes to `self` do not affect the child.
    pub fn child<C>(&self, name: impl Into<String>, segment: impl Into<String>) -> Client<C> {
        let mut ancestors = self.ancestors.clone();
        ancestors.push(PathLevel::resource(&self.segment));
        Client {
            name: name.into(),
            base: self.base.clone(),
            segment: segment.into(),
            ancestors,
            codes: ResponseCodes::default(),
            http: self.http.clone(),
            config: Arc::clone(&self.config),
            editors: self.editors.clone(),
            _marker: PhantomData,
        }
    }

    /// The same mirror, decoding bodies as untyped JSON.
    pub fn erased(&self) -> Client<serde_json::Value> {
        Client {
            name: self.name.clone(),
            base: self.base.clone(),
            segment: self.segment.clone(),
            ancestors: self.ancestors.clone(),
            codes: self.codes,
            http: self.http.clone(),
            config: Arc::clone(&self.config),
            editors: self.editors.clone(),
            _marker: PhantomData,
        }
    }

    /// Expect these success codes instead of the defaults.
    pub fn with_response_codes(mut self, codes: ResponseCodes) -> Self {
        self.codes = codes;
        self
    }

    /// Apply `editor` to every request this mirror sends.
    pub fn with_request_editor(
        mut self,
        editor: impl Fn(RequestBuilder) -> RequestBuilder + Send + Sync + 'static,
    ) -> Self {
        self.editors.push(Arc::new(editor));
        self
    }

    pub(crate) fn push_editor(&mut self, editor: RequestEditor) {
        self.editors.push(editor);
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_bearer_token(self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.with_request_editor(move |req| req.bearer_auth(&token))
    }

    /// Node name this client mirrors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Own path segment.
    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Path levels of the ancestor chain, root first.
    pub fn ancestors(&self) -> &[PathLevel] {
        &self.ancestors
    }

    /// Server address every URL is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Number of ancestor identifiers every call takes.
    pub fn required_ids(&self) -> usize {
        required_ids(&self.ancestors)
    }

    /// Collection route pattern, identical to the server's.
    pub fn path_template(&self) -> String {
        collection_template(&self.ancestors, &self.segment)
    }

    /// Item route pattern, identical to the server's.
    pub fn item_path_template(&self) -> String {
        item_template(&self.ancestors, &self.segment)
    }

    /// Concrete URL of the collection, or of item `id`.
    pub fn url(&self, parents: &[&str], id: Option<&str>) -> Result<Url> {
        let segments = concrete_segments(&self.ancestors, &self.segment, parents, id)?;
        build_url(&self.base, &segments)
    }

    fn prepare(&self, mut req: RequestBuilder) -> RequestBuilder {
        for editor in &self.editors {
            req = editor(req);
        }
        req
    }

    /// Send one verb and check the response status against the expected code.
    pub async fn send_raw(
        &self,
        verb: Verb,
        id: Option<&str>,
        parents: &[&str],
        body: Option<Vec<u8>>,
        query: &[(String, String)],
    ) -> Result<RawResponse> {
        match (verb.is_item(), id) {
            (true, None) => {
                return Err(CanopyError::Usage(format!("{verb} needs an item id")));
            }
            (false, Some(_)) => {
                return Err(CanopyError::Usage(format!("{verb} does not take an item id")));
            }
            _ => {}
        }
        let url = self.url(parents, id)?;

        let mut req = self
            .http
            .request(verb.method(), url.clone())
            .header(ACCEPT, "application/json");
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "application/json").body(body);
        }
        let res = self.prepare(req).send().await?;

        let status = res.status().as_u16();
        if self.config.enable_logging {
            tracing::debug!(node = %self.name, %verb, %url, status, "request completed");
        }
        let body = res.bytes().await?;

        let expected = self.codes.for_verb(verb).as_u16();
        if status != expected {
            return Err(CanopyError::UnexpectedStatus {
                expected,
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(RawResponse { status, body })
    }

    /// Open the event stream served at `<collection><pattern>`.
    pub async fn events(&self, pattern: &str, parents: &[&str]) -> Result<EventStream> {
        let mut segments = concrete_segments(&self.ancestors, &self.segment, parents, None)?;
        segments.extend(
            pattern
                .split('/')
                .filter(|part| !part.is_empty())
                .map(str::to_string),
        );
        let url = build_url(&self.base, &segments)?;

        let http = self.config.build_streaming_http()?;
        let req = http
            .get(url.clone())
            .header(ACCEPT, crate::protocol::sse::CONTENT_TYPE);
        let res = self.prepare(req).send().await?;

        let status = res.status().as_u16();
        if status != 200 {
            let body = res.text().await?;
            return Err(CanopyError::UnexpectedStatus {
                expected: 200,
                status,
                body,
            });
        }
        tracing::debug!(node = %self.name, %url, "event stream opened");
        Ok(EventStream::spawn(res))
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Option<Vec<u8>>> {
    Ok(Some(serde_json::to_vec(body)?))
}

impl<T: Serialize + DeserializeOwned> Client<T> {
    /// List the collection under `parents`.
    pub async fn list(&self, parents: &[&str]) -> Result<Vec<T>> {
        self.list_with_query(parents, &[]).await
    }

    /// List with query parameters, e.g. `end_dated=true`.
    pub async fn list_with_query(
        &self,
        parents: &[&str],
        query: &[(String, String)],
    ) -> Result<Vec<T>> {
        self.send_raw(Verb::List, None, parents, None, query)
            .await?
            .json()
    }

    /// Fetch item `id`.
    pub async fn get(&self, id: &str, parents: &[&str]) -> Result<T> {
        self.send_raw(Verb::Get, Some(id), parents, None, &[])
            .await?
            .json()
    }

    /// Create an item; the server assigns its id.
    pub async fn post(&self, item: &T, parents: &[&str]) -> Result<T> {
        self.send_raw(Verb::Create, None, parents, encode(item)?, &[])
            .await?
            .json()
    }

    /// Replace item `id`. `None` when the node answers without a body.
    pub async fn put(&self, id: &str, item: &T, parents: &[&str]) -> Result<Option<T>> {
        let res = self
            .send_raw(Verb::Put, Some(id), parents, encode(item)?, &[])
            .await?;
        if res.body.is_empty() {
            return Ok(None);
        }
        res.json().map(Some)
    }

    /// Partially update item `id`.
    pub async fn patch<P: Serialize + ?Sized>(
        &self,
        id: &str,
        patch: &P,
        parents: &[&str],
    ) -> Result<T> {
        self.send_raw(Verb::Patch, Some(id), parents, encode(patch)?, &[])
            .await?
            .json()
    }

    /// Delete item `id`. End-dated types need two calls to remove it.
    pub async fn delete(&self, id: &str, parents: &[&str]) -> Result<()> {
        self.send_raw(Verb::Delete, Some(id), parents, None, &[])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Album {
        #[serde(default)]
        id: String,
        title: String,
    }

    fn albums(address: &str) -> Client<Album> {
        Client::<serde_json::Value>::new("Artists", address, "artists")
            .unwrap()
            .child("Albums", "albums")
    }

    #[test]
    fn test_child_copies_ancestors() {
        let albums = albums("http://localhost:1");
        assert_eq!(albums.path_template(), "/artists/{id0}/albums");
        assert_eq!(albums.item_path_template(), "/artists/{id0}/albums/{id1}");
        assert_eq!(albums.required_ids(), 1);
        assert_eq!(
            albums.url(&["a1"], Some("b1")).unwrap().as_str(),
            "http://localhost:1/artists/a1/albums/b1"
        );
    }

    #[tokio::test]
    async fn test_wrong_ancestor_count_fails_before_io() {
        let albums = albums("http://localhost:1");
        let err = albums.list(&[]).await.unwrap_err();
        assert!(matches!(err, CanopyError::ArgumentCount { expected: 1, got: 0 }));
        let err = albums.get("b1", &["a1", "extra"]).await.unwrap_err();
        assert!(matches!(err, CanopyError::ArgumentCount { expected: 1, got: 2 }));
    }

    #[tokio::test]
    async fn test_get_decodes_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/artists/a1/albums/b1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"b1","title":"Pastel Blues"}"#)
            .create_async()
            .await;

        let album = albums(&server.url()).get("b1", &["a1"]).await.unwrap();
        assert_eq!(album.title, "Pastel Blues");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unexpected_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/artists/a1/albums/nope")
            .with_status(404)
            .with_body(r#"{"status":"Resource not found."}"#)
            .create_async()
            .await;

        let err = albums(&server.url()).get("nope", &["a1"]).await.unwrap_err();
        match err {
            CanopyError::UnexpectedStatus {
                expected,
                status,
                body,
            } => {
                assert_eq!(expected, 200);
                assert_eq!(status, 404);
                assert!(body.contains("Resource not found."));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_event_stream_refusal_carries_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/artists/a1/albums/events")
            .with_status(503)
            .with_body("busy")
            .create_async()
            .await;

        match albums(&server.url()).events("/events", &["a1"]).await {
            Err(CanopyError::UnexpectedStatus { status, body, .. }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "busy");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_truncated_refusal_body_is_an_http_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 100\r\n\r\nbusy")
                .await;
        });

        match albums(&address).events("/events", &["a1"]).await {
            Err(CanopyError::Http(_)) => {}
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_request_editor_applies() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/artists/a1/albums/b1")
            .match_header("authorization", "Bearer s3cret")
            .with_status(204)
            .create_async()
            .await;

        albums(&server.url())
            .with_bearer_token("s3cret")
            .delete("b1", &["a1"])
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_without_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/artists/a1/albums/b1")
            .with_status(204)
            .create_async()
            .await;

        let client =
            albums(&server.url()).with_response_codes(ResponseCodes::default().with(
                Verb::Put,
                reqwest::StatusCode::NO_CONTENT,
            ));
        let album = Album {
            id: "b1".into(),
            title: "t".into(),
        };
        assert_eq!(client.put("b1", &album, &["a1"]).await.unwrap(), None);
    }
}
