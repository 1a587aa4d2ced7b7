//! Middleware plumbing for resource nodes.
//!
//! Middleware are plain async functions `(Request, Next) -> Response`, boxed
//! into a [`Middleware`] so nodes can store them without generics. The same
//! shape is accepted by [`axum::middleware::from_fn`], which is how the tree
//! installs them.
//!
//! # Usage
//!
//! ```ignore
//! use canopy_axum_http::server::{require_bearer_token, Api};
//!
//! let albums = Api::<Album>::new("Albums", "albums")
//!     .with_middleware(require_bearer_token("s3cret"));
//! ```
//!
//! # Item loading
//!
//! Every resource node wraps its custom item routes and its children in
//! [`item_loader`]. The loader fetches the addressed item (404 when it is
//! missing or filed under another parent) and inserts it into the request
//! extensions, where handlers pick it up with `Extension<T>`.

use super::handlers::{NodeShared, PathIds};
use crate::error::ApiError;
use crate::types::Resource;
use axum::extract::{FromRequestParts, Request};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Type-erased async middleware, compatible with [`axum::middleware::from_fn`].
pub type Middleware = Arc<dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync>;

/// Box an async `(Request, Next) -> Response` function as a [`Middleware`].
pub fn middleware_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req, next| Box::pin(f(req, next)))
}

/// Load the item addressed by the request path and expose it as `Extension<T>`.
pub(crate) fn item_loader<T: Resource>(node: Arc<NodeShared<T>>) -> Middleware {
    middleware_fn(move |req: Request, next: Next| {
        let node = Arc::clone(&node);
        async move {
            let (mut parts, body) = req.into_parts();
            let ids = match PathIds::from_request_parts(&mut parts, &()).await {
                Ok(ids) => ids,
                Err(err) => return err.into_response(),
            };
            let item = match node.load(&ids).await {
                Ok(item) => item,
                Err(err) => return err.into_response(),
            };
            parts.extensions.insert(item);
            next.run(Request::from_parts(parts, body)).await
        }
    })
}

/// Reject requests whose `Authorization` header is not `Bearer <token>`.
///
/// Rejections answer 403 with the standard status body.
pub fn require_bearer_token(token: impl Into<String>) -> Middleware {
    let expected = Arc::new(format!("Bearer {}", token.into()));
    middleware_fn(move |req: Request, next: Next| {
        let expected = Arc::clone(&expected);
        async move {
            let authorized = req
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value == expected.as_str());
            if !authorized {
                tracing::debug!(path = %req.uri().path(), "rejected unauthorized request");
                return ApiError::forbidden("missing or invalid bearer token").into_response();
            }
            next.run(req).await
        }
    })
}
