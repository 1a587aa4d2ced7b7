//! Path templates shared by the route composition engine and client mirrors.
//!
//! Both sides describe a node's position with the same list of [`PathLevel`]s
//! (one per ancestor, root first) and render it through the functions in this
//! module, so a route and its mirrored client cannot disagree on shape.
//!
//! # Path Shape
//!
//! | Node | Collection | Item |
//! |------|------------|------|
//! | root `artists` | `/artists` | `/artists/{id0}` |
//! | child `albums` | `/artists/{id0}/albums` | `/artists/{id0}/albums/{id1}` |
//! | child of grouping `/music` | `/music/artists` | `/music/artists/{id0}` |
//!
//! Identifier placeholders are numbered by identity-bearing depth; grouping
//! levels contribute a segment but no identifier.
//!
//! # Examples
//!
//! ```
//! use canopy_axum_http::protocol::{collection_template, item_template, PathLevel};
//!
//! let ancestors = vec![PathLevel::resource("artists")];
//! assert_eq!(collection_template(&ancestors, "albums"), "/artists/{id0}/albums");
//! assert_eq!(item_template(&ancestors, "albums"), "/artists/{id0}/albums/{id1}");
//! ```

use crate::error::{CanopyError, Result};
use std::sync::LazyLock;

static SEGMENT_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z0-9._~-]+$").expect("valid segment regex"));

/// One level of the ancestor chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathLevel {
    /// URL path fragment of the ancestor.
    pub segment: String,
    /// Whether the ancestor is addressed by an identifier below its segment.
    pub takes_id: bool,
}

impl PathLevel {
    /// A CRUD resource level (`/segment/{id}`).
    pub fn resource(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            takes_id: true,
        }
    }

    /// A pure grouping level (`/segment`).
    pub fn grouping(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            takes_id: false,
        }
    }
}

/// Name of the path parameter holding the identifier at `depth`.
#[inline]
pub fn id_param(depth: usize) -> String {
    format!("id{depth}")
}

/// Number of identifiers an ancestor chain requires.
pub fn required_ids(ancestors: &[PathLevel]) -> usize {
    ancestors.iter().filter(|level| level.takes_id).count()
}

/// Whether `segment` is usable as a URL path fragment.
pub fn is_valid_segment(segment: &str) -> bool {
    SEGMENT_RE.is_match(segment)
}

fn prefix_template(ancestors: &[PathLevel]) -> String {
    let mut path = String::new();
    let mut depth = 0;
    for level in ancestors {
        path.push('/');
        path.push_str(&level.segment);
        if level.takes_id {
            path.push_str(&format!("/{{{}}}", id_param(depth)));
            depth += 1;
        }
    }
    path
}

/// Route pattern of a node's collection endpoint.
pub fn collection_template(ancestors: &[PathLevel], segment: &str) -> String {
    format!("{}/{}", prefix_template(ancestors), segment)
}

/// Route pattern of a node's item endpoint.
pub fn item_template(ancestors: &[PathLevel], segment: &str) -> String {
    format!(
        "{}/{{{}}}",
        collection_template(ancestors, segment),
        id_param(required_ids(ancestors))
    )
}

/// Concrete path segments for a request.
///
/// Fails with [`CanopyError::ArgumentCount`] unless exactly one identifier per
/// identity-bearing ancestor is supplied; no segment list is produced in that case.
///
/// # Examples
///
/// ```
/// use canopy_axum_http::protocol::{concrete_segments, PathLevel};
///
/// let ancestors = vec![PathLevel::resource("artists")];
/// let segments = concrete_segments(&ancestors, "albums", &["a1"], Some("b2")).unwrap();
/// assert_eq!(segments, ["artists", "a1", "albums", "b2"]);
///
/// assert!(concrete_segments(&ancestors, "albums", &[], None).is_err());
/// ```
pub fn concrete_segments(
    ancestors: &[PathLevel],
    segment: &str,
    ancestor_ids: &[&str],
    id: Option<&str>,
) -> Result<Vec<String>> {
    let expected = required_ids(ancestors);
    if ancestor_ids.len() != expected {
        return Err(CanopyError::ArgumentCount {
            expected,
            got: ancestor_ids.len(),
        });
    }

    let mut ids = ancestor_ids.iter();
    let mut out = Vec::with_capacity(ancestors.len() * 2 + 2);
    for level in ancestors {
        out.push(level.segment.clone());
        if level.takes_id {
            if let Some(id) = ids.next() {
                out.push((*id).to_string());
            }
        }
    }
    out.push(segment.to_string());
    if let Some(id) = id {
        out.push(id.to_string());
    }
    Ok(out)
}
