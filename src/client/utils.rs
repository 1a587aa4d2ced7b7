//! Helpers shared by the client mirrors and the CLI.
//!
//! This module provides helper functions for:
//! - Status code classification
//! - Joining path segments onto a base address
//! - Parsing `key=value&...` query strings given on the command line

use crate::error::{CanopyError, Result};
use url::Url;

/// Check if status code indicates retryable error
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 502 | 503 | 504)
}

/// Check if status code indicates access denied
pub fn is_access_denied_status(status: u16) -> bool {
    matches!(status, 401 | 403)
}

/// Parse a base address, accepting `host:port` without a scheme.
pub fn parse_address(address: &str) -> Result<Url> {
    let address = address.trim();
    if address.is_empty() {
        return Err(CanopyError::InvalidUrl("empty address".into()));
    }
    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    let url = Url::parse(&with_scheme)?;
    if url.cannot_be_a_base() {
        return Err(CanopyError::InvalidUrl(format!("{address} cannot be a base URL")));
    }
    Ok(url)
}

/// Append percent-encoded `segments` to the path of `base`.
pub fn build_url(base: &Url, segments: &[String]) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| CanopyError::InvalidUrl(base.to_string()))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

/// Parse `a=1&b=2` into pairs. Pairs without `=` get an empty value.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
