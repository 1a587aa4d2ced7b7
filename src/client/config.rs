//! Client configuration.

use std::time::Duration;

/// Settings shared by every client mirror built from one tree.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout in milliseconds; `0` disables it.
    pub request_timeout_ms: u64,
    /// Idle connections kept per host.
    pub pool_max_idle_per_host: usize,
    /// Proxy for all requests; empty for none.
    pub proxy_url: String,
    /// Log every request and response status at `debug`.
    pub enable_logging: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            pool_max_idle_per_host: 32,
            proxy_url: String::new(),
            enable_logging: true,
        }
    }
}

impl ClientConfig {
    /// Build the underlying `reqwest` client.
    pub fn build_http(&self) -> crate::error::Result<reqwest::Client> {
        self.build(true)
    }

    /// Build a client for long-lived event streams: no overall request timeout.
    pub fn build_streaming_http(&self) -> crate::error::Result<reqwest::Client> {
        self.build(false)
    }

    fn build(&self, with_timeout: bool) -> crate::error::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(self.pool_max_idle_per_host);
        if with_timeout && self.request_timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(self.request_timeout_ms));
        } else if self.request_timeout_ms > 0 {
            builder = builder.connect_timeout(Duration::from_millis(self.request_timeout_ms));
        }
        if !self.proxy_url.is_empty() {
            builder = builder.proxy(reqwest::Proxy::all(&self.proxy_url)?);
        }
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout_ms, 30_000);
        assert!(config.build_http().is_ok());
        assert!(config.build_streaming_http().is_ok());
    }
}
