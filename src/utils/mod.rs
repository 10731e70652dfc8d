//! Utility functions and helpers

pub mod retry;

use std::time::Duration;

use crate::errors::{Error, Result};

/// Build the outbound HTTP client used when the caller does not inject one.
///
/// Idle connections are dropped after one second so short-lived functions do
/// not keep sockets to the metadata server open between invocations.
pub fn default_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(1))
        .build()
        .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))
}

/// Install the ring crypto provider for rustls unless one is already set.
///
/// Both ring and aws-lc-rs end up in the dependency graph, so rustls cannot
/// pick a process default on its own.
pub fn install_crypto_provider() {
    use rustls::crypto::{ring, CryptoProvider};

    if CryptoProvider::get_default().is_none() {
        // Losing the race to another installer is fine.
        let _ = ring::default_provider().install_default();
    }
}

/// Join a base address and a path with exactly one slash between them
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Trim a response body for inclusion in an error message
pub fn truncate_body(body: &str, max_len: usize) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= max_len {
        return trimmed.to_string();
    }
    let mut end = max_len;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}
