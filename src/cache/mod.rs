//! # Token cache
//!
//! Persists the secrets server session token so a fleet of short-lived
//! instances can share one login. The authoritative copy lives in the
//! external store; nothing is kept in process memory between calls.
//!
//! A miss (`Ok(None)`) is a normal outcome. Backend failures are errors.

pub mod gcs;
pub mod memory;
pub mod policy;
pub mod redis_store;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CacheBackend, Config};
use crate::errors::Result;
use crate::identity::CredentialsFinder;
use crate::secrets::{serialize_exposed, SecretString};

pub use gcs::ObjectStoreTokenCache;
pub use memory::InMemoryTokenCache;
pub use policy::{is_revoked, FixedJitter, JitterSource, RefreshPolicy, SeededJitter};
pub use redis_store::KeyValueTokenCache;

/// Session token and its expiry, as persisted in the cache.
///
/// Serialized as `{"Token": "...", "Expires": "<RFC 3339>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Token {
    #[serde(serialize_with = "serialize_exposed")]
    pub token: SecretString,
    pub expires: DateTime<Utc>,
}

impl Token {
    pub fn new(token: impl Into<SecretString>, expires: DateTime<Utc>) -> Self {
        Self { token: token.into(), expires }
    }

    /// Serialized form written to the backing store
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Persistent store for the session token
#[async_trait]
pub trait TokenCache: Send + Sync + fmt::Debug {
    /// The stored token, or `None` when nothing is stored
    async fn get_token(&self) -> Result<Option<Token>>;

    /// Store `token`, replacing whatever was there
    async fn save_token(&self, token: &Token) -> Result<()>;

    /// Short backend name for logs and errors
    fn backend_name(&self) -> &'static str;
}

/// Build the cache backend selected by `config`, if any
pub fn from_config(
    config: &Config,
    http: reqwest::Client,
    credentials: Arc<dyn CredentialsFinder>,
) -> Result<Option<Arc<dyn TokenCache>>> {
    let cache: Arc<dyn TokenCache> = match config.cache_backend()? {
        None => return Ok(None),
        Some(CacheBackend::ObjectStore { bucket }) => Arc::new(ObjectStoreTokenCache::new(
            http,
            config.token_cache_gcs_address.as_deref(),
            &bucket,
            &config.token_cache_key_name,
            credentials,
        )),
        Some(CacheBackend::KeyValue { address }) => Arc::new(KeyValueTokenCache::new(
            &address,
            &config.token_cache_key_name,
            config.cache_timeout(),
        )),
    };
    Ok(Some(cache))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::identity::{AmbientCredentials, StaticTokenSource};
    use chrono::TimeZone;

    #[test]
    fn test_token_wire_format() {
        let expires = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let token = Token::new("hvs.cached", expires);

        let json: serde_json::Value = serde_json::from_slice(&token.to_bytes().unwrap()).unwrap();
        assert_eq!(json["Token"], "hvs.cached");
        assert_eq!(json["Expires"], "2024-05-01T12:30:00Z");
    }

    #[test]
    fn test_reads_entries_with_fractional_offsets() {
        let token = Token::from_bytes(
            br#"{"Token":"hvs.go","Expires":"2024-05-01T14:30:00.123456789+02:00"}"#,
        )
        .unwrap();
        assert_eq!(token.token.expose_secret(), "hvs.go");
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(token.expires.timestamp(), expected.timestamp());
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = Token::new("hvs.secret", Utc::now());
        assert!(!format!("{:?}", token).contains("hvs.secret"));
    }

    fn finder() -> Arc<dyn CredentialsFinder> {
        Arc::new(AmbientCredentials::new(Arc::new(StaticTokenSource::new("ya29.t"))))
    }

    #[test]
    fn test_from_config_selects_backend() {
        let mut config = Config::default();
        assert!(from_config(&config, reqwest::Client::new(), finder()).unwrap().is_none());

        config.token_cache_storage_gcs = Some("bucket".to_string());
        let cache = from_config(&config, reqwest::Client::new(), finder()).unwrap().unwrap();
        assert_eq!(cache.backend_name(), "gcs");

        config.token_cache_storage_gcs = None;
        config.token_cache_storage_redis = Some("127.0.0.1:6379".to_string());
        let cache = from_config(&config, reqwest::Client::new(), finder()).unwrap().unwrap();
        assert_eq!(cache.backend_name(), "redis");
    }

    #[test]
    fn test_from_config_rejects_two_backends() {
        let config = Config {
            token_cache_storage_gcs: Some("bucket".to_string()),
            token_cache_storage_redis: Some("127.0.0.1:6379".to_string()),
            ..Default::default()
        };
        let err = from_config(&config, reqwest::Client::new(), finder()).unwrap_err();
        assert!(matches!(err, Error::ConfigurationConflict { .. }));
    }
}
