//! Key-value (Redis) token cache.
//!
//! A connection is opened per operation and dropped afterwards; no pool
//! outlives the call. The connect is bounded by the configured dial timeout.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::debug;

use super::{Token, TokenCache};
use crate::errors::{Error, Result};

const BACKEND: &str = "redis";

#[derive(Debug, Clone)]
pub struct KeyValueTokenCache {
    address: String,
    key: String,
    dial_timeout: Duration,
}

impl KeyValueTokenCache {
    /// `address` is `host:port` or a full `redis://` URL
    pub fn new(address: &str, key: &str, dial_timeout: Duration) -> Self {
        Self { address: address.to_string(), key: key.to_string(), dial_timeout }
    }

    fn connection_url(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("redis://{}", self.address)
        }
    }

    async fn connect(&self) -> Result<MultiplexedConnection> {
        let client = redis::Client::open(self.connection_url())
            .map_err(|e| unavailable(format!("invalid address '{}': {}", self.address, e)))?;

        let dial = client.get_multiplexed_async_connection();
        match tokio::time::timeout(self.dial_timeout, dial).await {
            Ok(Ok(connection)) => Ok(connection),
            Ok(Err(e)) => Err(unavailable(format!("connect to {} failed: {}", self.address, e))),
            Err(_) => Err(unavailable(format!(
                "connect to {} timed out after {:?}",
                self.address, self.dial_timeout
            ))),
        }
    }
}

#[async_trait]
impl TokenCache for KeyValueTokenCache {
    async fn get_token(&self) -> Result<Option<Token>> {
        let mut connection = self.connect().await?;
        let value: Option<String> = connection
            .get(&self.key)
            .await
            .map_err(|e| unavailable(format!("GET {} failed: {}", self.key, e)))?;

        match value {
            None => {
                debug!(key = %self.key, "no cached token key");
                Ok(None)
            }
            Some(raw) => Token::from_bytes(raw.as_bytes())
                .map(Some)
                .map_err(|e| unavailable(format!("corrupt cached token: {}", e))),
        }
    }

    async fn save_token(&self, token: &Token) -> Result<()> {
        let payload = token.to_bytes()?;
        let mut connection = self.connect().await?;
        connection
            .set::<_, _, ()>(&self.key, payload)
            .await
            .map_err(|e| unavailable(format!("SET {} failed: {}", self.key, e)))?;

        debug!(key = %self.key, "cached token written");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

fn unavailable(message: String) -> Error {
    Error::cache_unavailable(BACKEND, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_connection_url() {
        let cache = KeyValueTokenCache::new("10.0.0.5:6379", "token-cache", Duration::from_secs(1));
        assert_eq!(cache.connection_url(), "redis://10.0.0.5:6379");

        let cache = KeyValueTokenCache::new("redis://:pw@host:6380/2", "k", Duration::from_secs(1));
        assert_eq!(cache.connection_url(), "redis://:pw@host:6380/2");
    }

    #[tokio::test]
    async fn test_unreachable_store_is_unavailable() {
        let cache = KeyValueTokenCache::new("127.0.0.1:1", "token-cache", Duration::from_secs(2));

        let err = cache.get_token().await.unwrap_err();
        assert!(matches!(err, Error::CacheUnavailable { backend: "redis", .. }));

        let err = cache.save_token(&Token::new("hvs.t", Utc::now())).await.unwrap_err();
        assert!(matches!(err, Error::CacheUnavailable { backend: "redis", .. }));
    }

    #[tokio::test]
    async fn test_invalid_address_is_unavailable() {
        let cache = KeyValueTokenCache::new("bogus://nowhere", "k", Duration::from_secs(1));
        let err = cache.get_token().await.unwrap_err();
        assert!(matches!(err, Error::CacheUnavailable { .. }));
    }
}
