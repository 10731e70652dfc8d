//! Object-store (Cloud Storage) token cache.
//!
//! Uses the JSON API directly: a media download for reads and a simple media
//! upload for writes. A missing object is a miss.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use super::{Token, TokenCache};
use crate::errors::{Error, Result};
use crate::identity::{AccessTokenSource, CredentialsFinder};
use crate::utils::truncate_body;

/// Default Cloud Storage endpoint
pub const DEFAULT_GCS_ADDRESS: &str = "https://storage.googleapis.com";

const BACKEND: &str = "gcs";

pub struct ObjectStoreTokenCache {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
    object: String,
    credentials: Arc<dyn CredentialsFinder>,
    token_source: OnceCell<Arc<dyn AccessTokenSource>>,
}

impl fmt::Debug for ObjectStoreTokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreTokenCache")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("object", &self.object)
            .finish()
    }
}

impl ObjectStoreTokenCache {
    pub fn new(
        http: reqwest::Client,
        endpoint: Option<&str>,
        bucket: &str,
        object: &str,
        credentials: Arc<dyn CredentialsFinder>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.unwrap_or(DEFAULT_GCS_ADDRESS).to_string(),
            bucket: bucket.to_string(),
            object: object.to_string(),
            credentials,
            token_source: OnceCell::new(),
        }
    }

    async fn bearer(&self) -> Result<String> {
        let source = self
            .token_source
            .get_or_try_init(|| async {
                self.credentials
                    .find()
                    .await
                    .map(|c| c.token_source)
                    .map_err(|e| unavailable(format!("no credentials for object store: {}", e)))
            })
            .await?;

        let token = source
            .access_token()
            .await
            .map_err(|e| unavailable(format!("no access token for object store: {}", e)))?;
        Ok(token.expose_secret().to_string())
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| unavailable(format!("invalid endpoint '{}': {}", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| unavailable(format!("endpoint '{}' cannot take a path", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn download_url(&self) -> Result<Url> {
        let mut url = self.url(&["storage", "v1", "b", &self.bucket, "o", &self.object])?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn upload_url(&self) -> Result<Url> {
        let mut url = self.url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        url.query_pairs_mut().append_pair("uploadType", "media").append_pair("name", &self.object);
        Ok(url)
    }
}

#[async_trait]
impl TokenCache for ObjectStoreTokenCache {
    async fn get_token(&self) -> Result<Option<Token>> {
        let url = self.download_url()?;
        let response = self
            .http
            .get(url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| unavailable(format!("read failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(bucket = %self.bucket, object = %self.object, "no cached token object");
            return Ok(None);
        }

        let body = response.bytes().await.map_err(|e| unavailable(format!("read failed: {}", e)))?;
        if !status.is_success() {
            return Err(unavailable(format!(
                "read returned {}: {}",
                status,
                truncate_body(&String::from_utf8_lossy(&body), 200)
            )));
        }

        Token::from_bytes(&body)
            .map(Some)
            .map_err(|e| unavailable(format!("corrupt cached token: {}", e)))
    }

    async fn save_token(&self, token: &Token) -> Result<()> {
        let url = self.upload_url()?;
        let response = self
            .http
            .post(url)
            .bearer_auth(self.bearer().await?)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(token.to_bytes()?)
            .send()
            .await
            .map_err(|e| unavailable(format!("write failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(format!(
                "write returned {}: {}",
                status,
                truncate_body(&body, 200)
            )));
        }

        debug!(bucket = %self.bucket, object = %self.object, "cached token written");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

fn unavailable(message: String) -> Error {
    Error::cache_unavailable(BACKEND, message)
}
