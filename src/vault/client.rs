//! HTTP client for the secrets server.
//!
//! Covers only the calls the broker makes: logical read, logical write,
//! raw POST for versioned writes, and token self-lookup. Failures are
//! returned immediately; this layer never retries.

use reqwest::{Method, Response, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::types::{ErrorResponse, VaultSecret};
use crate::errors::{Error, Result};
use crate::secrets::SecretString;
use crate::utils::{join_url, truncate_body};

const TOKEN_HEADER: &str = "X-Vault-Token";
const LOOKUP_SELF_PATH: &str = "auth/token/lookup-self";

/// Secrets server client bound to one address and, once logged in, one token
#[derive(Clone)]
pub struct VaultClient {
    http: reqwest::Client,
    address: String,
    token: Option<SecretString>,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("address", &self.address)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl VaultClient {
    /// Creates an unauthenticated client for the given address
    pub fn new(address: &str, http: reqwest::Client) -> Result<Self> {
        let parsed = url::Url::parse(address)
            .map_err(|e| Error::config(format!("Invalid Vault address '{}': {}", address, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(format!("Unsupported Vault address scheme: {}", address)));
        }

        Ok(Self { http, address: address.trim_end_matches('/').to_string(), token: None })
    }

    /// Assign the token sent with every subsequent request
    pub fn set_token(&mut self, token: impl Into<SecretString>) {
        self.token = Some(token.into());
    }

    /// The token currently assigned, if any
    pub fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    /// Address of the secrets server
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Read the secret at `path`.
    ///
    /// A 404 without data or warnings is `Ok(None)`, as is an empty body.
    pub async fn read(&self, path: &str) -> Result<Option<VaultSecret>> {
        let response = self.request(Method::GET, path, None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await?;
            let secret: VaultSecret = serde_json::from_str(&body).unwrap_or_default();
            if secret.has_data() || !secret.warnings().is_empty() {
                return Ok(Some(secret));
            }
            return Ok(None);
        }

        Self::parse(path, response).await
    }

    /// Write `body` to `path` (PUT)
    pub async fn write(&self, path: &str, body: &Value) -> Result<Option<VaultSecret>> {
        let response = self.request(Method::PUT, path, Some(body)).await?;
        Self::parse(path, response).await
    }

    /// POST `body` to `path` as-is
    pub async fn raw_post(&self, path: &str, body: &Value) -> Result<Option<VaultSecret>> {
        let response = self.request(Method::POST, path, Some(body)).await?;
        Self::parse(path, response).await
    }

    /// Look up the assigned token
    pub async fn lookup_self(&self) -> Result<VaultSecret> {
        let response = self.request(Method::GET, LOOKUP_SELF_PATH, None).await?;
        Self::parse(LOOKUP_SELF_PATH, response)
            .await?
            .ok_or_else(|| {
                Error::vault(StatusCode::NO_CONTENT.as_u16(), "empty token lookup response")
            })
    }

    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
        let url = join_url(&self.address, &format!("v1/{}", path.trim_start_matches('/')));
        debug!(method = %method, path = %path, "Sending Vault request");

        let mut request = self.http.request(method, &url);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token.expose_secret());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        Ok(request.send().await?)
    }

    async fn parse(path: &str, response: Response) -> Result<Option<VaultSecret>> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let parsed: ErrorResponse = serde_json::from_str(&body).unwrap_or_default();
            let message = match parsed.errors {
                Some(errors) if !errors.is_empty() => errors.join(", "),
                _ => truncate_body(&body, 200),
            };
            debug!(path = %path, status = status.as_u16(), "Vault request failed");
            return Err(Error::vault(status.as_u16(), message));
        }

        if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&body)?))
    }
}
