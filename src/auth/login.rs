//! Exchange of a signed assertion for a secrets server session token.

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tracing::{info, instrument};

use crate::cache::Token;
use crate::errors::{Error, Result};
use crate::secrets::SecretString;
use crate::vault::VaultClient;

/// Logs in to the GCP auth method, or adopts a pre-issued local token
#[derive(Debug, Clone)]
pub struct SessionLogin {
    http: reqwest::Client,
    vault_address: String,
    auth_path: String,
    role: String,
}

impl SessionLogin {
    pub fn new(http: reqwest::Client, vault_address: &str, auth_path: &str, role: &str) -> Self {
        Self {
            http,
            vault_address: vault_address.to_string(),
            auth_path: auth_path.trim_matches('/').to_string(),
            role: role.to_string(),
        }
    }

    /// Unauthenticated client against the secrets server
    pub fn client(&self) -> Result<VaultClient> {
        VaultClient::new(&self.vault_address, self.http.clone())
    }

    /// Client carrying `token` as-is; no network calls
    pub fn local(&self, token: &SecretString) -> Result<VaultClient> {
        let mut client = self.client()?;
        client.set_token(token.clone());
        Ok(client)
    }

    /// Write `{role, jwt}` to `<auth_path>/login` and assign the issued token
    /// to `client`.
    ///
    /// The returned token expires the auth block's `lease_duration` seconds
    /// after the request was sent.
    #[instrument(skip(self, client, jwt), fields(role = %self.role, auth_path = %self.auth_path))]
    pub async fn exchange(&self, client: &mut VaultClient, jwt: &str) -> Result<Token> {
        let issued_at = Utc::now();
        let login_path = format!("{}/login", self.auth_path);

        let response = client
            .write(&login_path, &json!({ "role": self.role, "jwt": jwt }))
            .await
            .map_err(|e| Error::login_failed(e.to_string()))?;

        let secret = response.unwrap_or_default();
        let ttl = secret.token_ttl().unwrap_or_default();
        let auth = secret
            .auth
            .ok_or_else(|| Error::auth_response_invalid("no auth info returned"))?;
        if auth.client_token.is_empty() {
            return Err(Error::auth_response_invalid("empty client token"));
        }

        let expires = ChronoDuration::from_std(ttl)
            .ok()
            .and_then(|lease| issued_at.checked_add_signed(lease))
            .unwrap_or(issued_at);

        client.set_token(auth.client_token.clone());
        info!(expires = %expires, policies = ?auth.policies, "logged in to vault");

        Ok(Token { token: auth.client_token, expires })
    }
}
