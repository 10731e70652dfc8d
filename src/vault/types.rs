//! Response shapes of the secrets server's HTTP API.

use serde::Deserialize;
use std::time::Duration;

use crate::secrets::{SecretMap, SecretString};

/// Generic response envelope returned by reads, writes and logins
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VaultSecret {
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub lease_id: String,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default)]
    pub data: Option<SecretMap>,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
    #[serde(default)]
    pub auth: Option<SecretAuth>,
}

/// Auth block of a login response
#[derive(Debug, Clone, Deserialize)]
pub struct SecretAuth {
    pub client_token: SecretString,
    #[serde(default)]
    pub accessor: String,
    #[serde(default)]
    pub policies: Option<Vec<String>>,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
}

/// Error body of a non-success response
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub errors: Option<Vec<String>>,
}

impl VaultSecret {
    /// Whether the response carries any secret data
    pub fn has_data(&self) -> bool {
        self.data.as_ref().is_some_and(|d| !d.is_empty())
    }

    /// Warnings attached to the response, if any
    pub fn warnings(&self) -> &[String] {
        self.warnings.as_deref().unwrap_or_default()
    }

    /// Lifetime of the token carried by this response.
    ///
    /// Login responses carry it in the auth block; token lookups carry it as
    /// `data.ttl`.
    pub fn token_ttl(&self) -> Option<Duration> {
        if let Some(auth) = &self.auth {
            return Some(Duration::from_secs(auth.lease_duration));
        }
        self.data
            .as_ref()
            .and_then(|d| d.get("ttl"))
            .and_then(|ttl| ttl.as_u64())
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_login_response() {
        let secret: VaultSecret = serde_json::from_value(json!({
            "request_id": "a1",
            "lease_duration": 0,
            "data": null,
            "warnings": null,
            "auth": {
                "client_token": "hvs.abc",
                "accessor": "acc",
                "policies": ["default", "my-service"],
                "lease_duration": 2764800,
                "renewable": true
            }
        }))
        .unwrap();

        let auth = secret.auth.as_ref().unwrap();
        assert_eq!(auth.client_token.expose_secret(), "hvs.abc");
        assert_eq!(secret.token_ttl(), Some(Duration::from_secs(2764800)));
        assert!(!secret.has_data());
        assert!(secret.warnings().is_empty());
    }

    #[test]
    fn test_ttl_from_lookup_data() {
        let secret: VaultSecret =
            serde_json::from_value(json!({"data": {"ttl": 120, "policies": ["default"]}}))
                .unwrap();
        assert_eq!(secret.token_ttl(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_null_policies_accepted() {
        let secret: VaultSecret =
            serde_json::from_value(json!({"auth": {"client_token": "t", "policies": null}}))
                .unwrap();
        assert!(secret.auth.unwrap().policies.is_none());
    }
}
