//! Compute metadata server lookups.

use std::time::Duration;

use tracing::debug;

use crate::errors::{Error, Result};
use crate::utils::join_url;

/// Default address of the compute metadata server
pub const DEFAULT_METADATA_ADDRESS: &str = "http://metadata.google.internal";

const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";

const EMAIL_PATH: &str = "computeMetadata/v1/instance/service-accounts/default/email";
const TOKEN_PATH: &str = "computeMetadata/v1/instance/service-accounts/default/token";
const PROJECT_PATH: &str = "computeMetadata/v1/project/project-id";

/// Timeout for the availability check against the metadata server
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for the instance metadata server
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    address: String,
}

impl MetadataClient {
    pub fn new(http: reqwest::Client, address: Option<&str>) -> Self {
        Self {
            http,
            address: address.unwrap_or(DEFAULT_METADATA_ADDRESS).trim_end_matches('/').to_string(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Email of the instance's default service account.
    ///
    /// Requires a 200 status and a non-empty body.
    pub async fn service_account_email(&self) -> Result<String> {
        let email = self
            .get_text(EMAIL_PATH)
            .await
            .map_err(|e| {
                Error::identity_unavailable(format!("metadata email lookup failed: {}", e))
            })?;
        if email.is_empty() {
            return Err(Error::identity_unavailable("metadata server returned an empty email"));
        }
        Ok(email)
    }

    /// Project the instance runs in
    pub async fn project_id(&self) -> Result<String> {
        self.get_text(PROJECT_PATH).await
    }

    /// Token endpoint for the default service account
    pub fn token_url(&self) -> String {
        join_url(&self.address, TOKEN_PATH)
    }

    /// Whether a metadata server answers at the configured address
    pub async fn is_available(&self) -> bool {
        let url = join_url(&self.address, "");
        let result = self
            .http
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .timeout(AVAILABILITY_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) => response
                .headers()
                .get(METADATA_FLAVOR_HEADER)
                .is_some_and(|v| v.as_bytes() == METADATA_FLAVOR.as_bytes()),
            Err(e) => {
                debug!(error = %e, "metadata server unreachable");
                false
            }
        }
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = join_url(&self.address, path);
        debug!(path = %path, "querying metadata server");

        let response =
            self.http.get(&url).header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != reqwest::StatusCode::OK {
            return Err(Error::identity_unavailable(format!(
                "metadata server returned {} for {}",
                status, path
            )));
        }

        Ok(body.trim().to_string())
    }
}
