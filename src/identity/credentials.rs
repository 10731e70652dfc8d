//! Ambient application credentials.
//!
//! Discovery order: an explicitly configured file, then the
//! `GOOGLE_APPLICATION_CREDENTIALS` variable, then the gcloud well-known
//! file, then the compute metadata server.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};
use yup_oauth2::authorized_user::AuthorizedUserSecret;
use yup_oauth2::ServiceAccountKey;

use super::metadata::MetadataClient;
use super::token_source::{AccessTokenSource, OAuthTokenSource};
use crate::errors::{Error, Result};

/// Environment variable naming a credentials file
pub const CREDENTIALS_ENV_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";

const WELL_KNOWN_FILE: &str = "application_default_credentials.json";

const SERVICE_ACCOUNT: &str = "service_account";
const AUTHORIZED_USER: &str = "authorized_user";

/// The fields every credentials file shares, read before the typed parse
#[derive(Deserialize)]
struct FileHeader {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    quota_project_id: Option<String>,
}

/// Credentials found in the environment
#[derive(Debug, Clone)]
pub struct AmbientCredentials {
    /// Project the credentials belong to, when known
    pub project_id: Option<String>,
    /// Service account email embedded in the credentials, when present
    pub client_email: Option<String>,
    /// Source of OAuth access tokens for the identity
    pub token_source: Arc<dyn AccessTokenSource>,
}

impl AmbientCredentials {
    pub fn new(token_source: Arc<dyn AccessTokenSource>) -> Self {
        Self { project_id: None, client_email: None, token_source }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_client_email(mut self, email: impl Into<String>) -> Self {
        self.client_email = Some(email.into());
        self
    }

    /// Credentials backed by a service account key.
    ///
    /// The email and project come from the key itself.
    pub async fn from_service_account_key(key: ServiceAccountKey) -> Result<Self> {
        let project_id = key.project_id.clone().filter(|p| !p.is_empty());
        let client_email = Some(key.client_email.clone()).filter(|e| !e.is_empty());
        let source = OAuthTokenSource::service_account(key).await?;
        Ok(Self { project_id, client_email, token_source: Arc::new(source) })
    }

    /// Credentials for an end user; these never carry a service account email
    pub async fn from_authorized_user(
        secret: AuthorizedUserSecret,
        quota_project_id: Option<String>,
    ) -> Result<Self> {
        let source = OAuthTokenSource::authorized_user(secret).await?;
        Ok(Self {
            project_id: quota_project_id.filter(|p| !p.is_empty()),
            client_email: None,
            token_source: Arc::new(source),
        })
    }

    /// Parse a credentials file by its `type` field
    pub async fn from_json(contents: &str) -> Result<Self> {
        let header: FileHeader = serde_json::from_str(contents).map_err(|e| {
            Error::credentials_unavailable(format!("unsupported credentials file: {}", e))
        })?;

        match header.kind.as_str() {
            SERVICE_ACCOUNT => {
                let key: ServiceAccountKey = serde_json::from_str(contents).map_err(|e| {
                    Error::credentials_unavailable(format!("invalid service account key: {}", e))
                })?;
                Self::from_service_account_key(key).await
            }
            AUTHORIZED_USER => {
                let secret: AuthorizedUserSecret = serde_json::from_str(contents).map_err(|e| {
                    Error::credentials_unavailable(format!("invalid authorized user file: {}", e))
                })?;
                Self::from_authorized_user(secret, header.quota_project_id).await
            }
            other => Err(Error::credentials_unavailable(format!(
                "unsupported credentials type: {}",
                other
            ))),
        }
    }
}

/// Locates ambient credentials
#[async_trait]
pub trait CredentialsFinder: Send + Sync + fmt::Debug {
    async fn find(&self) -> Result<AmbientCredentials>;
}

/// Fixed credentials
#[async_trait]
impl CredentialsFinder for AmbientCredentials {
    async fn find(&self) -> Result<AmbientCredentials> {
        Ok(self.clone())
    }
}

/// Application-default credentials discovery
#[derive(Debug, Clone)]
pub struct DefaultCredentialsFinder {
    metadata: MetadataClient,
    explicit_path: Option<PathBuf>,
    search_well_known: bool,
}

impl DefaultCredentialsFinder {
    pub fn new(metadata: MetadataClient) -> Self {
        Self { metadata, explicit_path: None, search_well_known: true }
    }

    /// Read credentials from this file before anything else
    pub fn with_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    /// Ignore the environment variable and the gcloud well-known file
    pub fn skip_well_known_locations(mut self) -> Self {
        self.search_well_known = false;
        self
    }

    async fn load_file(&self, path: &Path) -> Result<AmbientCredentials> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::credentials_unavailable(format!(
                "cannot read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        info!(path = %path.display(), "using credentials file");
        AmbientCredentials::from_json(&contents).await
    }
}

#[async_trait]
impl CredentialsFinder for DefaultCredentialsFinder {
    async fn find(&self) -> Result<AmbientCredentials> {
        if let Some(path) = &self.explicit_path {
            return self.load_file(path).await;
        }

        if self.search_well_known {
            if let Some(path) = std::env::var_os(CREDENTIALS_ENV_VAR).filter(|v| !v.is_empty()) {
                return self.load_file(Path::new(&path)).await;
            }

            if let Some(path) = well_known_file().filter(|p| p.is_file()) {
                return self.load_file(&path).await;
            }
        }

        if self.metadata.is_available().await {
            debug!(address = %self.metadata.address(), "using compute metadata credentials");
            let source = OAuthTokenSource::application_default(self.metadata.token_url()).await?;
            let project_id = self.metadata.project_id().await.ok().filter(|p| !p.is_empty());
            return Ok(AmbientCredentials {
                project_id,
                client_email: None,
                token_source: Arc::new(source),
            });
        }

        Err(Error::credentials_unavailable("could not find default credentials"))
    }
}

/// Location of the gcloud application-default credentials file
pub fn well_known_file() -> Option<PathBuf> {
    let base = if cfg!(windows) {
        std::env::var_os("APPDATA").map(PathBuf::from)?
    } else {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))?
    };
    Some(base.join("gcloud").join(WELL_KNOWN_FILE))
}
