//! Resolves the calling service account and its project.

use std::sync::Arc;

use tracing::debug;

use super::credentials::CredentialsFinder;
use super::metadata::MetadataClient;
use super::token_source::AccessTokenSource;
use crate::errors::{Error, Result};

/// Project placeholder accepted by IAM when the owning project is unknown
pub const WILDCARD_PROJECT: &str = "-";

/// Identity of the workload as seen by IAM
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    pub email: String,
    pub project: String,
    pub token_source: Arc<dyn AccessTokenSource>,
}

impl ResolvedIdentity {
    /// IAM resource name of the service account
    pub fn resource_name(&self) -> String {
        format!("projects/{}/serviceAccounts/{}", self.project, self.email)
    }
}

#[derive(Debug, Clone)]
pub struct IdentityResolver {
    finder: Arc<dyn CredentialsFinder>,
    metadata: MetadataClient,
}

impl IdentityResolver {
    pub fn new(finder: Arc<dyn CredentialsFinder>, metadata: MetadataClient) -> Self {
        Self { finder, metadata }
    }

    /// Find ambient credentials and the service account email they act as.
    ///
    /// The email comes from the credentials when they embed one, else from the
    /// metadata server. No retries.
    pub async fn resolve(&self) -> Result<ResolvedIdentity> {
        let credentials = self.finder.find().await.map_err(|e| {
            if matches!(e.root(), Error::CredentialsUnavailable { .. }) {
                e
            } else {
                Error::credentials_unavailable(e.to_string())
            }
        })?;

        let email = match credentials.client_email.filter(|e| !e.is_empty()) {
            Some(email) => email,
            None => {
                debug!(
                    address = %self.metadata.address(),
                    "credentials carry no email, asking metadata server"
                );
                self.metadata.service_account_email().await?
            }
        };

        let project = credentials.project_id.unwrap_or_else(|| WILDCARD_PROJECT.to_string());
        debug!(service_account = %email, project = %project, "resolved identity");

        Ok(ResolvedIdentity { email, project, token_source: credentials.token_source })
    }
}
