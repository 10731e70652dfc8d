//! Fetch-once access to a service's secrets.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::CredentialBroker;
use crate::errors::Result;
use crate::secrets::SecretMap;

/// Runs the authenticate-and-fetch sequence at most once per instance.
///
/// A failed fetch is not remembered; the next call tries again. The teller
/// can be shared behind an `Arc`; concurrent first calls wait for a single
/// fetch.
#[derive(Debug)]
pub struct SecretsTeller {
    broker: CredentialBroker,
    versioned: bool,
    secrets: RwLock<Option<Arc<SecretMap>>>,
}

impl SecretsTeller {
    pub fn new(broker: CredentialBroker) -> Self {
        Self { broker, versioned: false, secrets: RwLock::new(None) }
    }

    /// Teller for secrets stored with versioning
    pub fn versioned(broker: CredentialBroker) -> Self {
        Self { versioned: true, ..Self::new(broker) }
    }

    /// The secrets, fetched on first use
    pub async fn secrets(&self) -> Result<Arc<SecretMap>> {
        if let Some(secrets) = self.secrets.read().await.as_ref() {
            return Ok(secrets.clone());
        }

        let mut slot = self.secrets.write().await;
        if let Some(secrets) = slot.as_ref() {
            return Ok(secrets.clone());
        }

        debug!(secret_path = %self.broker.config().secret_path, "fetching secrets");
        let fetched = if self.versioned {
            self.broker.get_versioned_secrets().await?
        } else {
            self.broker.get_secrets().await?
        };
        let fetched = Arc::new(fetched);
        *slot = Some(fetched.clone());
        Ok(fetched)
    }

    /// Forget the fetched secrets so the next call fetches again
    pub async fn invalidate(&self) {
        self.secrets.write().await.take();
    }
}
