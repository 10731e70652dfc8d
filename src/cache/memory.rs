//! In-process token cache for tests and single-instance deployments.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Token, TokenCache};
use crate::errors::Result;

#[derive(Debug, Default)]
pub struct InMemoryTokenCache {
    token: RwLock<Option<Token>>,
    writes: AtomicUsize,
}

impl InMemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache pre-populated with `token`; does not count as a write
    pub fn with_token(token: Token) -> Self {
        Self { token: RwLock::new(Some(token)), writes: AtomicUsize::new(0) }
    }

    /// Number of successful `save_token` calls
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current contents without going through the trait
    pub async fn current(&self) -> Option<Token> {
        self.token.read().await.clone()
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn get_token(&self) -> Result<Option<Token>> {
        Ok(self.token.read().await.clone())
    }

    async fn save_token(&self, token: &Token) -> Result<()> {
        *self.token.write().await = Some(token.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
