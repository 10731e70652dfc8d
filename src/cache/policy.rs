//! When a cached token may be reused.
//!
//! A token is refreshed once `now + threshold - jitter > expires`, where the
//! jitter is drawn uniformly from `[0, random_offset)`. Jitter only ever moves
//! the refresh earlier, which spreads refreshes across a fleet sharing one
//! cache. It is a heuristic: nothing stops two instances from refreshing at
//! once, and both writes are valid.
//!
//! The lead `threshold - jitter` never drops below zero, so a token past its
//! expiry is always refreshed.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use super::Token;
use crate::config::{Config, RevocationCheck};
use crate::vault::VaultClient;

/// Source of the random offset subtracted from the refresh deadline
pub trait JitterSource: Send + Sync + fmt::Debug {
    /// An offset in `[0, max)`; zero when `max` is zero
    fn offset(&self, max: Duration) -> Duration;
}

/// Uniform jitter from a locally owned generator
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    pub fn from_entropy() -> Self {
        Self { rng: Mutex::new(StdRng::from_entropy()) }
    }

    /// Deterministic sequence, for tests
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl Default for SeededJitter {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl JitterSource for SeededJitter {
    fn offset(&self, max: Duration) -> Duration {
        let max_nanos = u64::try_from(max.as_nanos()).unwrap_or(u64::MAX);
        if max_nanos == 0 {
            return Duration::ZERO;
        }
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Duration::from_nanos(rng.gen_range(0..max_nanos))
    }
}

/// Always the same offset, capped below `max`
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedJitter(pub Duration);

impl JitterSource for FixedJitter {
    fn offset(&self, max: Duration) -> Duration {
        if max.is_zero() {
            return Duration::ZERO;
        }
        self.0.min(max.saturating_sub(Duration::from_nanos(1)))
    }
}

/// Expiry and revocation rules for cached tokens
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    threshold: Duration,
    random_offset: Duration,
    jitter: Arc<dyn JitterSource>,
    revocation_check: RevocationCheck,
    revocation_window: Duration,
}

impl RefreshPolicy {
    pub fn new(
        threshold: Duration,
        random_offset: Duration,
        jitter: Arc<dyn JitterSource>,
    ) -> Self {
        Self {
            threshold,
            random_offset,
            jitter,
            revocation_check: RevocationCheck::Never,
            revocation_window: Duration::ZERO,
        }
    }

    pub fn from_config(config: &Config, jitter: Arc<dyn JitterSource>) -> Self {
        Self::new(config.refresh_threshold(), config.random_offset(), jitter)
            .with_revocation_check(config.revocation_check, config.revocation_window())
    }

    pub fn with_revocation_check(mut self, check: RevocationCheck, window: Duration) -> Self {
        self.revocation_check = check;
        self.revocation_window = window;
        self
    }

    /// Whether `token` is too close to expiry to reuse at `now`
    pub fn is_expired(&self, token: &Token, now: DateTime<Utc>) -> bool {
        let offset = self.jitter.offset(self.random_offset);
        let lead = (to_chrono(self.threshold) - to_chrono(offset)).max(ChronoDuration::zero());

        match now.checked_add_signed(lead) {
            Some(refresh_at) => {
                let expired = refresh_at > token.expires;
                if expired {
                    debug!(
                        expires = %token.expires,
                        refresh_at = %refresh_at,
                        "cached token due for refresh"
                    );
                }
                expired
            }
            None => true,
        }
    }

    /// Whether the configured revocation policy asks for a lookup of `token`
    pub fn should_check_revocation(&self, token: &Token, now: DateTime<Utc>) -> bool {
        match self.revocation_check {
            RevocationCheck::Never => false,
            RevocationCheck::Always => true,
            RevocationCheck::NearExpiry => token.expires - now <= to_chrono(self.revocation_window),
        }
    }
}

/// Look up the client's token; any failure counts as revoked
pub async fn is_revoked(client: &VaultClient) -> bool {
    match client.lookup_self().await {
        Ok(_) => false,
        Err(e) => {
            warn!(error = %e, "cached token failed lookup, treating as revoked");
            true
        }
    }
}

fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX)
}
