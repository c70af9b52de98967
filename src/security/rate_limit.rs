//! Per-identity rate limiting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::security::registry::{ClientRegistry, RateDecision, RatePolicy, RegistryFull};

/// Fixed-window limiter over the shared client registry.
///
/// The policy sits behind an `ArcSwap` so a config reload applies to the
/// next request of every session without locking.
#[derive(Debug)]
pub struct RateLimiter {
    registry: ClientRegistry,
    policy: ArcSwap<RatePolicy>,
}

impl RateLimiter {
    pub fn new(policy: RatePolicy, registry_capacity: usize) -> Self {
        Self {
            registry: ClientRegistry::new(registry_capacity),
            policy: ArcSwap::from_pointee(policy),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.policy(), config.registry_capacity)
    }

    /// Record one request from `identity` and decide whether it may proceed.
    pub fn check_and_record(&self, identity: &str, now: Instant) -> Result<RateDecision, RegistryFull> {
        let policy = self.policy.load();
        let decision = self.registry.check_and_record(identity, now, &policy)?;
        if let RateDecision::Limited { count } = decision {
            metrics::record_rate_limited();
            tracing::warn!(
                client = %identity,
                count,
                max_requests = policy.max_requests,
                "Rate limit exceeded"
            );
        }
        Ok(decision)
    }

    /// How long a limited identity waits before it is served again.
    pub fn cooldown(&self) -> Duration {
        self.policy.load().window
    }

    /// Open a fresh window once a cooldown has been served.
    pub fn end_cooldown(&self, identity: &str, now: Instant) {
        self.registry.restart_window(identity, now);
    }

    /// Drop all state for `identity`.
    pub fn forget(&self, identity: &str) -> bool {
        self.registry.clear(identity)
    }

    pub fn policy(&self) -> Arc<RatePolicy> {
        self.policy.load_full()
    }

    pub fn set_policy(&self, policy: RatePolicy) {
        let previous = self.policy.swap(Arc::new(policy));
        if *previous != policy {
            tracing::info!(
                max_requests = policy.max_requests,
                window_secs = policy.window.as_secs(),
                "Rate policy updated"
            );
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }
}
