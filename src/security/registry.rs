//! Capacity-bounded client registry.
//!
//! # Responsibilities
//! - Map a client identity to its rate-limit window
//! - Bound the number of tracked identities
//! - Make check-and-record one critical section per identity
//!
//! # Design Decisions
//! - Backed by `DashMap`; the entry API holds the shard lock for the whole
//!   window update
//! - Occupancy is reserved with a compare-exchange before insertion, so the
//!   bound holds across shards
//! - On exhaustion, entries whose window has already expired are swept first;
//!   they would be reset on their next request anyway

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;

use crate::observability::metrics;

/// Window parameters applied to every identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

/// Outcome of recording one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { count: u32 },
    Limited { count: u32 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// No room for a new identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("client registry full ({capacity} identities tracked)")]
pub struct RegistryFull {
    pub capacity: usize,
}

/// Rate-limit bookkeeping for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEntry {
    pub identity: String,
    pub window_start: Instant,
    pub request_count: u32,
}

impl ClientEntry {
    fn new(identity: &str, now: Instant) -> Self {
        Self {
            identity: identity.to_string(),
            window_start: now,
            request_count: 0,
        }
    }

    fn window_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) > window
    }

    fn reset(&mut self, now: Instant) {
        self.window_start = now;
        self.request_count = 0;
    }

    fn record(&mut self, now: Instant, policy: &RatePolicy) -> RateDecision {
        if self.window_expired(now, policy.window) {
            self.reset(now);
        }
        self.request_count = self.request_count.saturating_add(1);
        if self.request_count > policy.max_requests {
            RateDecision::Limited {
                count: self.request_count,
            }
        } else {
            RateDecision::Allowed {
                count: self.request_count,
            }
        }
    }
}

/// Shared identity table.
#[derive(Debug)]
pub struct ClientRegistry {
    entries: DashMap<String, ClientEntry>,
    occupied: AtomicUsize,
    capacity: usize,
}

impl ClientRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity),
            occupied: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Count one request from `identity` at `now` against `policy`.
    pub fn check_and_record(
        &self,
        identity: &str,
        now: Instant,
        policy: &RatePolicy,
    ) -> Result<RateDecision, RegistryFull> {
        if let Some(mut entry) = self.entries.get_mut(identity) {
            return Ok(entry.record(now, policy));
        }

        self.reserve_slot(now, policy.window)?;
        let decision = match self.entries.entry(identity.to_string()) {
            Entry::Occupied(mut existing) => {
                // Another session inserted this identity after our lookup.
                self.occupied.fetch_sub(1, Ordering::AcqRel);
                existing.get_mut().record(now, policy)
            }
            Entry::Vacant(vacant) => {
                let mut entry = ClientEntry::new(identity, now);
                let decision = entry.record(now, policy);
                vacant.insert(entry);
                decision
            }
        };
        metrics::set_registry_size(self.len());
        Ok(decision)
    }

    fn try_reserve(&self) -> bool {
        self.occupied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    fn reserve_slot(&self, now: Instant, window: Duration) -> Result<(), RegistryFull> {
        if self.try_reserve() {
            return Ok(());
        }
        let swept = self.sweep_expired(now, window);
        if swept > 0 {
            tracing::debug!(swept, "Swept expired registry entries");
        }
        if self.try_reserve() {
            Ok(())
        } else {
            Err(RegistryFull {
                capacity: self.capacity,
            })
        }
    }

    /// Drop every entry whose window has elapsed. Returns how many went.
    pub fn sweep_expired(&self, now: Instant, window: Duration) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.window_expired(now, window);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            self.occupied.fetch_sub(removed, Ordering::AcqRel);
            metrics::set_registry_size(self.len());
        }
        removed
    }

    /// Forget an identity. Returns true if it was tracked.
    pub fn clear(&self, identity: &str) -> bool {
        if self.entries.remove(identity).is_some() {
            self.occupied.fetch_sub(1, Ordering::AcqRel);
            metrics::set_registry_size(self.len());
            true
        } else {
            false
        }
    }

    /// Start a fresh window for `identity` if it is tracked.
    pub fn restart_window(&self, identity: &str, now: Instant) {
        if let Some(mut entry) = self.entries.get_mut(identity) {
            entry.reset(now);
        }
    }

    /// Snapshot of one entry.
    pub fn get(&self, identity: &str) -> Option<ClientEntry> {
        self.entries.get(identity).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn policy(max_requests: u32, window_secs: u64) -> RatePolicy {
        RatePolicy {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    #[test]
    fn allows_exactly_max_requests_per_window() {
        let registry = ClientRegistry::new(8);
        let policy = policy(3, 60);
        let start = Instant::now();

        for expected in 1..=3 {
            assert_eq!(
                registry.check_and_record("10.0.0.1", start, &policy).unwrap(),
                RateDecision::Allowed { count: expected }
            );
        }
        assert_eq!(
            registry.check_and_record("10.0.0.1", start, &policy).unwrap(),
            RateDecision::Limited { count: 4 }
        );
    }

    #[test]
    fn window_boundary_is_strict() {
        let registry = ClientRegistry::new(8);
        let policy = policy(1, 60);
        let start = Instant::now();

        assert!(registry.check_and_record("a", start, &policy).unwrap().is_allowed());
        // Exactly one window later is still inside it.
        let at_edge = start + Duration::from_secs(60);
        assert!(!registry.check_and_record("a", at_edge, &policy).unwrap().is_allowed());

        let after = start + Duration::from_secs(61);
        assert_eq!(
            registry.check_and_record("a", after, &policy).unwrap(),
            RateDecision::Allowed { count: 1 }
        );
        let entry = registry.get("a").unwrap();
        assert_eq!(entry.window_start, after);
        assert_eq!(entry.request_count, 1);
    }

    #[test]
    fn identities_are_independent() {
        let registry = ClientRegistry::new(8);
        let policy = policy(1, 60);
        let now = Instant::now();

        assert!(registry.check_and_record("a", now, &policy).unwrap().is_allowed());
        assert!(registry.check_and_record("b", now, &policy).unwrap().is_allowed());
        assert!(!registry.check_and_record("a", now, &policy).unwrap().is_allowed());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn full_registry_rejects_new_identity() {
        let registry = ClientRegistry::new(2);
        let policy = policy(5, 60);
        let now = Instant::now();

        registry.check_and_record("a", now, &policy).unwrap();
        registry.check_and_record("b", now, &policy).unwrap();
        assert_eq!(
            registry.check_and_record("c", now, &policy),
            Err(RegistryFull { capacity: 2 })
        );
        // Known identities are still served.
        assert!(registry.check_and_record("a", now, &policy).unwrap().is_allowed());
    }

    #[test]
    fn full_registry_sweeps_expired_windows() {
        let registry = ClientRegistry::new(2);
        let policy = policy(5, 10);
        let start = Instant::now();

        registry.check_and_record("a", start, &policy).unwrap();
        registry
            .check_and_record("b", start + Duration::from_secs(8), &policy)
            .unwrap();

        let later = start + Duration::from_secs(12);
        assert!(registry.check_and_record("c", later, &policy).unwrap().is_allowed());
        assert!(registry.get("a").is_none());
        assert!(registry.get("b").is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn clear_frees_the_slot() {
        let registry = ClientRegistry::new(1);
        let policy = policy(5, 60);
        let now = Instant::now();

        registry.check_and_record("a", now, &policy).unwrap();
        assert!(registry.check_and_record("b", now, &policy).is_err());
        assert!(registry.clear("a"));
        assert!(!registry.clear("a"));
        assert!(registry.check_and_record("b", now, &policy).is_ok());
    }

    #[test]
    fn restart_window_zeroes_count() {
        let registry = ClientRegistry::new(4);
        let policy = policy(1, 60);
        let now = Instant::now();

        registry.check_and_record("a", now, &policy).unwrap();
        assert!(!registry.check_and_record("a", now, &policy).unwrap().is_allowed());
        registry.restart_window("a", now);
        assert!(registry.check_and_record("a", now, &policy).unwrap().is_allowed());
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let registry = Arc::new(ClientRegistry::new(4));
        let policy = policy(1_000, 60);
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..50 {
                        registry.check_and_record("shared", now, &policy).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.get("shared").unwrap().request_count, 400);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_new_identities_respect_capacity() {
        let registry = Arc::new(ClientRegistry::new(10));
        let policy = policy(5, 60);
        let now = Instant::now();

        let handles: Vec<_> = (0..40)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry
                        .check_and_record(&format!("10.0.0.{i}"), now, &policy)
                        .is_ok()
                })
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(admitted, 10);
        assert_eq!(registry.len(), 10);
    }
}
