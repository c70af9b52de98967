//! Global session admission.
//!
//! # Responsibilities
//! - Count sessions that are past admission and not yet closed
//! - Reject new sessions once `max_users` is reached
//! - Release a slot exactly once per admitted session
//!
//! # Design Decisions
//! - Check and increment are one compare-exchange, never a load then a store
//! - Slots are RAII guards so every exit path of a session releases
//! - `max_users` is swappable at runtime; running sessions notice a lowered
//!   limit through `over_capacity`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::observability::metrics;

/// Returned when no admission slot is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("server at capacity ({active}/{max_users} sessions)")]
pub struct CapacityExceeded {
    pub active: usize,
    pub max_users: usize,
}

/// Shared gate in front of every session.
#[derive(Debug)]
pub struct AdmissionController {
    active: AtomicUsize,
    max_users: AtomicUsize,
}

impl AdmissionController {
    pub fn new(max_users: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            max_users: AtomicUsize::new(max_users),
        }
    }

    /// Take a slot if one is free. The counter is untouched on rejection.
    pub fn try_admit(self: &Arc<Self>) -> Result<AdmissionSlot, CapacityExceeded> {
        let max_users = self.max_users.load(Ordering::Acquire);
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= max_users {
                metrics::record_admission(false);
                return Err(CapacityExceeded {
                    active: current,
                    max_users,
                });
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        metrics::record_admission(true);
        metrics::set_active_sessions(current + 1);
        Ok(AdmissionSlot {
            controller: Arc::clone(self),
        })
    }

    /// Give a slot back. Releasing with nothing admitted is logged and ignored.
    pub fn release(&self) {
        match self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => metrics::set_active_sessions(previous - 1),
            Err(_) => tracing::error!("Admission release with no active sessions; counter left at zero"),
        }
    }

    /// Sessions currently holding a slot.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn max_users(&self) -> usize {
        self.max_users.load(Ordering::Acquire)
    }

    /// Change the ceiling. Existing sessions are not evicted here.
    pub fn set_max_users(&self, max_users: usize) {
        let previous = self.max_users.swap(max_users, Ordering::AcqRel);
        if previous != max_users {
            tracing::info!(previous, max_users, "Admission ceiling changed");
        }
    }

    /// True when more sessions hold slots than the current ceiling allows.
    pub fn over_capacity(&self) -> bool {
        self.active() > self.max_users()
    }
}

/// One admitted session. Dropping it releases the slot.
#[derive(Debug)]
pub struct AdmissionSlot {
    controller: Arc<AdmissionController>,
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.controller.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;

    #[test]
    fn admits_up_to_ceiling() {
        let controller = Arc::new(AdmissionController::new(2));
        let a = controller.try_admit().unwrap();
        let b = controller.try_admit().unwrap();
        assert_eq!(controller.active(), 2);

        let rejected = controller.try_admit().unwrap_err();
        assert_eq!(rejected, CapacityExceeded { active: 2, max_users: 2 });
        assert_eq!(controller.active(), 2, "rejection must not increment");

        drop(a);
        assert_eq!(controller.active(), 1);
        let _c = controller.try_admit().unwrap();
        drop(b);
        assert_eq!(controller.active(), 1);
    }

    #[test]
    fn release_at_zero_is_noop() {
        let controller = AdmissionController::new(1);
        controller.release();
        assert_eq!(controller.active(), 0);
    }

    #[test]
    fn lowered_ceiling_is_visible_to_holders() {
        let controller = Arc::new(AdmissionController::new(3));
        let _slots: Vec<_> = (0..3).map(|_| controller.try_admit().unwrap()).collect();
        assert!(!controller.over_capacity());

        controller.set_max_users(1);
        assert!(controller.over_capacity());
        assert!(controller.try_admit().is_err());
    }

    #[test]
    fn concurrent_admission_never_exceeds_ceiling() {
        let controller = Arc::new(AdmissionController::new(5));
        let held = Arc::new(Mutex::new(Vec::new()));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let controller = Arc::clone(&controller);
                let held = Arc::clone(&held);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    if let Ok(slot) = controller.try_admit() {
                        peak.fetch_max(controller.active(), Ordering::SeqCst);
                        held.lock().unwrap().push(slot);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(held.lock().unwrap().len(), 5);
        assert_eq!(controller.active(), 5);
        assert!(peak.load(Ordering::SeqCst) <= 5);

        held.lock().unwrap().clear();
        assert_eq!(controller.active(), 0);
    }
}
