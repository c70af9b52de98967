//! Admission and rate limiting subsystem.
//!
//! # Data Flow
//! ```text
//! New connection:
//!     → admission.rs (take a global session slot or answer SERVER_BUSY)
//!
//! Every request of an admitted session:
//!     → admission.rs (re-check against a possibly lowered ceiling)
//!     → rate_limit.rs (per-identity window decision)
//!         → registry.rs (bounded identity table)
//! ```
//!
//! # Design Decisions
//! - One shared counter and one shared registry for the whole process
//! - Both read-then-write sequences are single critical sections
//! - Fail closed: a full registry rejects instead of forgetting live windows

pub mod admission;
pub mod rate_limit;
pub mod registry;

pub use admission::{AdmissionController, AdmissionSlot, CapacityExceeded};
pub use rate_limit::RateLimiter;
pub use registry::{ClientEntry, ClientRegistry, RateDecision, RatePolicy, RegistryFull};
