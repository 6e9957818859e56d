//! # srs-engine
//!
//! Pure scheduling core for vocabulary review, in the SM-2 family.
//!
//! Given the current [`ReviewSchedule`] of one (learner, item) pair and a
//! [`Quality`] rating, [`advance`] computes the next schedule. Nothing here
//! touches a clock, a database or a lock: the caller supplies `now` and owns
//! persistence, which keeps every transition deterministic and testable in
//! isolation.
//!
//! ## Modules
//!
//! - [`quality`] - the three-grade rating scale (Hard / Good / Easy)
//! - [`schedule`] - per-item state, invariants and the transition function
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use srs_engine::{advance, Quality, ReviewSchedule};
//!
//! let now = Utc::now();
//! let fresh = ReviewSchedule::new_at(now);
//! let next = advance(&fresh, Quality::Easy, now).unwrap();
//! assert_eq!(next.repetitions, 1);
//! assert_eq!(next.interval_days, 1);
//! ```

pub mod quality;
pub mod schedule;

pub use quality::Quality;
pub use schedule::{
    advance, ReviewSchedule, SchedulerError, DEFAULT_EASE_FACTOR, LAPSE_EASE_PENALTY,
    MAX_INTERVAL_DAYS, MIN_EASE_FACTOR,
};
