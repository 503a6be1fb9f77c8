//! keyed-breaker - per-key circuit breaker
//!
//! This crate guards fallible operations by key:
//! - One independent state machine per key (Normal → Blocked → Probing)
//! - Cumulative failure counting, cleared only by a successful probe
//! - Cool-down measured on a monotonic clock, checked rather than slept through
//! - Optional fallbacks for blocked and failed calls
//!
//! # Example
//!
//! ```rust
//! use keyed_breaker::{BreakerRegistry, CallOptions, Phase};
//!
//! let registry = BreakerRegistry::builder()
//!     .max_retries(2)
//!     .cool_down_secs(10.0)
//!     .on_trip(|key| println!("{} blocked", key))
//!     .build();
//!
//! // Plain call
//! let value = registry.run("inventory", || Ok::<_, String>(1));
//! assert_eq!(value.unwrap(), 1);
//!
//! // Call with a fallback
//! let value = registry.run(
//!     "inventory",
//!     (
//!         || Err::<i32, _>("down".to_string()),
//!         CallOptions::new().with_fallback(|_ctx| Ok(-1)),
//!     ),
//! );
//! assert_eq!(value.unwrap(), -1);
//! assert_eq!(registry.phase("inventory"), Some(Phase::Normal));
//! ```

pub mod breaker;
pub mod builder;
pub mod callbacks;
pub mod clock;
pub mod errors;
pub mod registry;

pub use breaker::{CallOptions, Config, FallbackContext, IntoCallOptions, KeyedBreaker};
pub use builder::RegistryBuilder;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use errors::BreakerError;
pub use registry::BreakerRegistry;

/// Phase of a single key's breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Calls go straight to the operation; initial phase of every key
    Normal,
    /// Calls are rejected until the cool-down elapses
    Blocked,
    /// One trial call is running to test recovery
    Probing,
}

impl Phase {
    pub(crate) fn from_state_name(name: &str) -> Self {
        match name {
            "Normal" => Phase::Normal,
            "Blocked" => Phase::Blocked,
            "Probing" => Phase::Probing,
            other => unreachable!("unknown breaker state {:?}", other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Normal => "Normal",
            Phase::Blocked => "Blocked",
            Phase::Probing => "Probing",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
