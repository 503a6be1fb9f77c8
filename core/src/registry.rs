//! Registry mapping keys to their breakers
//!
//! Breakers are created lazily on the first `run` for a key and live as long
//! as the registry. Calls for the same key are serialized behind that key's
//! lock while the transition is evaluated and the operation runs, so at most
//! one probe is ever in flight per key. Calls for different keys do not
//! contend beyond a brief map lookup.
//!
//! Transition callbacks and fallbacks run after the key lock is released and
//! may freely inspect, reset or run their own key. The operation itself must
//! not touch its own key: the lock is held while it executes.

use crate::{
    BreakerError, Clock, Config, KeyedBreaker, MonotonicClock, Phase,
    breaker::{BreakerContext, IntoCallOptions},
    builder::RegistryBuilder,
    callbacks::Callbacks,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

type SharedBreaker = Arc<Mutex<KeyedBreaker>>;

/// Per-key circuit breaker registry
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, SharedBreaker>>,
    config: Config,
    clock: Arc<dyn Clock>,
    callbacks: Callbacks,
}

impl BreakerRegistry {
    /// Registry with default config (2 retries, 10s cool-down) and a monotonic clock
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_parts(config, Arc::new(MonotonicClock::new()), Callbacks::new())
    }

    pub(crate) fn with_parts(
        mut config: Config,
        clock: Arc<dyn Clock>,
        callbacks: Callbacks,
    ) -> Self {
        config.cool_down_secs = Config::checked_cool_down(config.cool_down_secs);
        Self {
            breakers: RwLock::new(HashMap::new()),
            config,
            clock,
            callbacks,
        }
    }

    /// Create a new registry builder
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Execute `input` under the breaker for `key`
    ///
    /// Accepts either a plain closure or an `(operation, CallOptions)` tuple.
    /// Returns the operation's value, `BreakerError::OpenCircuit` when the key
    /// is blocked and no fallback was given, or `BreakerError::Operation` with
    /// the operation's (or fallback's) own error.
    pub fn run<I, T, E>(&self, key: &str, input: I) -> Result<T, BreakerError<E>>
    where
        I: IntoCallOptions<T, E>,
    {
        let breaker = self.entry(key);
        let pending = breaker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .call_deferred(input);

        // Key lock is released; hooks and fallbacks may inspect this key
        pending.finish()
    }

    /// Phase of `key`, `None` if it was never run
    pub fn phase(&self, key: &str) -> Option<Phase> {
        self.inspect(key, KeyedBreaker::phase)
    }

    pub fn failure_count(&self, key: &str) -> Option<usize> {
        self.inspect(key, KeyedBreaker::failure_count)
    }

    pub fn last_tripped_at(&self, key: &str) -> Option<f64> {
        self.inspect(key, KeyedBreaker::last_tripped_at)
    }

    /// Return `key` to Normal with a cleared counter; `false` for unknown keys
    pub fn reset(&self, key: &str) -> bool {
        let Some(breaker) = self.get(key) else {
            return false;
        };
        breaker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
        debug!(key, "breaker reset");
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Known keys, in no particular order
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // Private helper methods

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SharedBreaker>> {
        self.breakers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, key: &str) -> Option<SharedBreaker> {
        self.read().get(key).cloned()
    }

    fn entry(&self, key: &str) -> SharedBreaker {
        if let Some(breaker) = self.get(key) {
            return breaker;
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        let breaker = breakers.entry(key.to_string()).or_insert_with(|| {
            debug!(key, "creating breaker");
            Arc::new(Mutex::new(self.create(key)))
        });
        Arc::clone(breaker)
    }

    fn create(&self, key: &str) -> KeyedBreaker {
        let context = BreakerContext {
            key: key.to_string(),
            config: self.config.clone(),
            failures: Arc::new(AtomicUsize::new(0)),
            clock: Arc::clone(&self.clock),
        };

        KeyedBreaker::with_context_and_callbacks(context, self.callbacks.clone())
    }

    fn inspect<R>(&self, key: &str, f: impl FnOnce(&KeyedBreaker) -> R) -> Option<R> {
        let breaker = self.get(key)?;
        let breaker = breaker.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&breaker))
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerRegistry")
            .field("keys", &self.len())
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
