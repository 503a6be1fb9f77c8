//! Builder API for ergonomic registry configuration

use crate::{
    Clock, MonotonicClock, breaker::Config, callbacks::Callbacks, registry::BreakerRegistry,
};
use std::sync::Arc;

/// Builder for creating breaker registries with fluent API
pub struct RegistryBuilder {
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    callbacks: Callbacks,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            clock: None,
            callbacks: Callbacks::new(),
        }
    }

    /// Failures tolerated per key; the next failure blocks the key
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Seconds a blocked key waits before admitting a probe
    ///
    /// Negative values are clamped to `0.0`.
    ///
    /// # Panics
    ///
    /// Panics if `seconds` is NaN or infinite.
    pub fn cool_down_secs(mut self, seconds: f64) -> Self {
        self.config.cool_down_secs = Config::checked_cool_down(seconds);
        self
    }

    /// Replace the whole config at once, with the same cool-down checks
    pub fn config(mut self, mut config: Config) -> Self {
        config.cool_down_secs = Config::checked_cool_down(config.cool_down_secs);
        self.config = config;
        self
    }

    /// Set a custom time source
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keyed_breaker::{BreakerRegistry, ManualClock, Phase};
    /// use std::sync::Arc;
    ///
    /// let clock = Arc::new(ManualClock::new());
    /// let registry = BreakerRegistry::builder()
    ///     .max_retries(0)
    ///     .clock(clock.clone())
    ///     .build();
    ///
    /// let _ = registry.run("db", || Err::<(), _>("timeout"));
    /// assert_eq!(registry.phase("db"), Some(Phase::Blocked));
    ///
    /// clock.advance(10.0);
    /// let _ = registry.run("db", || Ok::<_, &str>(()));
    /// assert_eq!(registry.phase("db"), Some(Phase::Normal));
    /// ```
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set callback for when a key is blocked
    pub fn on_trip<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_trip = Some(Arc::new(f));
        self
    }

    /// Set callback for when a blocked key starts probing
    pub fn on_probe<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_probe = Some(Arc::new(f));
        self
    }

    /// Set callback for when a probe succeeds
    pub fn on_recover<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_recover = Some(Arc::new(f));
        self
    }

    /// Build the registry
    pub fn build(self) -> BreakerRegistry {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        BreakerRegistry::with_parts(self.config, clock, self.callbacks)
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManualClock, Phase};
    use std::sync::Mutex;

    #[test]
    fn test_builder_defaults() {
        let registry = RegistryBuilder::new().build();

        assert_eq!(registry.config().max_retries, 2);
        assert_eq!(registry.config().cool_down_secs, 10.0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_builder_custom_config() {
        let registry = RegistryBuilder::new()
            .max_retries(5)
            .cool_down_secs(30.0)
            .build();

        assert_eq!(registry.config().max_retries, 5);
        assert_eq!(registry.config().cool_down_secs, 30.0);

        for _ in 0..5 {
            let _ = registry.run("k", || Err::<(), _>("error"));
        }
        assert_eq!(registry.phase("k"), Some(Phase::Normal));

        let _ = registry.run("k", || Err::<(), _>("error"));
        assert_eq!(registry.phase("k"), Some(Phase::Blocked));
    }

    #[test]
    fn test_builder_with_callbacks() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let trip_events = events.clone();
        let probe_events = events.clone();
        let recover_events = events.clone();
        let clock = Arc::new(ManualClock::new());

        let registry = RegistryBuilder::new()
            .clock(clock.clone())
            .on_trip(move |key| trip_events.lock().unwrap().push(format!("trip:{}", key)))
            .on_probe(move |key| probe_events.lock().unwrap().push(format!("probe:{}", key)))
            .on_recover(move |key| {
                recover_events
                    .lock()
                    .unwrap()
                    .push(format!("recover:{}", key))
            })
            .build();

        for _ in 0..3 {
            let _ = registry.run("api", || Err::<(), _>("error"));
        }
        clock.advance(10.0);
        let _ = registry.run("api", || Ok::<_, &str>(()));

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "trip:api".to_string(),
                "probe:api".to_string(),
                "recover:api".to_string(),
            ]
        );
    }

    #[test]
    fn test_negative_cool_down_is_clamped() {
        let clock = Arc::new(ManualClock::new());
        let registry = RegistryBuilder::new()
            .cool_down_secs(-5.0)
            .clock(clock)
            .build();

        assert_eq!(registry.config().cool_down_secs, 0.0);

        for _ in 0..3 {
            let _ = registry.run("k", || Err::<(), _>("error"));
        }
        // Zero cool-down admits the next call as a probe straight away
        let result = registry.run("k", || Ok::<_, &str>("recovered"));
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(registry.phase("k"), Some(Phase::Normal));
    }

    #[test]
    #[should_panic(expected = "Cool-down must be a finite number of seconds")]
    fn test_nan_cool_down_rejected() {
        RegistryBuilder::new().cool_down_secs(f64::NAN);
    }

    #[test]
    #[should_panic(expected = "Cool-down must be a finite number of seconds")]
    fn test_infinite_cool_down_rejected_through_config() {
        RegistryBuilder::new().config(Config {
            max_retries: 2,
            cool_down_secs: f64::INFINITY,
        });
    }

    #[test]
    #[should_panic(expected = "Cool-down must be a finite number of seconds")]
    fn test_nan_cool_down_rejected_by_registry_constructor() {
        BreakerRegistry::with_config(Config {
            max_retries: 2,
            cool_down_secs: f64::NAN,
        });
    }
}
