//! Per-key breaker implementation using state machines
//!
//! Each key owns one `KeyedBreaker`: a `Normal → Blocked → Probing` machine
//! driven by a cumulative failure counter and a cool-down window.

use crate::{Clock, MonotonicClock, Phase, callbacks::Callbacks, errors::BreakerError};
use state_machines::state_machine;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Breaker configuration, shared by every key of a registry
#[derive(Debug, Clone)]
pub struct Config {
    /// Failures tolerated before the key is blocked; the next one trips it
    pub max_retries: usize,

    /// Seconds a blocked key rejects calls before a probe is admitted
    pub cool_down_secs: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: 2,
            cool_down_secs: 10.0,
        }
    }
}

impl Config {
    /// Validate a cool-down, clamping negative values to zero
    ///
    /// # Panics
    ///
    /// Panics if `seconds` is NaN or infinite.
    pub(crate) fn checked_cool_down(seconds: f64) -> f64 {
        assert!(
            seconds.is_finite(),
            "Cool-down must be a finite number of seconds"
        );
        seconds.max(0.0)
    }
}

/// Context provided to fallback closures
#[derive(Debug, Clone)]
pub struct FallbackContext {
    /// Key the call was made for
    pub key: String,
    /// Phase of the key when the fallback was chosen
    pub phase: Phase,
    /// Last trip (or probe start) timestamp, `0.0` if the key never tripped
    pub last_tripped_at: f64,
}

/// Type alias for fallback function
pub type FallbackFn<T, E> = Box<dyn FnOnce(&FallbackContext) -> Result<T, E> + Send>;

/// Options for guarded calls
pub struct CallOptions<T, E> {
    /// Optional fallback, used when the key is blocked or the operation fails
    pub fallback: Option<FallbackFn<T, E>>,
}

impl<T, E> Default for CallOptions<T, E> {
    fn default() -> Self {
        Self { fallback: None }
    }
}

impl<T, E> CallOptions<T, E> {
    /// Create new call options with no fallback
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a fallback function
    pub fn with_fallback<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&FallbackContext) -> Result<T, E> + Send + 'static,
    {
        self.fallback = Some(Box::new(f));
        self
    }
}

/// Type alias for callable function
pub type CallableFn<T, E> = Box<dyn FnOnce() -> Result<T, E>>;

/// Conversion into an operation plus options, so `run` takes either form
pub trait IntoCallOptions<T, E> {
    fn into_call_options(self) -> (CallableFn<T, E>, CallOptions<T, E>);
}

/// Plain closure, no fallback
impl<T, E, F> IntoCallOptions<T, E> for F
where
    F: FnOnce() -> Result<T, E> + 'static,
{
    fn into_call_options(self) -> (CallableFn<T, E>, CallOptions<T, E>) {
        (Box::new(self), CallOptions::default())
    }
}

/// `(closure, CallOptions)` tuple
impl<T, E, F> IntoCallOptions<T, E> for (F, CallOptions<T, E>)
where
    F: FnOnce() -> Result<T, E> + 'static,
{
    fn into_call_options(self) -> (CallableFn<T, E>, CallOptions<T, E>) {
        (Box::new(self.0), self.1)
    }
}

/// Breaker context - shared data across all states
#[derive(Clone)]
pub struct BreakerContext {
    pub key: String,
    pub config: Config,
    /// Cumulative failure counter, only cleared by a successful probe or reset
    pub failures: Arc<AtomicUsize>,
    pub clock: Arc<dyn Clock>,
}

impl Default for BreakerContext {
    fn default() -> Self {
        Self {
            key: String::new(),
            config: Config::default(),
            failures: Arc::new(AtomicUsize::new(0)),
            clock: Arc::new(MonotonicClock::new()),
        }
    }
}

impl std::fmt::Debug for BreakerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerContext")
            .field("key", &self.key)
            .field("config", &self.config)
            .field("failures", &self.failures.load(Ordering::Acquire))
            .field("clock", &self.clock)
            .finish()
    }
}

/// Data specific to the Blocked state
#[derive(Debug, Clone, Default)]
pub struct BlockedData {
    pub tripped_at: f64,
}

/// Data specific to the Probing state
#[derive(Debug, Clone, Default)]
pub struct ProbingData {
    pub probing_since: f64,
}

state_machine! {
    name: Breaker,
    context: BreakerContext,
    dynamic: true,

    initial: Normal,
    states: [
        Normal,
        Blocked(BlockedData),
        Probing(ProbingData),
    ],
    events {
        trip {
            guards: [retries_exhausted],
            transition: { from: [Normal, Probing], to: Blocked }
        }
        probe {
            guards: [cool_down_elapsed],
            transition: { from: Blocked, to: Probing }
        }
        recover {
            transition: { from: Probing, to: Normal }
        }
    }
}

fn failures_exceed_limit(ctx: &BreakerContext) -> bool {
    ctx.failures.load(Ordering::Acquire) > ctx.config.max_retries
}

impl Breaker<Normal> {
    fn retries_exhausted(&self, ctx: &BreakerContext) -> bool {
        failures_exceed_limit(ctx)
    }
}

impl Breaker<Probing> {
    /// No reset happens on entering Probing, so a failed probe re-trips at once
    fn retries_exhausted(&self, ctx: &BreakerContext) -> bool {
        failures_exceed_limit(ctx)
    }
}

impl Breaker<Blocked> {
    fn cool_down_elapsed(&self, ctx: &BreakerContext) -> bool {
        let Some(data) = self.state_data_blocked() else {
            return true;
        };
        ctx.clock.monotonic_time() - data.tripped_at >= ctx.config.cool_down_secs
    }
}

/// Phase change whose callback has not fired yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Trip,
    Probe,
    Recover,
}

pub(crate) enum PendingOutcome<T, E> {
    Done(Result<T, BreakerError<E>>),
    Fallback(FallbackFn<T, E>, FallbackContext),
}

/// A call whose phase bookkeeping is done but whose callbacks and fallback
/// have not run yet
pub(crate) struct PendingCall<T, E> {
    key: String,
    callbacks: Callbacks,
    transitions: Vec<Transition>,
    outcome: PendingOutcome<T, E>,
}

impl<T, E> PendingCall<T, E> {
    /// Fire transition callbacks in order, then run the fallback if one was chosen
    pub(crate) fn finish(self) -> Result<T, BreakerError<E>> {
        for transition in &self.transitions {
            match transition {
                Transition::Trip => self.callbacks.trigger_trip(&self.key),
                Transition::Probe => self.callbacks.trigger_probe(&self.key),
                Transition::Recover => self.callbacks.trigger_recover(&self.key),
            }
        }

        match self.outcome {
            PendingOutcome::Done(result) => result,
            PendingOutcome::Fallback(fallback, ctx) => fallback(&ctx).map_err(BreakerError::Operation),
        }
    }
}

/// Breaker guarding a single key
pub struct KeyedBreaker {
    machine: DynamicBreaker,
    context: BreakerContext,
    callbacks: Callbacks,
    last_tripped_at: f64,
}

impl KeyedBreaker {
    /// Create a breaker measuring cool-down with a [`MonotonicClock`]
    pub fn new(key: impl Into<String>, config: Config) -> Self {
        Self::with_clock(key, config, Arc::new(MonotonicClock::new()))
    }

    /// Create a breaker with an explicit time source
    pub fn with_clock(key: impl Into<String>, config: Config, clock: Arc<dyn Clock>) -> Self {
        let context = BreakerContext {
            key: key.into(),
            config,
            failures: Arc::new(AtomicUsize::new(0)),
            clock,
        };

        Self::with_context_and_callbacks(context, Callbacks::new())
    }

    /// Used by the registry, which hands every key the same clock and hooks
    pub(crate) fn with_context_and_callbacks(
        mut context: BreakerContext,
        callbacks: Callbacks,
    ) -> Self {
        context.config.cool_down_secs = Config::checked_cool_down(context.config.cool_down_secs);
        let machine = DynamicBreaker::new(context.clone());

        Self {
            machine,
            context,
            callbacks,
            last_tripped_at: 0.0,
        }
    }

    /// Execute a fallible operation under breaker protection
    ///
    /// Accepts either:
    /// - A plain closure: `breaker.call(|| api_request())`
    /// - A closure with options: `breaker.call((|| api_request(), CallOptions::new().with_fallback(...)))`
    pub fn call<I, T, E>(&mut self, input: I) -> Result<T, BreakerError<E>>
    where
        I: IntoCallOptions<T, E>,
    {
        self.call_deferred(input).finish()
    }

    /// Run the operation and settle the phase, leaving callbacks and the
    /// fallback in the returned [`PendingCall`]
    ///
    /// The registry finishes the call after releasing the key lock, so hooks
    /// and fallbacks may inspect or reset their own key.
    pub(crate) fn call_deferred<I, T, E>(&mut self, input: I) -> PendingCall<T, E>
    where
        I: IntoCallOptions<T, E>,
    {
        let (f, options) = input.into_call_options();
        let mut transitions = Vec::new();

        // Cool-down based Blocked -> Probing transition
        if self.phase() == Phase::Blocked && self.machine.handle(BreakerEvent::Probe).is_ok() {
            self.mark_probing();
            transitions.push(Transition::Probe);
        }

        let outcome = if self.phase() == Phase::Blocked {
            debug!(key = %self.context.key, "call rejected, key is cooling down");

            match options.fallback {
                Some(fallback) => PendingOutcome::Fallback(fallback, self.fallback_context()),
                None => PendingOutcome::Done(Err(BreakerError::OpenCircuit {
                    key: self.context.key.clone(),
                    tripped_at: self.last_tripped_at,
                })),
            }
        } else {
            self.execute_call(f, options.fallback, &mut transitions)
        };

        PendingCall {
            key: self.context.key.clone(),
            callbacks: self.callbacks.clone(),
            transitions,
            outcome,
        }
    }

    fn execute_call<T, E>(
        &mut self,
        f: CallableFn<T, E>,
        fallback: Option<FallbackFn<T, E>>,
        transitions: &mut Vec<Transition>,
    ) -> PendingOutcome<T, E> {
        match f() {
            Ok(val) => {
                if self.phase() == Phase::Probing
                    && self.machine.handle(BreakerEvent::Recover).is_ok()
                {
                    self.context.failures.store(0, Ordering::Release);
                    info!(key = %self.context.key, "probe succeeded, key recovered");
                    transitions.push(Transition::Recover);
                }

                PendingOutcome::Done(Ok(val))
            }
            Err(e) => {
                let failures = self.context.failures.fetch_add(1, Ordering::AcqRel) + 1;

                if self.machine.handle(BreakerEvent::Trip).is_ok() {
                    self.mark_blocked(failures);
                    transitions.push(Transition::Trip);
                }

                match fallback {
                    Some(fallback) => PendingOutcome::Fallback(fallback, self.fallback_context()),
                    None => PendingOutcome::Done(Err(BreakerError::Operation(e))),
                }
            }
        }
    }

    pub fn key(&self) -> &str {
        &self.context.key
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        Phase::from_state_name(self.machine.current_state())
    }

    pub fn is_blocked(&self) -> bool {
        self.phase() == Phase::Blocked
    }

    /// Failures accumulated since the last successful probe
    pub fn failure_count(&self) -> usize {
        self.context.failures.load(Ordering::Acquire)
    }

    /// Timestamp of the last trip or probe start, `0.0` if never tripped
    pub fn last_tripped_at(&self) -> f64 {
        self.last_tripped_at
    }

    /// Clear the failure counter and return to Normal
    pub fn reset(&mut self) {
        self.context.failures.store(0, Ordering::Release);
        self.last_tripped_at = 0.0;
        self.machine = DynamicBreaker::new(self.context.clone());
    }

    fn fallback_context(&self) -> FallbackContext {
        FallbackContext {
            key: self.context.key.clone(),
            phase: self.phase(),
            last_tripped_at: self.last_tripped_at,
        }
    }

    /// Apply Blocked-state bookkeeping (timestamp + log)
    fn mark_blocked(&mut self, failures: usize) {
        let now = self.context.clock.monotonic_time();
        if let Some(data) = self.machine.blocked_data_mut() {
            data.tripped_at = now;
        }
        self.last_tripped_at = now;

        warn!(
            key = %self.context.key,
            failures,
            max_retries = self.context.config.max_retries,
            "max failures reached, blocking key"
        );
    }

    /// Apply Probing-state bookkeeping (timestamp + log)
    fn mark_probing(&mut self) {
        let now = self.context.clock.monotonic_time();
        if let Some(data) = self.machine.probing_data_mut() {
            data.probing_since = now;
        }
        self.last_tripped_at = now;

        info!(key = %self.context.key, "cool-down elapsed, probing");
    }
}

impl std::fmt::Debug for KeyedBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedBreaker")
            .field("key", &self.context.key)
            .field("phase", &self.phase())
            .field("failures", &self.failure_count())
            .field("last_tripped_at", &self.last_tripped_at)
            .finish()
    }
}
