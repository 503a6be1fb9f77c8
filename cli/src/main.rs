//! Interactive exerciser for keyed-breaker
//!
//! Reads whitespace-separated `<key> <mode>` pairs from stdin and runs one
//! guarded call per pair:
//! - `y`: the operation always fails, no fallback
//! - `n`: the operation always succeeds with `1`, no fallback
//! - anything else: the operation always fails, the fallback returns `-1`

use anyhow::Context;
use clap::Parser;
use keyed_breaker::{BreakerError, BreakerRegistry, CallOptions};
use std::fmt;
use std::io::{self, BufRead, Write};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Value returned by the fallback in fallback mode
const FALLBACK_SENTINEL: i32 = -1;

#[derive(Parser)]
#[command(name = "breaker-exerciser")]
#[command(about = "Drive a per-key circuit breaker from stdin", long_about = None)]
struct Cli {
    /// Failures tolerated per key before it is blocked
    #[arg(long, default_value_t = 2)]
    max_retries: usize,

    /// Seconds a blocked key waits before admitting a probe
    #[arg(long = "cool-down", default_value_t = 10.0, value_parser = parse_cool_down)]
    cool_down: f64,

    /// Log breaker internals at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn parse_cool_down(value: &str) -> Result<f64, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|e| format!("invalid number '{}': {}", value, e))?;

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!(
            "cool-down must be a finite, non-negative number of seconds, got {}",
            value
        ));
    }
    Ok(seconds)
}

/// Behaviour of the operation for one input pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Fail,
    Succeed,
    FailWithFallback,
}

impl Mode {
    fn parse(token: &str) -> Self {
        match token {
            "y" => Mode::Fail,
            "n" => Mode::Succeed,
            _ => Mode::FailWithFallback,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Outcome {
    Value(i32),
    Open,
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(v) => write!(f, "{}", v),
            Outcome::Open => write!(f, "circuit is open"),
            Outcome::Failed(e) => write!(f, "operation failed: {}", e),
        }
    }
}

fn failing_operation() -> Result<i32, String> {
    Err("failure inside operation".to_string())
}

fn exercise(registry: &BreakerRegistry, key: &str, mode: Mode) -> Outcome {
    let result = match mode {
        Mode::Fail => registry.run(key, failing_operation),
        Mode::Succeed => registry.run(key, || Ok::<_, String>(1)),
        Mode::FailWithFallback => registry.run(
            key,
            (
                failing_operation,
                CallOptions::new().with_fallback(|_ctx| Ok(FALLBACK_SENTINEL)),
            ),
        ),
    };

    match result {
        Ok(value) => Outcome::Value(value),
        Err(BreakerError::OpenCircuit { .. }) => Outcome::Open,
        Err(BreakerError::Operation(e)) => Outcome::Failed(e),
    }
}

/// Pair up tokens across lines and report one outcome per pair
fn drive<R: BufRead, W: Write>(registry: &BreakerRegistry, input: R, mut output: W) -> io::Result<()> {
    let mut pending_key: Option<String> = None;

    // Raw bytes per line, so non-UTF-8 input degrades instead of aborting
    for line in input.split(b'\n') {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        for token in line.split_whitespace() {
            match pending_key.take() {
                None => pending_key = Some(token.to_string()),
                Some(key) => {
                    let outcome = exercise(registry, &key, Mode::parse(token));
                    writeln!(output, "{}", outcome)?;
                    output.flush()?;
                }
            }
        }
    }

    if let Some(key) = pending_key {
        tracing::debug!(key = %key, "ignoring key without a mode");
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "keyed_breaker=debug,breaker_exerciser=debug"
    } else {
        "keyed_breaker=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let registry = BreakerRegistry::builder()
        .max_retries(cli.max_retries)
        .cool_down_secs(cli.cool_down)
        .build();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "Testing, format: <key> <mode: y/n/other>")?;

    drive(&registry, io::stdin().lock(), out).context("failed to process stdin")?;
    Ok(())
}
