//! Error types for breaker operations

use thiserror::Error;

/// Errors returned by [`BreakerRegistry::run`](crate::BreakerRegistry::run)
///
/// Together with `Ok` this covers the three outcomes of a guarded call:
/// the value, a rejection while the key is blocked, or the operation's own
/// failure.
#[derive(Debug, Error)]
pub enum BreakerError<E = Box<dyn std::error::Error + Send + Sync>> {
    /// Key is blocked and still cooling down; no fallback was supplied
    #[error("Circuit '{key}' is open (tripped at {tripped_at})")]
    OpenCircuit { key: String, tripped_at: f64 },
    /// The wrapped operation (or the fallback) failed
    #[error("Operation failed: {0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Key that rejected the call, if this is an open-circuit rejection
    pub fn open_key(&self) -> Option<&str> {
        match self {
            BreakerError::OpenCircuit { key, .. } => Some(key),
            BreakerError::Operation(_) => None,
        }
    }

    pub fn is_open_circuit(&self) -> bool {
        matches!(self, BreakerError::OpenCircuit { .. })
    }

    /// Unwrap the operation error, if any
    pub fn into_operation(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            BreakerError::OpenCircuit { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_circuit_display_names_key() {
        let err: BreakerError<String> = BreakerError::OpenCircuit {
            key: "payments".to_string(),
            tripped_at: 1.5,
        };

        assert_eq!(err.to_string(), "Circuit 'payments' is open (tripped at 1.5)");
        assert_eq!(err.open_key(), Some("payments"));
        assert!(err.is_open_circuit());
    }

    #[test]
    fn test_operation_error_is_passed_through() {
        let err: BreakerError<&str> = BreakerError::Operation("boom");

        assert_eq!(err.to_string(), "Operation failed: boom");
        assert!(!err.is_open_circuit());
        assert_eq!(err.into_operation(), Some("boom"));
    }
}
