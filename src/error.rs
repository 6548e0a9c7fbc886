//! Engine Error Types
//!
//! One taxonomy shared by every stage of the sweep/reconcile pipeline.
//! `AuthError` and `ConfigError` are fatal; everything else is either
//! recorded and skipped (single transfers) or aggregated (mismatches).

use thiserror::Error;

use crate::executor::BatchOutcome;
use crate::verify::Mismatch;

/// Engine error types
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// Invalid or expired ledger session
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Non-2xx, unreachable or unparseable ledger response
    #[error("Ledger service error{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Service {
        status: Option<u16>,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Expected vs. observed disagreement. Always carries every mismatch.
    #[error("{} provider(s) failed verification: {}", .mismatches.len(), describe(.mismatches))]
    VerificationMismatch { mismatches: Vec<Mismatch> },

    #[error("Observed state not ready after {waited_ms}ms")]
    ReadinessTimeout { waited_ms: u64 },

    /// A fatal error stopped a batch part-way; `outcome` holds the
    /// transfers that were attempted before it
    #[error("Batch part {} aborted after {} transfer(s): {cause}", .outcome.part, .outcome.records.len())]
    BatchAborted {
        outcome: Box<BatchOutcome>,
        cause: Box<EngineError>,
    },

    #[error("Gave up after {attempts} attempt(s): {last}")]
    RetryExhausted {
        attempts: u32,
        last: Box<EngineError>,
    },
}

fn describe(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl EngineError {
    pub fn service(message: impl Into<String>) -> Self {
        EngineError::Service {
            status: None,
            message: message.into(),
        }
    }

    pub fn service_status(status: u16, message: impl Into<String>) -> Self {
        EngineError::Service {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Stable error code for logs and exported results
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Auth(_) => "AUTH_ERROR",
            EngineError::Service { .. } => "SERVICE_ERROR",
            EngineError::Config(_) => "CONFIG_ERROR",
            EngineError::VerificationMismatch { .. } => "VERIFICATION_MISMATCH",
            EngineError::ReadinessTimeout { .. } => "READINESS_TIMEOUT",
            EngineError::BatchAborted { .. } => "BATCH_ABORTED",
            EngineError::RetryExhausted { .. } => "RETRY_EXHAUSTED",
        }
    }

    /// Fatal errors abort immediately and are never retried
    #[inline]
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Auth(_) | EngineError::Config(_) => true,
            EngineError::BatchAborted { cause, .. } => cause.is_fatal(),
            _ => false,
        }
    }

    /// HTTP status captured from the ledger, if any
    pub fn http_status(&self) -> Option<u16> {
        match self {
            EngineError::Service { status, .. } => *status,
            EngineError::Auth(_) => Some(401),
            EngineError::BatchAborted { cause, .. } => cause.http_status(),
            _ => None,
        }
    }

    /// Every mismatch carried by this error, unwrapping retry exhaustion
    pub fn mismatches(&self) -> &[Mismatch] {
        match self {
            EngineError::VerificationMismatch { mismatches } => mismatches,
            EngineError::RetryExhausted { last, .. } => last.mismatches(),
            _ => &[],
        }
    }

    /// Transfers that landed before a batch was aborted
    pub fn partial_outcome(&self) -> Option<&BatchOutcome> {
        match self {
            EngineError::BatchAborted { outcome, .. } => Some(outcome.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(s) if s.as_u16() == 401 || s.as_u16() == 403 => EngineError::Auth(e.to_string()),
            Some(s) => EngineError::service_status(s.as_u16(), e.to_string()),
            None => EngineError::service(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::service(format!("unparseable response: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::MismatchReason;
    use rust_decimal::Decimal;

    #[test]
    fn test_error_codes() {
        assert_eq!(EngineError::Auth("x".into()).code(), "AUTH_ERROR");
        assert_eq!(EngineError::Config("x".into()).code(), "CONFIG_ERROR");
        assert_eq!(
            EngineError::ReadinessTimeout { waited_ms: 10 }.code(),
            "READINESS_TIMEOUT"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(EngineError::Auth("expired".into()).is_fatal());
        assert!(EngineError::Config("batch size".into()).is_fatal());
        assert!(!EngineError::service("boom").is_fatal());
        assert!(!EngineError::ReadinessTimeout { waited_ms: 1 }.is_fatal());
    }

    #[test]
    fn test_service_display_includes_status() {
        let err = EngineError::service_status(500, "internal");
        assert_eq!(err.to_string(), "Ledger service error (HTTP 500): internal");
        assert_eq!(err.http_status(), Some(500));

        let err = EngineError::service("timed out");
        assert_eq!(err.to_string(), "Ledger service error: timed out");
    }

    #[test]
    fn test_mismatch_display_enumerates_all() {
        let err = EngineError::VerificationMismatch {
            mismatches: vec![
                Mismatch::with_reason(
                    3,
                    "gamma",
                    Decimal::ZERO,
                    Some(Decimal::ONE),
                    MismatchReason::CreditDiffers,
                ),
                Mismatch::with_reason(7, "eta", Decimal::TWO, None, MismatchReason::MissingObserved),
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("2 provider(s)"));
        assert!(text.contains("#3"));
        assert!(text.contains("#7"));
    }

    #[test]
    fn test_retry_exhausted_exposes_inner_mismatches() {
        let inner = EngineError::VerificationMismatch {
            mismatches: vec![Mismatch::with_reason(
                1,
                "a",
                Decimal::ZERO,
                Some(Decimal::TEN),
                MismatchReason::CreditDiffers,
            )],
        };
        let err = EngineError::RetryExhausted {
            attempts: 3,
            last: Box::new(inner),
        };
        assert_eq!(err.mismatches().len(), 1);
        assert_eq!(err.code(), "RETRY_EXHAUSTED");
    }

    #[test]
    fn test_batch_aborted_keeps_cause_and_outcome() {
        let outcome = BatchOutcome {
            part: 2,
            records: Vec::new(),
            total_expected_credit: Decimal::ZERO,
        };
        let err = EngineError::BatchAborted {
            outcome: Box::new(outcome),
            cause: Box::new(EngineError::Auth("session expired".into())),
        };
        assert!(err.is_fatal());
        assert_eq!(err.http_status(), Some(401));
        assert_eq!(err.code(), "BATCH_ABORTED");
        assert_eq!(err.partial_outcome().map(|o| o.part), Some(2));
        assert!(err.to_string().starts_with("Batch part 2 aborted after 0 transfer(s)"));
    }
}
