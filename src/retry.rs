//! Retry/Backoff Controller
//!
//! ```text
//! Attempting ──ok──▶ Succeeded
//!     │
//!     └─fail─▶ resync observed ─▶ settle ─▶ Attempting   (≤ N attempts)
//!                                              │
//!                                              └─Nth fail─▶ ExhaustedRetries
//! ```
//!
//! Fatal errors (`Auth`, `Config`) skip the loop and return immediately.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::observed::ObservedState;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryState {
    Attempting,
    /// Terminal
    Succeeded,
    /// Terminal
    ExhaustedRetries,
}

impl RetryState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::Succeeded | RetryState::ExhaustedRetries)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RetryState::Attempting => "ATTEMPTING",
            RetryState::Succeeded => "SUCCEEDED",
            RetryState::ExhaustedRetries => "EXHAUSTED_RETRIES",
        }
    }
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stateful action that performs its work and verifies it in one attempt
#[async_trait]
pub trait RetryableAction: Send {
    fn name(&self) -> &'static str;

    /// `Ok` means the success condition holds after this attempt
    async fn attempt(&mut self, attempt: u32) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryReport {
    pub state: RetryState,
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RetryController {
    max_attempts: u32,
    settle_interval: Duration,
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Duration::from_secs(2))
    }
}

impl RetryController {
    /// `max_attempts` of 0 is treated as 1
    pub fn new(max_attempts: u32, settle_interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            settle_interval,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn drive(
        &self,
        action: &mut dyn RetryableAction,
        observed: &dyn ObservedState,
    ) -> Result<RetryReport, EngineError> {
        let mut state = RetryState::Attempting;
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            info!(action = action.name(), attempt, state = %state, "Attempting");

            match action.attempt(attempt).await {
                Ok(()) => {
                    state = RetryState::Succeeded;
                    info!(action = action.name(), attempts = attempt, state = %state, "Action succeeded");
                    return Ok(RetryReport {
                        state,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_fatal() => {
                    error!(action = action.name(), attempt, error = %e, "Fatal error, not retrying");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        action = action.name(),
                        attempt,
                        max_attempts = self.max_attempts,
                        code = e.code(),
                        error = %e,
                        "Attempt failed"
                    );
                    last_error = Some(e);
                }
            }

            if attempt < self.max_attempts {
                match observed.resync().await {
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!(channel = observed.name(), error = %e, "Resync failed"),
                    Ok(()) => {}
                }
                tokio::time::sleep(self.settle_interval).await;
            }
        }

        state = RetryState::ExhaustedRetries;
        error!(action = action.name(), attempts = self.max_attempts, state = %state, "Retries exhausted");
        Err(EngineError::RetryExhausted {
            attempts: self.max_attempts,
            last: Box::new(
                last_error.unwrap_or_else(|| EngineError::service("no attempt recorded")),
            ),
        })
    }
}
