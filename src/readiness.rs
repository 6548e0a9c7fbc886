//! Readiness gate for the observed channel.
//!
//! One failure contract: `Err(ReadinessTimeout)`. Callers that treat
//! readiness as a soft precondition use [`precondition`], which logs and
//! proceeds; the retry loop propagates the error so it counts as a failed
//! attempt.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::EngineError;
use crate::observed::ObservedState;

/// Poll `is_ready` every `poll` until it holds or `timeout` elapses
pub async fn wait_until_ready(
    observed: &dyn ObservedState,
    timeout: Duration,
    poll: Duration,
) -> Result<(), EngineError> {
    let started = Instant::now();
    let poll = poll.max(Duration::from_millis(1));

    let ready = tokio::time::timeout(timeout, async {
        while !observed.is_ready().await {
            tokio::time::sleep(poll).await;
        }
    })
    .await;

    match ready {
        Ok(()) => {
            debug!(
                channel = observed.name(),
                waited_ms = started.elapsed().as_millis() as u64,
                "Observed state ready"
            );
            Ok(())
        }
        Err(_) => Err(EngineError::ReadinessTimeout {
            waited_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Soft gate: a timeout is logged and the caller carries on.
/// Returns whether the channel became ready.
pub async fn precondition(observed: &dyn ObservedState, timeout: Duration, poll: Duration) -> bool {
    match wait_until_ready(observed, timeout, poll).await {
        Ok(()) => true,
        Err(e) => {
            warn!(channel = observed.name(), error = %e, "Proceeding without a ready observed state");
            false
        }
    }
}
