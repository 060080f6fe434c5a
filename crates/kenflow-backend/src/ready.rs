use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::{Backend, Error, Result};

/// Bounded startup wait for the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Readiness {
    /// Number of probes before giving up.
    pub attempts: u32,
    /// Pause between probes, in milliseconds.
    pub interval_ms: u64,
    /// Per-probe timeout, in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for Readiness {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval_ms: 200,
            probe_timeout_ms: 500,
        }
    }
}

/// Probe `GET /settings` until it answers or the attempts run out.
///
/// Any reply counts as ready, including error statuses: the service is up.
pub async fn wait_until_ready(backend: &dyn Backend, policy: Readiness) -> Result<()> {
    let probe = Duration::from_millis(policy.probe_timeout_ms);
    for attempt in 1..=policy.attempts {
        match timeout(probe, backend.settings()).await {
            Ok(Ok(_)) => {
                info!(attempt, "backend ready");
                return Ok(());
            }
            Ok(Err(e)) if !e.is_unreachable() => {
                info!(attempt, error = %e, "backend answered with an error; treating as ready");
                return Ok(());
            }
            Ok(Err(e)) => debug!(attempt, error = %e, "backend not ready yet"),
            Err(_) => debug!(attempt, "backend probe timed out"),
        }
        if attempt < policy.attempts {
            sleep(Duration::from_millis(policy.interval_ms)).await;
        }
    }
    warn!(attempts = policy.attempts, "backend never became ready");
    Err(Error::NotReady {
        attempts: policy.attempts,
    })
}
