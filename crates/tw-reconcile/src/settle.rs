//! Bounded readiness polling
//!
//! After actions are applied, containers need time to boot and DNS needs
//! time to propagate. Instead of sleeping a fixed amount, poll a readiness
//! check with exponential backoff until it passes or a hard deadline
//! expires, and say which of the two happened.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tw_core::config::SettleConfig;

use crate::backoff::Backoff;

/// How the wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The check passed
    Ready { attempts: u32, elapsed: Duration },
    /// The deadline expired before the check passed
    TimedOut { attempts: u32, elapsed: Duration },
    /// The wait was cancelled (Ctrl-C)
    Cancelled { attempts: u32, elapsed: Duration },
}

/// Poll `check` until it returns true, the deadline passes, or `cancel` fires
pub async fn wait_until<F, Fut>(
    config: &SettleConfig,
    cancel: &CancellationToken,
    mut check: F,
) -> SettleOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let deadline = start + config.deadline;
    let mut backoff = Backoff::new(config);
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let passed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return SettleOutcome::Cancelled { attempts, elapsed: start.elapsed() };
            }
            passed = check() => passed,
        };

        if passed {
            tracing::debug!(attempts, "Readiness check passed");
            return SettleOutcome::Ready {
                attempts,
                elapsed: start.elapsed(),
            };
        }

        let Some(delay) = backoff.next_within(deadline.saturating_duration_since(Instant::now())) else {
            return SettleOutcome::TimedOut {
                attempts,
                elapsed: start.elapsed(),
            };
        };
        tracing::debug!(attempts, delay_ms = delay.as_millis() as u64, "Not ready yet");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return SettleOutcome::Cancelled { attempts, elapsed: start.elapsed() };
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
