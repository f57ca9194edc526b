//! Bounded polling.

use std::time::Duration;

use thiserror::Error;

/// The predicate never held within the attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("condition not met after {attempts} attempts ({interval:?} apart)")]
pub struct WaitTimeout {
    pub attempts: u32,
    pub interval: Duration,
}

/// Poll `predicate` up to `max_attempts` times, sleeping `interval` between
/// attempts. The first check happens immediately.
///
/// `max_attempts == 0` checks once and never sleeps.
pub async fn wait_until<F>(
    mut predicate: F,
    max_attempts: u32,
    interval: Duration,
) -> Result<(), WaitTimeout>
where
    F: FnMut() -> bool,
{
    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        if predicate() {
            return Ok(());
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    Err(WaitTimeout { attempts, interval })
}
