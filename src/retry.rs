use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const INITIAL_RETRY_DELAY_MS: u64 = 500;
pub const MAX_RETRY_DELAY_MS: u64 = 8000;

/// Exponential backoff for the given retry attempt (1-based).
pub fn retry_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    let delay = INITIAL_RETRY_DELAY_MS.saturating_mul(1 << shift);
    Duration::from_millis(delay.min(MAX_RETRY_DELAY_MS))
}

/// Runs `op` until it succeeds, fails with an error `should_retry` rejects,
/// or `max_retries` extra attempts have been spent.
pub fn with_retry<T, F, P>(label: &str, max_retries: u32, should_retry: P, op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
    P: Fn(&Error) -> bool,
{
    with_retry_sleep(label, max_retries, should_retry, op, thread::sleep)
}

fn with_retry_sleep<T, F, P, S>(
    label: &str,
    max_retries: u32,
    should_retry: P,
    mut op: F,
    mut sleep: S,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
    P: Fn(&Error) -> bool,
    S: FnMut(Duration),
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries && should_retry(&err) => {
                attempt += 1;
                let delay = retry_delay(attempt);
                log::warn!(
                    "{label} failed ({err}); retry {attempt}/{max_retries} in {}ms",
                    delay.as_millis()
                );
                sleep(delay);
            }
            Err(err) => return Err(err),
        }
    }
}
