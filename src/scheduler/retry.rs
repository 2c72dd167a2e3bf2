//! Retry of transient I/O failures.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::config::RetryPolicy;
use crate::error::Result;

/// Run `op`, retrying retriable errors with exponential backoff
pub fn with_backoff<T, F>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() && attempt < policy.max_attempts => {
                let backoff = policy.backoff_ms(attempt);
                warn!(what, attempt, backoff_ms = backoff, error = %e, "transient failure, retrying");
                thread::sleep(Duration::from_millis(backoff));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
