use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Runs `operation` up to `max_attempts` times, sleeping `base_delay * attempt`
/// between tries. Returns the first success or the last error. Only use with
/// operations that are safe to repeat.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts => {
                warn!(
                    "Operation failed (attempt {}/{}): {}, retrying",
                    attempt, max_attempts, err
                );
                tokio::time::sleep(base_delay * attempt).await;
            }
            Err(err) => return Err(err),
        }
    }
}
