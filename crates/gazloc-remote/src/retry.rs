//! Exponential back-off for full-directory fetches.
//!
//! The change feed does not use this: it resubscribes on a fixed delay
//! forever (see [`crate::client`]). Fetches get a bounded retry budget.

use std::future::Future;
use std::time::Duration;

use crate::error::RemoteError;

const MAX_DELAY_MS: u64 = 60_000;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:** transport failures, HTTP 429, HTTP 5xx.
///
/// **Not retriable:** other statuses, undecodable bodies, bad URLs.
pub(crate) fn is_retriable(err: &RemoteError) -> bool {
    match err {
        RemoteError::Http(_) | RemoteError::RateLimited { .. } => true,
        RemoteError::UnexpectedStatus { status, .. } => *status >= 500,
        RemoteError::Deserialize { .. }
        | RemoteError::StreamClosed { .. }
        | RemoteError::InvalidUrl { .. } => false,
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`
/// seconds with ±25 % jitter, capped at 60 s. A server-provided
/// `Retry-After` raises the floor.
fn backoff_delay(backoff_base_secs: u64, attempt: u32, err: &RemoteError) -> Duration {
    let computed = backoff_base_secs
        .saturating_mul(1000)
        .saturating_mul(1u64 << (attempt.saturating_sub(1)).min(10));
    let floor = match err {
        RemoteError::RateLimited {
            retry_after_secs: Some(secs),
        } => secs.saturating_mul(1000),
        _ => 0,
    };
    let capped = computed.max(floor).min(MAX_DELAY_MS);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let jittered = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
    Duration::from_millis(jittered)
}

/// Runs `operation` with up to `max_retries` additional attempts on
/// transient errors. Non-retriable errors are returned immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay = backoff_delay(backoff_base_secs, attempt, &err);
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient remote directory error, retrying after back-off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
