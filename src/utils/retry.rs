//! Retry utilities: backoff builders and retryable error classification.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Backoff for opening storage connections at startup.
///
/// - Min delay: 50ms
/// - Max delay: 2s
/// - Max attempts: 8
/// - Jitter enabled
pub fn storage_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(8)
        .with_jitter()
}

/// Determines if a connection error is worth retrying.
///
/// Retryable:
/// - I/O errors and pool timeouts (database file busy, slow disk)
///
/// Non-retryable:
/// - Configuration errors and everything else. These will never succeed on retry.
#[cfg(feature = "sqlite")]
pub fn is_retryable_connect_error(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
}
