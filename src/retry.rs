//! Retry/backoff for operations whose failure mode is a transient contention
//! error (a concurrent writer winning a CAS race, a flaky network fetch).
//!
//! This is a thin loop, not a generic retry framework: callers decide what's
//! retryable by checking [`crate::Error::is_retryable`] themselves and wrap
//! only the call that needs it, matching how the git layer retries a single
//! ref update rather than an entire multi-step operation.

use std::thread::sleep;
use std::time::Duration;

use crate::error::Error;

/// Call `f` up to `attempts` times (so `attempts = 3` means up to 2 retries
/// after an initial failure), sleeping `delay` between tries. Stops early and
/// returns the error immediately if it is not [`Error::is_retryable`].
pub fn with_retry<T>(attempts: u32, delay: Duration, mut f: impl FnMut() -> Result<T, Error>) -> Result<T, Error> {
    let mut last_err = None;
    for attempt in 0..attempts.max(1) {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                tracing::warn!(target: "gitddb::retry", attempt, error = %e, "retrying after transient failure");
                last_err = Some(e);
                sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(0), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retries_retryable_errors_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, Duration::from_millis(0), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Error::CannotCreateDirectory {
                    path: "x".into(),
                    source: std::io::Error::other("boom"),
                })
            } else {
                Ok(99)
            }
        });
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Error> = with_retry(5, Duration::from_millis(0), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::DocumentNotFound { id: "x".into() })
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
