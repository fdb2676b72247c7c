//! Fixed-delay retry for fallible async operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Invoke `op` up to `max_attempts` times, sleeping `delay` between
/// attempts. The first success wins; once attempts are exhausted the last
/// error surfaces. `op` runs at least once.
pub async fn retry_with_delay<T, E, F, Fut>(
    label: &str,
    max_attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_attempts {
                    return Err(err);
                }
                debug!(label, attempt, max_attempts, error = %err, "Retrying after delay");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingRunner {
        initial_fails: i32,
        calls: AtomicU32,
    }

    impl FailingRunner {
        fn new(initial_fails: i32) -> Self {
            Self {
                initial_fails,
                calls: AtomicU32::new(0),
            }
        }

        async fn run(&self) -> Result<(), String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as i32;
            if self.initial_fails < 0 || call < self.initial_fails {
                Err("failure".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_never_failing_runs_once() {
        let runner = FailingRunner::new(0);
        retry_with_delay("run runner", 5, Duration::from_millis(1), || runner.run())
            .await
            .unwrap();
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fails_once_then_succeeds() {
        let runner = FailingRunner::new(1);
        retry_with_delay("run runner", 5, Duration::from_millis(1), || runner.run())
            .await
            .unwrap();
        // no further invocations after the first success
        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_always_failing_exhausts_attempts() {
        let runner = FailingRunner::new(-1);
        let err = retry_with_delay("run runner", 5, Duration::from_millis(1), || runner.run())
            .await
            .unwrap_err();
        assert_eq!(err, "failure");
        assert_eq!(runner.calls.load(Ordering::SeqCst), 5);
    }
}
