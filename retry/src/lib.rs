use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bounds for one retried remote call. The delay between attempts is fixed,
/// not exponential.
#[derive(Debug, Clone)]
pub struct RetrySpec {
    pub timeout: Duration,
    pub delay: Duration,
}

impl RetrySpec {
    pub fn new(timeout: Duration, delay: Duration) -> Self {
        Self { timeout, delay }
    }
}

impl Default for RetrySpec {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RetryError<E> {
    #[error("{0}")]
    Operation(E),

    #[error("cancelled while retrying")]
    Cancelled,
}

impl<E> RetryError<E> {
    pub fn into_operation(self) -> Option<E> {
        match self {
            RetryError::Operation(error) => Some(error),
            RetryError::Cancelled => None,
        }
    }
}

/// Invoke `operation` until it succeeds, returns a non-retryable error, or
/// the deadline passes.
///
/// The first invocation happens immediately. A non-retryable error (per
/// `retryable`) is returned as-is without another attempt. When the deadline
/// would be crossed by waiting out another delay, exactly one final unretried
/// invocation is made and its result returned verbatim. A call that gave up
/// waiting can therefore still succeed if that last attempt does.
///
/// Cancellation is observed at every iteration boundary, during the
/// inter-attempt delay, and before the final attempt, so a cancelled call
/// never issues another remote invocation.
#[tracing::instrument(skip_all, fields(timeout = ?spec.timeout))]
pub async fn retry<T, E, F, Fut>(
    spec: &RetrySpec,
    cancel: &CancellationToken,
    retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let deadline = Instant::now() + spec.timeout;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if retryable(&error) => {
                if Instant::now() + spec.delay >= deadline {
                    if cancel.is_cancelled() {
                        return Err(RetryError::Cancelled);
                    }
                    debug!(%error, "deadline reached, making one last attempt");
                    return operation().await.map_err(RetryError::Operation);
                }
                debug!(%error, delay = ?spec.delay, "transient error, will retry");
            }
            Err(error) => return Err(RetryError::Operation(error)),
        }

        tokio::select! {
            () = sleep(spec.delay) => {}
            () = cancel.cancelled() => return Err(RetryError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq, Error)]
    #[error("{message}")]
    struct FakeError {
        message: &'static str,
        transient: bool,
    }

    fn transient() -> FakeError {
        FakeError {
            message: "still settling",
            transient: true,
        }
    }

    fn permanent() -> FakeError {
        FakeError {
            message: "no such thing",
            transient: false,
        }
    }

    fn spec() -> RetrySpec {
        RetrySpec::new(Duration::from_secs(30), Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn success_returns_immediately() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result = retry(&spec(), &CancellationToken::new(), |_: &FakeError| true, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, FakeError>(42) }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_short_circuits() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result = retry(
            &spec(),
            &CancellationToken::new(),
            |error: &FakeError| error.transient,
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(permanent()) }
            },
        )
        .await;

        assert_eq!(result, Err(RetryError::Operation(permanent())));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_is_bounded() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        // timeout = 3 * delay: attempts at t=0, 10s, 20s, then the deadline
        // check fires and one last attempt is made. 4 total.
        let result = retry(
            &spec(),
            &CancellationToken::new(),
            |error: &FakeError| error.transient,
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>(transient()) }
            },
        )
        .await;

        assert_eq!(result, Err(RetryError::Operation(transient())));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn last_attempt_can_still_succeed() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result = retry(
            &spec(),
            &CancellationToken::new(),
            |error: &FakeError| error.transient,
            || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 4 {
                        Err(transient())
                    } else {
                        Ok("made it")
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok("made it"));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_before_any_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        let result = retry(&spec(), &cancel, |_: &FakeError| true, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, FakeError>(1) }
        })
        .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_at_the_deadline_skips_the_last_attempt() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();

        // The third attempt lands right at the deadline check; cancelling
        // from inside it must win over the last-chance invocation.
        let result = retry(
            &spec(),
            &cancel,
            |error: &FakeError| error.transient,
            || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt == 3 {
                    trigger.cancel();
                }
                async { Err::<i32, _>(transient()) }
            },
        )
        .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_delay() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let result = retry(
            &spec(),
            &cancel,
            |error: &FakeError| error.transient,
            || async { Err::<i32, _>(transient()) },
        )
        .await;

        assert_eq!(result, Err(RetryError::Cancelled));
    }
}
