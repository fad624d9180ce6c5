use std::fmt::{Debug, Display};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use converge_api::{ApiError, ObservedState};

/// Declares what a wait is converging towards.
///
/// `pending` and `target` must be disjoint. A status outside both sets is a
/// terminal failure: an unexpected status is never silently treated as
/// progress.
#[derive(Debug, Clone)]
pub struct WaitSpec<S> {
    pub pending: Vec<S>,
    pub target: Vec<S>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub initial_delay: Duration,
    /// Whether a missing resource counts as having reached the target.
    /// Set for deletion waits; everywhere else a disappearance is a failure.
    pub missing_is_target: bool,
}

impl<S> WaitSpec<S> {
    pub fn new(pending: Vec<S>, target: Vec<S>) -> Self {
        Self {
            pending,
            target,
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(10),
            initial_delay: Duration::ZERO,
            missing_is_target: false,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Grace period before the first poll, for remotes whose status does not
    /// yet reflect a just-issued operation.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn for_deletion(mut self) -> Self {
        self.missing_is_target = true;
        self
    }
}

/// One poll of a remote resource's observable status.
///
/// `Ok(None)` means the remote reports the resource gone. Implementations
/// fold a not-found describe error into `Ok(None)` as well; any other error
/// propagates: retrying a failed refresh is the retrier's job, composed by
/// the orchestrator, never this layer's.
#[async_trait]
pub trait Refresh: Send {
    type Status: Clone + PartialEq + Debug + Display + Send + Sync;

    async fn poll(&mut self) -> Result<Option<(ObservedState, Self::Status)>, ApiError>;
}

#[derive(Debug, Error, PartialEq)]
pub enum WaitError {
    /// The resource moved to a status outside both the pending and target
    /// sets, a permanent failure as far as this wait is concerned.
    #[error("unexpected status {status:?}")]
    UnexpectedStatus {
        status: String,
        last: Option<ObservedState>,
    },

    #[error("resource no longer exists")]
    Gone,

    #[error("timed out after {waited:?} (last status: {last_status:?})")]
    Timeout {
        waited: Duration,
        last_status: Option<String>,
        last: Option<ObservedState>,
    },

    #[error("cancelled while waiting")]
    Cancelled,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Poll `refresh` until the resource reaches a target status.
///
/// Polls are strictly sequential. Terminal outcomes are exactly: target
/// reached (`Ok(Some(state))`), resource gone (`Ok(None)` iff the spec is a
/// deletion wait, else [`WaitError::Gone`]), unexpected status, timeout
/// carrying the last observed state for diagnostics, cancellation, or a
/// refresh error.
#[tracing::instrument(skip_all, fields(timeout = ?spec.timeout))]
pub async fn wait_for<R: Refresh>(
    refresh: &mut R,
    spec: &WaitSpec<R::Status>,
    cancel: &CancellationToken,
) -> Result<Option<ObservedState>, WaitError> {
    debug_assert!(
        spec.pending.iter().all(|s| !spec.target.contains(s)),
        "pending and target statuses must be disjoint"
    );

    let start = Instant::now();

    if !spec.initial_delay.is_zero() {
        tokio::select! {
            () = sleep(spec.initial_delay) => {}
            () = cancel.cancelled() => return Err(WaitError::Cancelled),
        }
    }

    let mut last: Option<(ObservedState, R::Status)> = None;

    loop {
        if cancel.is_cancelled() {
            return Err(WaitError::Cancelled);
        }

        match refresh.poll().await {
            Err(error) if error.is_not_found() => return gone(spec),
            Err(error) => return Err(WaitError::Api(error)),
            Ok(None) => return gone(spec),
            Ok(Some((state, status))) => {
                if spec.target.contains(&status) {
                    debug!(%status, "target status reached");
                    return Ok(Some(state));
                }
                if !spec.pending.contains(&status) {
                    warn!(%status, "status outside pending and target sets");
                    return Err(WaitError::UnexpectedStatus {
                        status: status.to_string(),
                        last: Some(state),
                    });
                }
                trace!(%status, "still pending");
                last = Some((state, status));
            }
        }

        if start.elapsed() + spec.poll_interval >= spec.timeout {
            let (last, last_status) = match last {
                Some((state, status)) => (Some(state), Some(status.to_string())),
                None => (None, None),
            };
            return Err(WaitError::Timeout {
                waited: start.elapsed(),
                last_status,
                last,
            });
        }

        tokio::select! {
            () = sleep(spec.poll_interval) => {}
            () = cancel.cancelled() => return Err(WaitError::Cancelled),
        }
    }
}

fn gone<S>(spec: &WaitSpec<S>) -> Result<Option<ObservedState>, WaitError> {
    if spec.missing_is_target {
        debug!("resource gone, which is the target");
        Ok(None)
    } else {
        Err(WaitError::Gone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;

    use converge_api::{ErrorCode, ResourceId};

    enum Step {
        Status(&'static str),
        Missing,
        Error(ApiError),
    }

    struct Scripted {
        script: VecDeque<Step>,
        polls: usize,
    }

    impl Scripted {
        fn new(script: impl IntoIterator<Item = Step>) -> Self {
            Self {
                script: script.into_iter().collect(),
                polls: 0,
            }
        }
    }

    #[async_trait]
    impl Refresh for Scripted {
        type Status = &'static str;

        async fn poll(&mut self) -> Result<Option<(ObservedState, &'static str)>, ApiError> {
            self.polls += 1;
            match self.script.pop_front().expect("script exhausted") {
                Step::Status(code) => {
                    Ok(Some((ObservedState::new(ResourceId::new("res-1"), code), code)))
                }
                Step::Missing => Ok(None),
                Step::Error(error) => Err(error),
            }
        }
    }

    fn spec() -> WaitSpec<&'static str> {
        WaitSpec::new(vec!["Pending"], vec!["Available"])
            .timeout(Duration::from_secs(300))
            .poll_interval(Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn converges_on_target() {
        let mut refresh = Scripted::new([
            Step::Status("Pending"),
            Step::Status("Pending"),
            Step::Status("Available"),
        ]);

        let state = wait_for(&mut refresh, &spec(), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(refresh.polls, 3);
        assert_eq!(state.status, "Available");
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_status_fails_without_waiting_for_timeout() {
        let mut refresh = Scripted::new([Step::Status("Pending"), Step::Status("Failed")]);

        let started = Instant::now();
        let error = wait_for(&mut refresh, &spec(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(refresh.polls, 2);
        assert!(started.elapsed() < Duration::from_secs(60));
        match error {
            WaitError::UnexpectedStatus { status, last } => {
                assert_eq!(status, "Failed");
                assert_eq!(last.unwrap().status, "Failed");
            }
            other => panic!("expected UnexpectedStatus, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_is_success_for_deletion_waits() {
        let mut refresh = Scripted::new([Step::Status("Pending"), Step::Missing]);
        let spec = WaitSpec::new(vec!["Pending"], vec!["Deleted"]).for_deletion();

        let state = wait_for(&mut refresh, &spec, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(refresh.polls, 2);
        assert!(state.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_error_folds_into_missing() {
        let mut refresh = Scripted::new([Step::Error(ApiError::not_found("gone"))]);
        let spec = WaitSpec::new(vec!["Pending"], vec!["Deleted"]).for_deletion();

        let state = wait_for(&mut refresh, &spec, &CancellationToken::new())
            .await
            .unwrap();
        assert!(state.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_errors_propagate_without_retrying() {
        let boom = ApiError::new(ErrorCode::Internal, "service unavailable");
        let mut refresh = Scripted::new([Step::Error(boom.clone())]);

        let error = wait_for(&mut refresh, &spec(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(refresh.polls, 1);
        assert_eq!(error, WaitError::Api(boom));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_fails_outside_deletion_waits() {
        let mut refresh = Scripted::new([Step::Missing]);

        let error = wait_for(&mut refresh, &spec(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(error, WaitError::Gone);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_carrying_the_last_state() {
        let mut refresh = Scripted::new([
            Step::Status("Pending"),
            Step::Status("Pending"),
            Step::Status("Pending"),
        ]);
        let spec = spec().timeout(Duration::from_secs(30));

        let error = wait_for(&mut refresh, &spec, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(refresh.polls, 3);
        match error {
            WaitError::Timeout {
                last_status, last, ..
            } => {
                assert_eq!(last_status.as_deref(), Some("Pending"));
                assert_eq!(last.unwrap().status, "Pending");
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn initial_delay_precedes_the_first_poll() {
        let mut refresh = Scripted::new([Step::Status("Available")]);
        let spec = spec().initial_delay(Duration::from_secs(10));

        let started = Instant::now();
        wait_for(&mut refresh, &spec, &CancellationToken::new())
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(refresh.polls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_pending_wait() {
        let mut refresh = Scripted::new([
            Step::Status("Pending"),
            Step::Status("Pending"),
            Step::Status("Pending"),
        ]);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(15)).await;
            trigger.cancel();
        });

        let error = wait_for(&mut refresh, &spec(), &cancel).await.unwrap_err();
        assert_eq!(error, WaitError::Cancelled);
    }
}
