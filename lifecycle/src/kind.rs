use std::fmt::{Debug, Display};

use converge_api::{ApiError, DesiredConfig, OperationRequest};
use converge_diff::ModeRule;
use converge_retry::RetrySpec;
use converge_wait::WaitSpec;

/// Everything the orchestrator needs to know about one resource family.
///
/// A kind declares its status vocabulary as a closed enum, how remote string
/// codes translate into it, which field combinations its modes allow, which
/// of its remote errors are transient, and what each lifecycle wait converges
/// towards.
pub trait ResourceKind: Send + Sync + 'static {
    /// Closed status vocabulary of this family. Unrecognized remote codes
    /// must map to a variant outside every pending/target set so a wait
    /// fails loudly instead of treating them as progress.
    type Status: Clone + PartialEq + Debug + Display + Send + Sync;

    /// Diagnostic label, attached to every surfaced error.
    fn name() -> &'static str;

    /// The single point where stringly-typed remote status codes enter the
    /// typed vocabulary.
    fn status_from_remote(code: &str) -> Self::Status;

    /// Mutually-exclusive field groups per mode, checked before any remote
    /// call.
    fn rules() -> Vec<ModeRule>;

    /// Which remote errors on create/modify/delete are transient for this
    /// family.
    fn retryable(error: &ApiError) -> bool;

    fn retry_spec() -> RetrySpec {
        RetrySpec::default()
    }

    fn create_wait() -> WaitSpec<Self::Status>;

    fn update_wait() -> WaitSpec<Self::Status>;

    /// Deletion wait; the orchestrator treats a missing resource as the
    /// target here regardless of the spec's flag.
    fn delete_wait() -> WaitSpec<Self::Status>;

    /// Configuration calls not expressible in the create payload, issued
    /// after the resource first becomes available. Each is retried and
    /// waited on like an update.
    fn secondary_requests(_desired: &DesiredConfig) -> Vec<OperationRequest> {
        Vec::new()
    }
}
