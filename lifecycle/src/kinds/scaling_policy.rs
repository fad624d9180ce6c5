use std::fmt::{self, Display};
use std::time::Duration;

use converge_api::ApiError;
use converge_diff::ModeRule;
use converge_wait::WaitSpec;

use crate::kind::ResourceKind;

/// Auto-scaling policy resource family.
///
/// Two modes: `Simple` takes a flat `adjustment`, `Step` takes a list of
/// `step_intervals`. The two field groups are mutually exclusive.
pub struct ScalingPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalingPolicyStatus {
    CreationInProgress,
    Active,
    ActiveWithProblems,
    CreationFailed,
    UpdateInProgress,
    UpdateFailed,
    DeletionInProgress,
    DeletionFailed,
    Deleted,
    /// Remote code we do not recognize; outside every pending/target set.
    Unknown(String),
}

impl ScalingPolicyStatus {
    fn from_remote(code: &str) -> Self {
        use ScalingPolicyStatus::*;
        match code {
            "CreationInProgress" => CreationInProgress,
            "Active" => Active,
            "ActiveWithProblems" => ActiveWithProblems,
            "CreationFailed" => CreationFailed,
            "UpdateInProgress" => UpdateInProgress,
            "UpdateFailed" => UpdateFailed,
            "DeletionInProgress" => DeletionInProgress,
            "DeletionFailed" => DeletionFailed,
            "Deleted" => Deleted,
            other => Unknown(other.to_owned()),
        }
    }
}

impl Display for ScalingPolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ScalingPolicyStatus::*;
        let code = match self {
            CreationInProgress => "CreationInProgress",
            Active => "Active",
            ActiveWithProblems => "ActiveWithProblems",
            CreationFailed => "CreationFailed",
            UpdateInProgress => "UpdateInProgress",
            UpdateFailed => "UpdateFailed",
            DeletionInProgress => "DeletionInProgress",
            DeletionFailed => "DeletionFailed",
            Deleted => "Deleted",
            Unknown(code) => code.as_str(),
        };
        f.write_str(code)
    }
}

impl ResourceKind for ScalingPolicy {
    type Status = ScalingPolicyStatus;

    fn name() -> &'static str {
        "scaling-policy"
    }

    fn status_from_remote(code: &str) -> Self::Status {
        ScalingPolicyStatus::from_remote(code)
    }

    fn rules() -> Vec<ModeRule> {
        vec![
            ModeRule::new("mode", "Simple")
                .requires("adjustment")
                .forbids("step_intervals"),
            ModeRule::new("mode", "Step")
                .requires("step_intervals")
                .forbids("adjustment"),
        ]
    }

    fn retryable(error: &ApiError) -> bool {
        // IAM propagation surfaces as a validation error with a telltale
        // message rather than a dedicated code.
        error.is_retryable()
            || error.message_contains("Unable to assume IAM role")
            || error.message_contains("is not authorized to perform")
    }

    fn create_wait() -> WaitSpec<Self::Status> {
        use ScalingPolicyStatus::*;
        WaitSpec::new(vec![CreationInProgress], vec![Active, ActiveWithProblems])
            .timeout(Duration::from_secs(300))
            .poll_interval(Duration::from_secs(5))
            .initial_delay(Duration::from_secs(10))
    }

    fn update_wait() -> WaitSpec<Self::Status> {
        use ScalingPolicyStatus::*;
        WaitSpec::new(vec![UpdateInProgress], vec![Active, ActiveWithProblems])
            .timeout(Duration::from_secs(300))
            .poll_interval(Duration::from_secs(5))
            .initial_delay(Duration::from_secs(10))
    }

    fn delete_wait() -> WaitSpec<Self::Status> {
        use ScalingPolicyStatus::*;
        WaitSpec::new(vec![DeletionInProgress], vec![Deleted])
            .timeout(Duration::from_secs(300))
            .poll_interval(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use converge_api::ErrorCode;

    #[test]
    fn unknown_codes_stay_outside_the_vocabulary() {
        let status = ScalingPolicyStatus::from_remote("SomethingNew");
        assert_eq!(status, ScalingPolicyStatus::Unknown("SomethingNew".into()));
        assert!(!ScalingPolicy::create_wait().pending.contains(&status));
        assert!(!ScalingPolicy::create_wait().target.contains(&status));
    }

    #[test]
    fn iam_propagation_is_transient() {
        let error = ApiError::new(
            ErrorCode::InvalidRequest,
            "Unable to assume IAM role: arn:aws:iam::123:role/scaling",
        );
        assert!(ScalingPolicy::retryable(&error));

        let error = ApiError::new(ErrorCode::InvalidRequest, "adjustment out of range");
        assert!(!ScalingPolicy::retryable(&error));
    }
}
