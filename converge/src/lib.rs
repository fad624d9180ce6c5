//! Reconciliation engine for remote, eventually-consistent resources.
//!
//! The pieces compose bottom-up: [`retry`] absorbs transient remote errors,
//! [`wait_for`] polls a resource until it converges to a target status,
//! [`plan`] computes the minimal set of changed fields, and [`Reconciler`]
//! sequences them into create / read / update / delete pipelines per
//! [`ResourceKind`]. [`Store`] keeps the last-applied configuration between
//! runs so the next reconciliation has a diff baseline.

use directories::ProjectDirs;

pub use converge_api::{
    ApiError, DesiredConfig, ErrorCode, FieldName, FieldValue, ObservedState, OperationRequest,
    RemoteApi, ResourceId,
};
pub use converge_diff::{
    ModeRule, ValidationError, Violation, create_request, plan, update_request, validate,
};
pub use converge_lifecycle::{
    ReconcileError, Reconciler, ResourceKind, ScalingPolicy, ScalingPolicyStatus,
};
pub use converge_retry::{RetryError, RetrySpec, retry};
pub use converge_store::{Snapshot, Store, StoreError};
pub use converge_wait::{Refresh, WaitError, WaitSpec, wait_for};

/// Snapshot store in the platform's data directory, or `None` when no home
/// directory can be determined.
pub fn default_store() -> Option<Store> {
    let project_dirs = ProjectDirs::from("dev", "Converge Org", "Converge")?;
    Some(Store::new(project_dirs.data_dir().join("snapshots")))
}
