mod kind;
mod kinds;
mod reconcile;

pub use crate::kind::ResourceKind;
pub use crate::kinds::scaling_policy::{ScalingPolicy, ScalingPolicyStatus};
pub use crate::reconcile::{ReconcileError, Reconciler};
