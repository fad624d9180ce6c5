use async_trait::async_trait;

use crate::error::ApiError;
use crate::state::{ObservedState, OperationRequest, ResourceId};

/// The remote management API, as the reconciliation engine consumes it.
///
/// Implementations are injected explicitly into each pipeline (never shared
/// through globals) so they can be substituted in tests. Errors must carry a
/// machine-readable [`ErrorCode`](crate::ErrorCode) so the retrier and waiter
/// can classify them.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Create the resource and return its remote identifier.
    async fn create(&self, request: &OperationRequest) -> Result<ResourceId, ApiError>;

    /// Fetch the current remote snapshot of the resource.
    async fn describe(&self, id: &ResourceId) -> Result<ObservedState, ApiError>;

    /// Apply a (partial) modification.
    async fn modify(&self, id: &ResourceId, request: &OperationRequest) -> Result<(), ApiError>;

    /// Delete the resource.
    async fn delete(&self, id: &ResourceId) -> Result<(), ApiError>;
}
