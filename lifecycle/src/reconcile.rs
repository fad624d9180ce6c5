use std::marker::PhantomData;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use converge_api::{ApiError, DesiredConfig, ObservedState, RemoteApi, ResourceId};
use converge_diff::{ValidationError, create_request, plan, update_request, validate};
use converge_retry::{RetryError, retry};
use converge_wait::{Refresh, WaitError, WaitSpec, wait_for};

use crate::kind::ResourceKind;

#[derive(Debug, Error, PartialEq)]
pub enum ReconcileError {
    /// Detected locally, before any remote call was issued.
    #[error("invalid configuration for {kind} {name:?}: {source}")]
    Validation {
        kind: &'static str,
        name: String,
        #[source]
        source: ValidationError,
    },

    #[error("{operation} failed for {kind} {resource:?}: {source}")]
    Api {
        kind: &'static str,
        operation: &'static str,
        /// Remote identifier when one was assigned, otherwise the desired
        /// name, so a failed create still tells the caller whether the
        /// remote resource exists.
        resource: String,
        #[source]
        source: ApiError,
    },

    #[error("{operation} failed for {kind} {resource:?}: {source}")]
    Wait {
        kind: &'static str,
        operation: &'static str,
        resource: String,
        #[source]
        source: WaitError,
    },

    #[error("{kind} {resource:?} not found")]
    NotFound {
        kind: &'static str,
        resource: String,
    },

    #[error("reconciliation cancelled")]
    Cancelled,
}

/// Drives one resource family through create / read / update / delete
/// against an injected remote API handle.
///
/// Each reconciliation runs to completion on one logical thread of control;
/// the reconciler shares no mutable state with anything else, so independent
/// resources can reconcile concurrently with their own reconcilers.
pub struct Reconciler<K: ResourceKind, A: RemoteApi> {
    api: A,
    cancel: CancellationToken,
    _kind: PhantomData<K>,
}

impl<K: ResourceKind, A: RemoteApi> Reconciler<K, A> {
    pub fn new(api: A) -> Self {
        Self::with_cancellation(api, CancellationToken::new())
    }

    pub fn with_cancellation(api: A, cancel: CancellationToken) -> Self {
        Self {
            api,
            cancel,
            _kind: PhantomData,
        }
    }

    /// Token observed at every retry and wait iteration boundary.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Create the resource and block until it converges to availability.
    ///
    /// The waiter's final describe doubles as the read-back: the returned
    /// state is the snapshot that satisfied the target status. Secondary
    /// configuration requests declared by the kind are issued afterwards,
    /// each retried and waited on in turn.
    #[tracing::instrument(skip_all, fields(kind = K::name()))]
    pub async fn create(&self, desired: &DesiredConfig) -> Result<ObservedState, ReconcileError> {
        let name = desired_name(desired);
        self.validate(desired, &name)?;

        let request = create_request(desired);
        let retry_spec = K::retry_spec();
        let id = retry(&retry_spec, &self.cancel, K::retryable, || {
            self.api.create(&request)
        })
        .await
        .map_err(|error| self.surface("create", &name, error))?;
        info!(%id, "created, waiting for availability");

        let mut state = self
            .wait("create", &id, K::create_wait())
            .await?
            .ok_or_else(|| ReconcileError::NotFound {
                kind: K::name(),
                resource: id.to_string(),
            })?;

        for request in K::secondary_requests(desired) {
            debug!(%id, "applying secondary configuration");
            retry(&retry_spec, &self.cancel, K::retryable, || {
                self.api.modify(&id, &request)
            })
            .await
            .map_err(|error| self.surface("configure", id.as_str(), error))?;

            state = self
                .wait("configure", &id, K::update_wait())
                .await?
                .ok_or_else(|| ReconcileError::NotFound {
                    kind: K::name(),
                    resource: id.to_string(),
                })?;
        }

        Ok(state)
    }

    /// Fetch the current remote state. `Ok(None)` means the resource no
    /// longer exists and should be dropped from tracking, not an error.
    #[tracing::instrument(skip_all, fields(kind = K::name(), id = %id))]
    pub async fn read(&self, id: &ResourceId) -> Result<Option<ObservedState>, ReconcileError> {
        match self.api.describe(id).await {
            Ok(state) => Ok(Some(state)),
            Err(error) if error.is_not_found() => {
                debug!(%id, "remote resource gone, dropping from tracking");
                Ok(None)
            }
            Err(source) => Err(ReconcileError::Api {
                kind: K::name(),
                operation: "describe",
                resource: id.to_string(),
                source,
            }),
        }
    }

    /// Apply only what changed between `last_applied` and `desired`.
    ///
    /// An empty diff issues no network call beyond the initial read and
    /// returns the current state unchanged. The same holds when every
    /// changed field is a removal: a partial modify payload cannot express
    /// an absent field, so nothing is sent and the remote keeps its value.
    #[tracing::instrument(skip_all, fields(kind = K::name(), id = %id))]
    pub async fn update(
        &self,
        id: &ResourceId,
        desired: &DesiredConfig,
        last_applied: &DesiredConfig,
    ) -> Result<ObservedState, ReconcileError> {
        let name = desired_name(desired);
        self.validate(desired, &name)?;

        let current = self
            .read(id)
            .await?
            .ok_or_else(|| ReconcileError::NotFound {
                kind: K::name(),
                resource: id.to_string(),
            })?;

        let changed = plan(desired, last_applied);
        if changed.is_empty() {
            debug!(%id, "configuration unchanged, skipping modify");
            return Ok(current);
        }
        let request = update_request(&changed, desired);
        if request.is_empty() {
            debug!(%id, changed = ?changed, "changed fields are all removals, nothing to send");
            return Ok(current);
        }
        info!(%id, changed = ?changed, "applying partial update");

        retry(&K::retry_spec(), &self.cancel, K::retryable, || {
            self.api.modify(id, &request)
        })
        .await
        .map_err(|error| self.surface("modify", id.as_str(), error))?;

        self.wait("update", id, K::update_wait())
            .await?
            .ok_or_else(|| ReconcileError::NotFound {
                kind: K::name(),
                resource: id.to_string(),
            })
    }

    /// Delete the resource and block until the remote reports it gone.
    /// A resource that is already gone counts as success.
    #[tracing::instrument(skip_all, fields(kind = K::name(), id = %id))]
    pub async fn delete(&self, id: &ResourceId) -> Result<(), ReconcileError> {
        let result = retry(&K::retry_spec(), &self.cancel, K::retryable, || {
            self.api.delete(id)
        })
        .await;

        match result {
            Ok(()) => {}
            Err(RetryError::Operation(error)) if error.is_not_found() => {
                debug!(%id, "already gone");
                return Ok(());
            }
            Err(error) => return Err(self.surface("delete", id.as_str(), error)),
        }

        self.wait("delete", id, K::delete_wait().for_deletion())
            .await?;
        Ok(())
    }

    fn validate(&self, desired: &DesiredConfig, name: &str) -> Result<(), ReconcileError> {
        validate(desired, &K::rules()).map_err(|source| ReconcileError::Validation {
            kind: K::name(),
            name: name.to_owned(),
            source,
        })
    }

    async fn wait(
        &self,
        operation: &'static str,
        id: &ResourceId,
        spec: WaitSpec<K::Status>,
    ) -> Result<Option<ObservedState>, ReconcileError> {
        let mut refresh = DescribeRefresh::<'_, A, K> {
            api: &self.api,
            id: id.clone(),
            _kind: PhantomData,
        };
        wait_for(&mut refresh, &spec, &self.cancel)
            .await
            .map_err(|source| match source {
                WaitError::Cancelled => ReconcileError::Cancelled,
                source => ReconcileError::Wait {
                    kind: K::name(),
                    operation,
                    resource: id.to_string(),
                    source,
                },
            })
    }

    fn surface(
        &self,
        operation: &'static str,
        resource: &str,
        error: RetryError<ApiError>,
    ) -> ReconcileError {
        match error {
            RetryError::Cancelled => ReconcileError::Cancelled,
            RetryError::Operation(source) => ReconcileError::Api {
                kind: K::name(),
                operation,
                resource: resource.to_owned(),
                source,
            },
        }
    }
}

/// Name used in diagnostics before an identifier has been assigned.
fn desired_name(desired: &DesiredConfig) -> String {
    match desired.get("name") {
        Some(value) => value.to_string(),
        None => "<unnamed>".to_owned(),
    }
}

/// Adapts `describe` into the waiter's refresh contract, translating raw
/// status codes into the kind's vocabulary and folding not-found into
/// "gone".
struct DescribeRefresh<'a, A: RemoteApi, K: ResourceKind> {
    api: &'a A,
    id: ResourceId,
    _kind: PhantomData<K>,
}

#[async_trait]
impl<'a, A: RemoteApi, K: ResourceKind> Refresh for DescribeRefresh<'a, A, K> {
    type Status = K::Status;

    async fn poll(&mut self) -> Result<Option<(ObservedState, K::Status)>, ApiError> {
        match self.api.describe(&self.id).await {
            Ok(state) => {
                let status = K::status_from_remote(&state.status);
                Ok(Some((state, status)))
            }
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }
}
