use std::fmt::{self, Display};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::{FieldName, FieldValue};

/// Remote identifier of a resource, assigned once at creation and never
/// reassigned afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Snapshot of a remote resource as last fetched by `describe`.
///
/// `status` is the raw remote status code; translation into a per-kind status
/// enum happens at the lifecycle layer. A snapshot is replaced wholesale on
/// every refresh, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    pub id: ResourceId,
    pub status: String,
    pub fields: IndexMap<FieldName, FieldValue>,
}

impl ObservedState {
    pub fn new(id: impl Into<ResourceId>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            fields: IndexMap::new(),
        }
    }

    pub fn with_field(
        mut self,
        name: impl Into<FieldName>,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// Payload for a create or modify call, derived deterministically from the
/// desired configuration. A modify payload carries only the changed fields so
/// the remote keeps its current values for everything omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationRequest {
    pub fields: IndexMap<FieldName, FieldValue>,
}

impl OperationRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(FieldName, FieldValue)> for OperationRequest {
    fn from_iter<I: IntoIterator<Item = (FieldName, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
