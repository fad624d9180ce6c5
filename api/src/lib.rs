mod client;
mod error;
mod state;
mod value;

pub use crate::client::RemoteApi;
pub use crate::error::{ApiError, ErrorCode};
pub use crate::state::{ObservedState, OperationRequest, ResourceId};
pub use crate::value::{DesiredConfig, FieldName, FieldValue};
