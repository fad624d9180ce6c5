use std::fmt::{self, Display};

use thiserror::Error;

/// Machine-readable category of a remote API error.
///
/// Remote services report stringly-typed error codes; `from_remote` is the
/// single translation point into this closed vocabulary. Codes we do not
/// recognize land in `Other` and are never considered transient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    /// The resource (or a dependency of it) does not exist.
    NotFound,
    /// The caller is being rate limited.
    Throttled,
    /// A dependent resource (e.g. an access role) has not propagated yet.
    DependencyNotReady,
    /// The resource is still finishing a prior mutation.
    ResourceInUse,
    /// An account or service quota was exceeded.
    LimitExceeded,
    /// The request was rejected as malformed or contradictory.
    InvalidRequest,
    /// The remote service failed internally.
    Internal,
    /// Unrecognized remote code, carried verbatim.
    Other(String),
}

impl ErrorCode {
    pub fn from_remote(code: &str) -> Self {
        match code {
            "NotFoundException"
            | "ResourceNotFoundException"
            | "ObjectNotFoundException"
            | "NoSuchEntity" => ErrorCode::NotFound,
            "ThrottlingException" | "TooManyRequestsException" | "RequestLimitExceeded" => {
                ErrorCode::Throttled
            }
            "DependencyNotReadyException" | "InvalidRoleException" => {
                ErrorCode::DependencyNotReady
            }
            "ResourceInUseException" | "ConcurrentUpdateException" | "ConflictException" => {
                ErrorCode::ResourceInUse
            }
            "LimitExceededException" | "QuotaExceededException" => ErrorCode::LimitExceeded,
            "ValidationException" | "InvalidParameterException" | "BadRequestException" => {
                ErrorCode::InvalidRequest
            }
            "InternalServiceException" | "ServiceUnavailableException" => ErrorCode::Internal,
            other => ErrorCode::Other(other.to_owned()),
        }
    }

    /// Whether errors with this code denote a transient condition worth
    /// retrying. Unknown codes are always non-retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::Throttled | ErrorCode::DependencyNotReady | ErrorCode::ResourceInUse
        )
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::NotFound => "not found",
            ErrorCode::Throttled => "throttled",
            ErrorCode::DependencyNotReady => "dependency not ready",
            ErrorCode::ResourceInUse => "resource in use",
            ErrorCode::LimitExceeded => "limit exceeded",
            ErrorCode::InvalidRequest => "invalid request",
            ErrorCode::Internal => "internal service error",
            ErrorCode::Other(code) => code.as_str(),
        };
        f.write_str(name)
    }
}

/// An error returned by the remote management API.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Build from a raw remote code and message.
    pub fn from_remote(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::from_remote(code), message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::NotFound
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Substring match against the remote message, for call sites that need
    /// to recognize eventual-consistency conditions the code alone does not
    /// distinguish.
    pub fn message_contains(&self, needle: &str) -> bool {
        self.message.contains(needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_codes_translate() {
        assert_eq!(
            ErrorCode::from_remote("ObjectNotFoundException"),
            ErrorCode::NotFound
        );
        assert_eq!(
            ErrorCode::from_remote("ConcurrentUpdateException"),
            ErrorCode::ResourceInUse
        );
        assert_eq!(
            ErrorCode::from_remote("SomethingNovel"),
            ErrorCode::Other("SomethingNovel".to_owned())
        );
    }

    #[test]
    fn unknown_codes_are_not_retryable() {
        assert!(!ErrorCode::from_remote("SomethingNovel").is_retryable());
        assert!(!ErrorCode::NotFound.is_retryable());
        assert!(ErrorCode::Throttled.is_retryable());
    }
}
