//! Error types for the multicloud reconciliation client.
//!
//! Every failure class of the reconciliation cycle has its own variant so
//! callers can decide programmatically whether to retry, abort or surface
//! the problem to a human.

use std::path::PathBuf;
use thiserror::Error;

use crate::planner::{FieldDiff, describe_diffs};

/// The main error type for the multicloud client.
#[derive(Debug, Error)]
pub enum MultiCloudError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The desired resource failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Transport and API errors.
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Long-running operation errors.
    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Local state errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration or manifest file was not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation of the client configuration failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// An environment override could not be applied.
    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnvVar {
        /// Name of the variable.
        name: String,
        /// The rejected value.
        value: String,
    },
}

/// Errors raised while validating a desired resource.
///
/// These are terminal and never retried.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{resource}: required field '{field}' is not set")]
    MissingRequiredField {
        /// Resource kind being validated.
        resource: String,
        /// Dotted path of the missing field.
        field: String,
    },

    /// More than one member of a mutually exclusive group is set.
    #[error("{resource}: only one of [{}] may be set", .fields.join(", "))]
    ConflictingFields {
        /// Resource kind being validated.
        resource: String,
        /// Members of the group.
        fields: Vec<String>,
    },

    /// None of the members of an exactly-one-of group is set.
    #[error("{resource}: exactly one of [{}] must be set", .fields.join(", "))]
    MissingOneOf {
        /// Resource kind being validated.
        resource: String,
        /// Members of the group.
        fields: Vec<String>,
    },

    /// The resource could not be converted to or from its tree form.
    #[error("{resource}: malformed resource: {message}")]
    Malformed {
        /// Resource kind being validated.
        resource: String,
        /// Description of the problem.
        message: String,
    },
}

/// Transport and API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The resource does not exist.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Path of the missing resource.
        resource: String,
    },

    /// The backend rejected a concurrent modification.
    #[error("Concurrent modification of {resource}: {message}")]
    Conflict {
        /// Path of the contended resource.
        resource: String,
        /// Message returned by the backend.
        message: String,
    },

    /// API request failed.
    #[error("API request failed: {status} - {message}")]
    RequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// Rate limited.
    #[error("API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Errors raised while waiting on a long-running operation.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The operation finished with a remote failure.
    #[error("Operation {operation} failed with code {code}: {message}")]
    Failed {
        /// Operation name.
        operation: String,
        /// Remote status code.
        code: i32,
        /// Remote error message.
        message: String,
    },

    /// The operation did not reach a terminal state in time.
    #[error("Timed out after {elapsed_secs}s waiting for operation {operation}")]
    Timeout {
        /// Operation name.
        operation: String,
        /// Seconds spent waiting.
        elapsed_secs: u64,
    },

    /// Waiting was cancelled by the caller.
    #[error("Cancelled while waiting for operation {operation}")]
    Cancelled {
        /// Operation name.
        operation: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The resource exists and at least one difference requires recreation.
    #[error("Infeasible update of {resource}: {} require recreation", describe_diffs(.diffs))]
    InfeasibleUpdate {
        /// Path of the resource.
        resource: String,
        /// Differences that require recreation.
        diffs: Vec<FieldDiff>,
    },

    /// A difference names an operation with no registered handler.
    #[error("Unknown update operation '{operation}' for {resource}")]
    UnknownOperation {
        /// Path of the resource.
        resource: String,
        /// The unregistered operation name.
        operation: String,
    },

    /// Creation is forbidden by the lifecycle policy.
    #[error("Creation of {resource} is blocked by lifecycle policy")]
    CreationBlocked {
        /// Path of the resource.
        resource: String,
    },

    /// Adopting an existing resource is forbidden by the lifecycle policy.
    #[error("Acquiring existing {resource} is blocked by lifecycle policy")]
    AcquireBlocked {
        /// Path of the resource.
        resource: String,
    },

    /// Modification is forbidden by the lifecycle policy.
    #[error("Modification of {resource} is blocked by lifecycle policy: {}", describe_diffs(.diffs))]
    ModificationBlocked {
        /// Path of the resource.
        resource: String,
        /// Differences that would have been applied.
        diffs: Vec<FieldDiff>,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The resource was mutated but did not converge.
    #[error("{resource} did not converge, residual differences: {}", describe_diffs(.diffs))]
    ResidualDiffs {
        /// Path of the resource.
        resource: String,
        /// Differences still present after apply.
        diffs: Vec<FieldDiff>,
    },

    /// The resource was still visible after delete.
    #[error("{resource} still exists after delete ({attempts} checks)")]
    NotDeleted {
        /// Path of the resource.
        resource: String,
        /// Number of confirmation reads performed.
        attempts: u32,
    },

    /// The conflict retry budget was exhausted.
    #[error("Maximum retry attempts ({attempts}) exceeded for {resource}: {last_error}")]
    MaxRetriesExceeded {
        /// Number of attempts made.
        attempts: u32,
        /// Resource that failed.
        resource: String,
        /// The last conflict seen.
        last_error: String,
    },

    /// The overall apply deadline elapsed.
    #[error("Reconciliation of {resource} exceeded its deadline of {deadline_secs}s")]
    Timeout {
        /// Resource being reconciled.
        resource: String,
        /// Configured deadline in seconds.
        deadline_secs: u64,
    },

    /// Reconciliation was cancelled by the caller.
    #[error("Reconciliation of {resource} was cancelled")]
    Cancelled {
        /// Resource being reconciled.
        resource: String,
    },

    /// Deleting a set of resources failed for some members.
    #[error("Failed to delete {} resource(s): {}", .failures.len(), .failures.join("; "))]
    DeleteAllFailed {
        /// One message per failed resource.
        failures: Vec<String>,
    },
}

/// Local state errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Writing state failed.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Result type alias for multicloud operations.
pub type Result<T> = std::result::Result<T, MultiCloudError>;

impl MultiCloudError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error signals a concurrent modification.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Api(ApiError::Conflict { .. }))
    }

    /// Returns true if this error means the resource does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api(ApiError::NotFound { .. }))
    }

    /// Returns true if this error is a transient transport failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Api(ApiError::RateLimited { .. } | ApiError::Network { .. }) => true,
            Self::Api(ApiError::RequestFailed { status, .. }) => *status >= 500,
            _ => false,
        }
    }

    /// Returns the delay in seconds the server asked for before retrying.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Api(ApiError::RateLimited { retry_after_secs }) => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Creates an API request error.
    #[must_use]
    pub fn request_failed(status: u16, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let conflict = MultiCloudError::Api(ApiError::Conflict {
            resource: "projects/p/locations/l/azureClusters/c".to_string(),
            message: "etag mismatch".to_string(),
        });
        assert!(conflict.is_conflict());
        assert!(!conflict.is_retryable());

        let missing = MultiCloudError::Api(ApiError::NotFound {
            resource: "x".to_string(),
        });
        assert!(missing.is_not_found());
        assert!(!missing.is_conflict());

        let server = MultiCloudError::Api(ApiError::request_failed(503, "unavailable"));
        assert!(server.is_retryable());
        assert_eq!(server.retry_delay_secs(), None);

        let limited = MultiCloudError::Api(ApiError::RateLimited {
            retry_after_secs: 7,
        });
        assert!(limited.is_retryable());
        assert_eq!(limited.retry_delay_secs(), Some(7));

        let client = MultiCloudError::Api(ApiError::request_failed(400, "bad"));
        assert!(!client.is_retryable());
    }

    #[test]
    fn test_remote_failure_is_not_retryable() {
        let err = MultiCloudError::Operation(OperationError::Failed {
            operation: "op-1".to_string(),
            code: 9,
            message: "quota".to_string(),
        });
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("quota"));
    }
}
