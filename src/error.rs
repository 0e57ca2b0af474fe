//! Failure taxonomy for lifecycle operations
//!
//! Every failure a manager raises on purpose carries one of the closed set
//! of [`ErrorCode`]s and is either a warning (nothing was mutated, the system
//! is in a sane state) or an error (a mutating call happened and its outcome
//! disagrees with intent, or the request itself was invalid). Provider
//! failures this tool does not specifically recognize pass through as
//! [`CloudError`] with their code, message, and source preserved.

use std::path::PathBuf;

use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// Result alias used by all manager operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Closed set of failure codes raised by the resource managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    KeyDeleteFail,
    KeyDuplicate,
    KeyFileExists,
    KeyMissing,
    InstanceDuplicate,
    InstanceNameCollision,
    InstanceNotRunning,
    InstanceMissing,
    InstanceTerminationFail,
    InstanceUnknownKind,
    DomainNameInvalid,
    DomainNameNotFound,
    DnsInvalidRecordOperation,
    DnsRecordNotFound,
    DnsUnexpectedNumberOfRecords,
}

impl ErrorCode {
    /// Stable wire name, as shown to operators.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::KeyDeleteFail => "KEY_DELETE_FAIL",
            ErrorCode::KeyDuplicate => "KEY_DUPLICATE",
            ErrorCode::KeyFileExists => "KEY_FILE_EXISTS",
            ErrorCode::KeyMissing => "KEY_MISSING",
            ErrorCode::InstanceDuplicate => "INSTANCE_DUPLICATE",
            ErrorCode::InstanceNameCollision => "INSTANCE_NAME_COLLISION",
            ErrorCode::InstanceNotRunning => "INSTANCE_NOT_RUNNING",
            ErrorCode::InstanceMissing => "INSTANCE_MISSING",
            ErrorCode::InstanceTerminationFail => "INSTANCE_TERMINATION_FAIL",
            ErrorCode::InstanceUnknownKind => "INSTANCE_UNKNOWN_KIND",
            ErrorCode::DomainNameInvalid => "DOMAIN_NAME_INVALID",
            ErrorCode::DomainNameNotFound => "DOMAIN_NAME_NOT_FOUND",
            ErrorCode::DnsInvalidRecordOperation => "DNS_INVALID_RECORD_OPERATION",
            ErrorCode::DnsRecordNotFound => "DNS_RECORD_NOT_FOUND",
            ErrorCode::DnsUnexpectedNumberOfRecords => "DNS_UNEXPECTED_NUMBER_OF_RECORDS",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure raised by a lifecycle operation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The requested end state already holds or the resource is absent.
    /// Always raised before any mutating call; callers may treat it as
    /// "nothing to do".
    #[error("{code}: {message}")]
    Warning { code: ErrorCode, message: String },

    /// A mutating call's outcome disagrees with intent, or the request was
    /// invalid. Needs operator attention; never auto-retried.
    #[error("{code}: {message}")]
    Error { code: ErrorCode, message: String },

    /// Provider failure this tool does not specifically recognize.
    #[error(transparent)]
    Cloud(#[from] CloudError),

    /// Local key-file I/O failure outside the taxonomy.
    #[error("key file {}: {source}", path.display())]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LifecycleError {
    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        LifecycleError::Warning {
            code,
            message: message.into(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        LifecycleError::Error {
            code,
            message: message.into(),
        }
    }

    /// Taxonomy code, if this failure carries one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            LifecycleError::Warning { code, .. } | LifecycleError::Error { code, .. } => {
                Some(*code)
            }
            _ => None,
        }
    }

    /// Check if this is a warning (requested end state already holds).
    pub fn is_warning(&self) -> bool {
        matches!(self, LifecycleError::Warning { .. })
    }
}

/// Untranslated provider failure.
///
/// Keeps the provider's own error code so callers can recognize specific
/// conditions (duplicate key pair, key pair not found) without losing the
/// original SDK error, which stays reachable as `source`.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CloudError {
    code: Option<String>,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CloudError {
    /// Provider failure with no usable error code, e.g. a response missing a
    /// field this tool requires.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Provider failure with a known code.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            source: None,
        }
    }

    /// Capture an SDK operation error, preserving its code and message and
    /// keeping the error itself as source.
    pub fn from_sdk<E>(err: SdkError<E>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    {
        let code = err.code().map(str::to_string);
        let message = err
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        Self {
            code,
            message,
            source: Some(Box::new(err)),
        }
    }

    /// Provider error code, when the failure carried one.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}
