use thiserror::Error;

use crate::domain::approval::{ApprovalId, ApprovalStatus, Party};

/// Coarse classification of [`ApprovalError`] used by callers that only need to pick a
/// rendering or a retry strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Immutable,
    PermissionDenied,
    InvalidInput,
    CodeGenerationExhausted,
    Persistence,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("{}", describe_not_found(.reference, .dangling_id.as_deref()))]
    NotFound { reference: String, dangling_id: Option<String> },
    #[error("approval `{id}` is already {status} and cannot change")]
    Immutable { id: ApprovalId, status: ApprovalStatus },
    #[error("`{actor}` is not the {required} of approval `{id}`")]
    PermissionDenied { id: ApprovalId, actor: String, required: Party },
    #[error("approval `{id}` is {status}, not approved")]
    NotApproved { id: ApprovalId, status: ApprovalStatus },
    #[error("approval `{id}` is already verified")]
    AlreadyVerified { id: ApprovalId },
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },
    #[error("could not generate an unused approval code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: u32 },
    #[error("persistence failure during {operation} of `{key}`: {message}")]
    Persistence { operation: &'static str, key: String, message: String },
    #[error("stored value at `{key}` could not be decoded: {message}")]
    Corrupt { key: String, message: String },
}

impl ApprovalError {
    pub fn not_found(reference: impl Into<String>) -> Self {
        Self::NotFound { reference: reference.into(), dangling_id: None }
    }

    pub fn missing(field: &'static str) -> Self {
        Self::InvalidInput { field, reason: "value is required".to_string() }
    }

    pub fn persistence(
        operation: &'static str,
        key: impl Into<String>,
        error: impl std::fmt::Display,
    ) -> Self {
        Self::Persistence { operation, key: key.into(), message: error.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Immutable { .. } | Self::NotApproved { .. } | Self::AlreadyVerified { .. } => {
                ErrorKind::Immutable
            }
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::CodeGenerationExhausted { .. } => ErrorKind::CodeGenerationExhausted,
            Self::Persistence { .. } | Self::Corrupt { .. } => ErrorKind::Persistence,
        }
    }

    /// Only backing-store failures are worth another attempt; everything else would fail
    /// the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence { .. })
    }
}

fn describe_not_found(reference: &str, dangling_id: Option<&str>) -> String {
    match dangling_id {
        Some(id) => {
            format!("approval `{reference}` not found (index points at missing record `{id}`)")
        }
        None => format!("approval `{reference}` not found"),
    }
}
