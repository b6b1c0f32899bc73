//! # Rejection
//!
//! Every way a write attempt can end other than success. Each reason maps to a
//! stable code for the presentation layer and a short localized message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One violated field constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The terminal failure of a write attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No current identity; the user must sign in.
    #[error("Vous devez être connecté pour effectuer cette action")]
    NotAuthenticated,

    /// Too many attempts within the window; retry later.
    #[error("Trop de tentatives, veuillez réessayer dans un instant")]
    RateLimited,

    /// One or more field constraints violated. Carries every violation.
    #[error("{}", first_message(.0))]
    ValidationFailed(Vec<FieldError>),

    #[error("Format de fichier non supporté")]
    UnsupportedFileType,

    #[error("Le fichier ne peut pas dépasser {max_mb}MB")]
    FileTooLarge { max_mb: u64 },

    /// The leading bytes do not match the declared type.
    #[error("Le fichier est corrompu ou ne correspond pas à son type")]
    CorruptOrSpoofedFile,

    /// The storage collaborator failed; the whole attempt may be retried.
    #[error("Une erreur est survenue, veuillez réessayer")]
    StorageFailure,
}

impl Rejection {
    /// Stable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::NotAuthenticated => "not_authenticated",
            Rejection::RateLimited => "rate_limited",
            Rejection::ValidationFailed(_) => "validation_failed",
            Rejection::UnsupportedFileType => "unsupported_file_type",
            Rejection::FileTooLarge { .. } => "file_too_large",
            Rejection::CorruptOrSpoofedFile => "corrupt_or_spoofed_file",
            Rejection::StorageFailure => "storage_failure",
        }
    }

    /// Per-field violations; empty for every other reason.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Rejection::ValidationFailed(errors) => errors,
            _ => &[],
        }
    }

    /// Whether the user can get past this by changing input or waiting.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Rejection::NotAuthenticated)
    }
}

fn first_message(errors: &[FieldError]) -> &str {
    errors
        .first()
        .map(|e| e.message.as_str())
        .unwrap_or("Données invalides")
}

/// A specialized Result type for write-gate operations.
pub type GateResult<T> = std::result::Result<T, Rejection>;
