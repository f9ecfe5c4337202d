//! Error types for the Easel engine.
//!
//! Expected, recoverable conditions travel as `Err` values of this enum.
//! Chat-facing wording comes from [`UserFriendlyError`]; `code()` gives a
//! stable machine-readable identifier for protocol messages.

use thiserror::Error;
use uuid::Uuid;

use crate::validation::FieldViolation;

/// Engine error type
#[derive(Debug, Error)]
pub enum Error {
    /// Title or content failed validation; every violated field is listed
    #[error("validation failed: {}", format_violations(.violations))]
    ValidationFailed {
        /// Field-level failures, one entry per offending field
        violations: Vec<FieldViolation>,
    },

    /// Another session already holds the canvas's edit lock
    #[error("canvas {canvas_id} is locked by an active edit session")]
    SessionConflict {
        /// Canvas being contended
        canvas_id: Uuid,
        /// User holding the active session
        held_by: String,
    },

    /// Session id is unknown
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    /// Session exists but already reached a terminal state
    #[error("session already ended: {0}")]
    SessionAlreadyTerminal(Uuid),

    /// Canvas id is unknown
    #[error("canvas not found: {0}")]
    CanvasNotFound(Uuid),

    /// Storage backend failed or is unreachable
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A configuration value failed its range check
    #[error("invalid configuration: {field}: {message}")]
    InvalidConfig {
        /// Config field name
        field: String,
        /// Detailed message
        message: String,
    },

    /// Configuration could not be loaded at all
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn format_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Build a `ValidationFailed` from collected violations.
    #[must_use]
    pub fn validation(violations: Vec<FieldViolation>) -> Self {
        Self::ValidationFailed { violations }
    }

    /// Build a `StorageUnavailable` from any backend error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    /// Build an `InvalidConfig` for a named field.
    #[must_use]
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for protocol/UI messages.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed { .. } => "validation_failed",
            Self::SessionConflict { .. } => "session_conflict",
            Self::SessionNotFound(_) => "session_not_found",
            Self::SessionAlreadyTerminal(_) => "session_already_terminal",
            Self::CanvasNotFound(_) => "canvas_not_found",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// True when retrying the same call later can succeed without the user
    /// changing anything.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Chat-facing error formatting.
///
/// Gateway adapters reply with `user_message`, optionally followed by
/// `suggestion`, instead of leaking internal error displays into channels.
pub trait UserFriendlyError {
    /// Get a message suitable for replying in-channel
    fn user_message(&self) -> String;

    /// Get a follow-up suggestion for the user, if one applies
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::ValidationFailed { violations } => {
                format!("⚠️ Some fields need fixing: {}", format_violations(violations))
            }
            Error::SessionConflict { .. } => {
                "✋ Someone else is editing this canvas right now.".to_string()
            }
            Error::SessionNotFound(_) | Error::SessionAlreadyTerminal(_) => {
                "⌛ This editing session has ended.".to_string()
            }
            Error::CanvasNotFound(_) => {
                "🔍 That canvas does not exist (it may have been deleted).".to_string()
            }
            Error::StorageUnavailable(_) => {
                "💾 Storage is temporarily unavailable. Your changes were not saved.".to_string()
            }
            Error::InvalidConfig { field, message } => {
                format!("⚙️ Configuration error in '{field}': {message}")
            }
            Error::Configuration(msg) => format!("⚙️ Configuration error: {msg}"),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::ValidationFailed { .. } => {
                Some("Adjust the listed fields and submit again.".to_string())
            }
            Error::SessionConflict { .. } => {
                Some("Try again once the current editing session ends.".to_string())
            }
            Error::SessionNotFound(_) | Error::SessionAlreadyTerminal(_) => {
                Some("Start a new edit session to continue.".to_string())
            }
            Error::StorageUnavailable(_) => {
                Some("Retry in a moment; your session is still active.".to_string())
            }
            _ => None,
        }
    }
}
