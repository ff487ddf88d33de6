//! Error types for menu-core operations.
//!
//! `MenuError` is `Clone` because a single in-flight fetch hands the same
//! result to every caller that joined it.

use std::path::PathBuf;

/// All errors that can occur while resolving, fetching or rendering the menu.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MenuError {
    // ─────────────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────────────
    /// Auth collaborator is still loading. Callers should wait, not report.
    #[error("Authentication is still loading")]
    AuthNotReady,

    #[error("User is not authenticated")]
    Unauthenticated,

    // ─────────────────────────────────────────────────────────────────────
    // Fetch Errors (prior cache is preserved)
    // ─────────────────────────────────────────────────────────────────────
    #[error("Malformed menu response: {details}")]
    MalformedResponse { details: String },

    #[error("Menu request failed: {message}")]
    NetworkFailure { message: String },

    // ─────────────────────────────────────────────────────────────────────
    // Boundary Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Internal menu fault: {message}")]
    InternalFault { message: String },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("I/O error: {context}: {message}")]
    Io { context: String, message: String },
}

impl MenuError {
    pub fn malformed(details: impl Into<String>) -> Self {
        MenuError::MalformedResponse {
            details: details.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        MenuError::NetworkFailure {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        MenuError::InternalFault {
            message: message.into(),
        }
    }

    /// Failures that keep the previously cached tree on screen.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            MenuError::MalformedResponse { .. } | MenuError::NetworkFailure { .. }
        )
    }

    /// Text suitable for showing next to a retry control.
    pub fn user_message(&self) -> String {
        match self {
            MenuError::AuthNotReady => "Loading your session…".to_string(),
            MenuError::Unauthenticated => "You are not signed in.".to_string(),
            MenuError::MalformedResponse { .. } => {
                "The menu service returned an unexpected response.".to_string()
            }
            MenuError::NetworkFailure { .. } => "The menu service could not be reached.".to_string(),
            MenuError::InternalFault { .. } => {
                "Something went wrong while building the menu.".to_string()
            }
            MenuError::ConfigMalformed { .. } | MenuError::Io { .. } => {
                "Menu settings could not be loaded.".to_string()
            }
        }
    }
}

impl From<menu_protocol::ErrorInfo> for MenuError {
    fn from(info: menu_protocol::ErrorInfo) -> Self {
        MenuError::MalformedResponse {
            details: info.to_string(),
        }
    }
}

/// Convenience type alias for Results using MenuError.
pub type Result<T> = std::result::Result<T, MenuError>;

impl From<MenuError> for String {
    fn from(err: MenuError) -> String {
        err.to_string()
    }
}
