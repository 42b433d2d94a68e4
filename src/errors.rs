use serde::Serialize;
use thiserror::Error;

use crate::types::EntityKind;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("FETCH_FAILED: {0}")]
    Fetch(String),
    #[error("CORPUS_UNAVAILABLE: {kind:?}: {reason}")]
    Corpus { kind: EntityKind, reason: String },
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("STORAGE: {0}")]
    Storage(String),
    #[error("SERIALIZATION: {0}")]
    Serialization(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

/// What the UI offers next to an error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    GoBack,
}

impl AppError {
    /// Short message safe to show to the user. Raw error text stays in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "This item could not be found.",
            AppError::Config(_) => "The application is misconfigured.",
            _ => "Something went wrong while loading data.",
        }
    }

    pub fn recovery(&self) -> RecoveryAction {
        match self {
            AppError::NotFound(_) => RecoveryAction::GoBack,
            _ => RecoveryAction::Retry,
        }
    }
}

/// What the UI renders for a failure: a short message and one recovery action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorView {
    pub message: String,
    pub recovery: RecoveryAction,
}

impl From<&AppError> for ErrorView {
    fn from(error: &AppError) -> Self {
        Self {
            message: error.user_message().to_string(),
            recovery: error.recovery(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
