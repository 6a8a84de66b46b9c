//! Shared error types for the services crate.

use thiserror::Error;

use escape_core::model::{Level, Notice, QuestionError, SessionStateError};
use escape_core::policy::PolicyError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `QuizBackend` implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("invalid backend base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("backend rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("backend request timed out")]
    Timeout,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted while preparing a level's question set.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoaderError {
    #[error("no questions available for level {level}")]
    EmptyBank { level: Level },
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors emitted by `EnvironmentMonitor` implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MonitorError {
    #[error("environment host is gone")]
    Disconnected,
    #[error("fullscreen request refused")]
    FullscreenRefused,
}

/// Errors emitted by the proctored session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProctorError {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Session(#[from] SessionStateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl ProctorError {
    /// Blocking notice for a level that could not be opened.
    #[must_use]
    pub fn notice(&self, level: Level) -> Notice {
        match self {
            Self::Loader(LoaderError::EmptyBank { .. }) | Self::Session(SessionStateError::Empty) => {
                Notice::NoQuestions { level }
            }
            _ => Notice::LoadFailed,
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}
