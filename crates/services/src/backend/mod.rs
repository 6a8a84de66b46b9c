//! Request/response interface to the quiz backend.

mod http;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use escape_core::model::{Level, QuestionRecord, ScoreSubmission, StudentId};

use crate::error::BackendError;

pub use http::{BackendConfig, HttpBackend};
pub use memory::InMemoryBackend;

/// Response to a successful login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    #[serde(rename = "studentID")]
    pub student_id: StudentId,
    pub current_level: Level,
}

/// A player's stored result for one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerScore {
    pub score: u32,
    pub time_taken: u32,
    pub total_questions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: StudentId,
    pub name: String,
    pub college: String,
    pub score: u32,
    pub total: u32,
    pub time_taken: u32,
}

/// Backend operations consumed by the quiz client.
#[async_trait]
pub trait QuizBackend: Send + Sync {
    /// Register a player.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::MissingField` for blank input, or transport/backend errors.
    async fn login(&self, name: &str, college: &str) -> Result<LoginResponse, BackendError>;

    /// Fetch the raw question bank for `level`. A level with no bank yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport or backend failures.
    async fn get_questions(&self, level: Level) -> Result<Vec<QuestionRecord>, BackendError>;

    /// Store a score; the latest submission per student and level wins.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport or backend failures.
    async fn submit_score(&self, submission: &ScoreSubmission) -> Result<(), BackendError>;

    /// # Errors
    ///
    /// Returns `BackendError` on transport or backend failures.
    async fn get_rules(&self) -> Result<Vec<String>, BackendError>;

    /// # Errors
    ///
    /// Returns `BackendError` on transport or backend failures.
    async fn check_eligibility(
        &self,
        student_id: StudentId,
        level: Level,
    ) -> Result<bool, BackendError>;

    /// Returns `None` if the player has no score for `level`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport or backend failures.
    async fn get_player_score(
        &self,
        student_id: StudentId,
        level: Level,
    ) -> Result<Option<PlayerScore>, BackendError>;

    /// Scores for `level`, best score first and faster time breaking ties.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport or backend failures.
    async fn get_leaderboard(&self, level: Level) -> Result<Vec<LeaderboardEntry>, BackendError>;
}

pub(crate) fn require_field(value: &str, field: &'static str) -> Result<String, BackendError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(BackendError::MissingField(field))
    } else {
        Ok(trimmed.to_string())
    }
}
