use serde::{Deserialize, Serialize};

use crate::model::{Level, StudentId};

/// Payload sent to the score-submission endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSubmission {
    #[serde(rename = "studentID")]
    pub student_id: StudentId,
    pub level: Level,
    pub score: u32,
    pub time_taken: u32,
    pub total_questions: u32,
}

/// What triggered the terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitTrigger {
    Player,
    Timeout,
    Violations,
}

impl SubmitTrigger {
    /// Forced submissions bypass answer-completeness checks.
    #[must_use]
    pub fn is_forced(self) -> bool {
        !matches!(self, Self::Player)
    }
}

/// Hand-off to the results display after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalResult {
    #[serde(rename = "studentID")]
    pub student_id: StudentId,
    pub name: String,
    pub college: String,
    pub level: Level,
    pub score: u32,
    pub total: u32,
    pub time_taken: u32,
    pub qualified: bool,
}
