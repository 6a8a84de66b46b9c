use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use escape_core::model::{Level, QuestionRecord, ScoreSubmission, StudentId};

use super::{LeaderboardEntry, LoginResponse, PlayerScore, QuizBackend, require_field};
use crate::error::BackendError;

#[derive(Default)]
struct BackendState {
    banks: HashMap<Level, Vec<QuestionRecord>>,
    rules: Vec<String>,
    students: HashMap<StudentId, (String, String)>,
    next_student: u64,
    scores: HashMap<(StudentId, Level), PlayerScore>,
    submissions: Vec<ScoreSubmission>,
    fail_submissions: bool,
}

/// In-process backend for tests and offline play.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<BackendState>>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse banks in the `/api/questions` layout (`{"level1": [...], ...}`). An
    /// optional `"rules"` array of strings supplies the rules list; other keys
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unavailable` if the JSON is malformed.
    pub fn from_banks_json(raw: &str) -> Result<Self, BackendError> {
        let malformed = |e: serde_json::Error| BackendError::Unavailable(e.to_string());
        let parsed: HashMap<String, serde_json::Value> = serde_json::from_str(raw).map_err(malformed)?;
        let backend = Self::new();
        for (name, value) in parsed {
            if name == "rules" {
                backend.set_rules(serde_json::from_value(value).map_err(malformed)?);
            } else if let Some(level) = name
                .strip_prefix("level")
                .and_then(|n| n.parse::<Level>().ok())
            {
                backend.set_bank(level, serde_json::from_value(value).map_err(malformed)?);
            }
        }
        Ok(backend)
    }

    #[must_use]
    pub fn with_bank(self, level: Level, records: Vec<QuestionRecord>) -> Self {
        self.set_bank(level, records);
        self
    }

    pub fn set_bank(&self, level: Level, records: Vec<QuestionRecord>) {
        if let Ok(mut state) = self.state.lock() {
            state.banks.insert(level, records);
        }
    }

    pub fn set_rules(&self, rules: Vec<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.rules = rules;
        }
    }

    /// Make every subsequent `submit_score` fail with `Unavailable`.
    pub fn fail_submissions(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_submissions = fail;
        }
    }

    /// Every `submit_score` call received, including failed ones.
    #[must_use]
    pub fn submissions(&self) -> Vec<ScoreSubmission> {
        self.state
            .lock()
            .map(|state| state.submissions.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BackendState>, BackendError> {
        self.state
            .lock()
            .map_err(|e| BackendError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl QuizBackend for InMemoryBackend {
    async fn login(&self, name: &str, college: &str) -> Result<LoginResponse, BackendError> {
        let name = require_field(name, "studentName")?;
        let college = require_field(college, "collegeName")?;
        let mut state = self.lock()?;
        state.next_student += 1;
        let student_id = StudentId::new(state.next_student);
        state.students.insert(student_id, (name, college));
        Ok(LoginResponse {
            student_id,
            current_level: Level::new(1),
        })
    }

    async fn get_questions(&self, level: Level) -> Result<Vec<QuestionRecord>, BackendError> {
        Ok(self.lock()?.banks.get(&level).cloned().unwrap_or_default())
    }

    async fn submit_score(&self, submission: &ScoreSubmission) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        state.submissions.push(*submission);
        if state.fail_submissions {
            return Err(BackendError::Unavailable("score store offline".into()));
        }
        state.scores.insert(
            (submission.student_id, submission.level),
            PlayerScore {
                score: submission.score,
                time_taken: submission.time_taken,
                total_questions: submission.total_questions,
            },
        );
        Ok(())
    }

    async fn get_rules(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.lock()?.rules.clone())
    }

    async fn check_eligibility(
        &self,
        student_id: StudentId,
        level: Level,
    ) -> Result<bool, BackendError> {
        if level.value() != 3 {
            return Ok(true);
        }
        let state = self.lock()?;
        let level2 = state
            .scores
            .get(&(student_id, Level::new(2)))
            .map_or(0, |s| s.score);
        Ok(level2 >= 6)
    }

    async fn get_player_score(
        &self,
        student_id: StudentId,
        level: Level,
    ) -> Result<Option<PlayerScore>, BackendError> {
        Ok(self.lock()?.scores.get(&(student_id, level)).copied())
    }

    async fn get_leaderboard(&self, level: Level) -> Result<Vec<LeaderboardEntry>, BackendError> {
        let state = self.lock()?;
        let mut entries: Vec<LeaderboardEntry> = state
            .scores
            .iter()
            .filter(|((_, l), _)| *l == level)
            .filter_map(|((student, _), score)| {
                let (name, college) = state.students.get(student)?;
                Some(LeaderboardEntry {
                    id: *student,
                    name: name.clone(),
                    college: college.clone(),
                    score: score.score,
                    total: score.total_questions,
                    time_taken: score.time_taken,
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.time_taken.cmp(&b.time_taken))
                .then(a.id.cmp(&b.id))
        });
        Ok(entries)
    }
}
