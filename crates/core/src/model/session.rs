use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::{Level, Question, StudentId};
use crate::timer::{Countdown, TickOutcome};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("no questions available for session")]
    Empty,

    #[error("session already submitted")]
    Submitted,

    #[error("session time has expired")]
    Expired,

    #[error("choice {choice} is out of range for {len} choices")]
    ChoiceOutOfRange { choice: usize, len: usize },

    #[error("question {index} has not been answered")]
    Unanswered { index: usize },
}

/// Scope of one durable session: a student playing a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    level: Level,
    student_id: StudentId,
}

impl SessionKey {
    #[must_use]
    pub fn new(level: Level, student_id: StudentId) -> Self {
        Self { level, student_id }
    }

    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    /// Stable string key for key-value snapshot stores.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("level{}_state_v1_{}", self.level, self.student_id)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Outcome of moving past the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved { index: usize },
    /// The current question is the last one; the player is ready to submit.
    Finished,
}

/// In-progress state of one proctored level.
///
/// `questions` is fixed at construction. `current_index` only moves forward and
/// the countdown only runs down. Once `submitted` is set nothing else changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSession {
    key: SessionKey,
    questions: Vec<Question>,
    selected: Vec<Option<usize>>,
    current: usize,
    countdown: Countdown,
    submitted: bool,
}

impl QuizSession {
    /// Start a fresh session with every question unanswered.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Empty` if no questions are provided.
    pub fn new(
        key: SessionKey,
        questions: Vec<Question>,
        duration_secs: u32,
    ) -> Result<Self, SessionStateError> {
        if questions.is_empty() {
            return Err(SessionStateError::Empty);
        }
        let selected = vec![None; questions.len()];
        Ok(Self {
            key,
            questions,
            selected,
            current: 0,
            countdown: Countdown::new(duration_secs),
            submitted: false,
        })
    }

    /// Rehydrate a session from already-normalized parts.
    pub(crate) fn from_parts(
        key: SessionKey,
        questions: Vec<Question>,
        selected: Vec<Option<usize>>,
        current: usize,
        countdown: Countdown,
    ) -> Self {
        Self {
            key,
            questions,
            selected,
            current,
            countdown,
            submitted: false,
        }
    }

    #[must_use]
    pub fn key(&self) -> SessionKey {
        self.key
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn selected_answers(&self) -> &[Option<usize>] {
        &self.selected
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        &self.questions[self.current]
    }

    #[must_use]
    pub fn current_answer(&self) -> Option<usize> {
        self.selected[self.current]
    }

    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.current + 1 == self.questions.len()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.selected.iter().filter(|a| a.is_some()).count()
    }

    #[must_use]
    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.countdown.remaining()
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.countdown.duration()
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// Begin the countdown. No-op once submitted.
    pub fn start_timer(&mut self) -> bool {
        if self.submitted {
            return false;
        }
        self.countdown.start()
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.submitted {
            return TickOutcome::Idle;
        }
        self.countdown.tick()
    }

    /// Record the player's choice for the current question, replacing any earlier choice.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` if the session is terminal or the choice is out of range.
    pub fn select(&mut self, choice: usize) -> Result<(), SessionStateError> {
        self.ensure_open()?;
        let len = self.current_question().choice_count();
        if choice >= len {
            return Err(SessionStateError::ChoiceOutOfRange { choice, len });
        }
        self.selected[self.current] = Some(choice);
        Ok(())
    }

    /// Move to the next question once the current one is answered.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Unanswered` if no choice was made, or a terminal error.
    pub fn advance(&mut self) -> Result<Advance, SessionStateError> {
        self.ensure_open()?;
        if self.current_answer().is_none() {
            return Err(SessionStateError::Unanswered {
                index: self.current,
            });
        }
        if self.is_last_question() {
            return Ok(Advance::Finished);
        }
        self.current += 1;
        Ok(Advance::Moved {
            index: self.current,
        })
    }

    /// Set the terminal flag. Returns false if it was already set.
    pub fn mark_submitted(&mut self) -> bool {
        if self.submitted {
            return false;
        }
        self.countdown.stop();
        self.submitted = true;
        true
    }

    /// Number of answers matching the correct choice; unanswered counts as wrong.
    #[must_use]
    pub fn score(&self) -> u32 {
        let correct = self
            .questions
            .iter()
            .zip(&self.selected)
            .filter(|(q, a)| a.is_some_and(|choice| q.is_correct(choice)))
            .count();
        u32::try_from(correct).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn time_taken(&self) -> u32 {
        self.countdown.elapsed()
    }

    fn ensure_open(&self) -> Result<(), SessionStateError> {
        if self.submitted {
            return Err(SessionStateError::Submitted);
        }
        if self.countdown.is_expired() {
            return Err(SessionStateError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionId;

    fn question(id: u64, correct: usize) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Q{id}"),
            vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct,
        )
        .unwrap()
    }

    fn session(count: u64, duration: u32) -> QuizSession {
        let questions = (1..=count).map(|id| question(id, 0)).collect();
        QuizSession::new(
            SessionKey::new(Level::new(2), StudentId::new(9)),
            questions,
            duration,
        )
        .unwrap()
    }

    #[test]
    fn storage_key_is_scoped_by_level_and_student() {
        let key = SessionKey::new(Level::new(3), StudentId::new(41));
        assert_eq!(key.storage_key(), "level3_state_v1_41");
    }

    #[test]
    fn empty_session_returns_error() {
        let key = SessionKey::new(Level::new(2), StudentId::new(1));
        let err = QuizSession::new(key, Vec::new(), 300).unwrap_err();
        assert_eq!(err, SessionStateError::Empty);
    }

    #[test]
    fn advance_requires_an_answer() {
        let mut s = session(2, 300);
        assert_eq!(
            s.advance().unwrap_err(),
            SessionStateError::Unanswered { index: 0 }
        );
        s.select(1).unwrap();
        assert_eq!(s.advance().unwrap(), Advance::Moved { index: 1 });
        s.select(0).unwrap();
        assert_eq!(s.advance().unwrap(), Advance::Finished);
        assert_eq!(s.current_index(), 1);
    }

    #[test]
    fn select_rejects_out_of_range_choice() {
        let mut s = session(1, 300);
        assert_eq!(
            s.select(4).unwrap_err(),
            SessionStateError::ChoiceOutOfRange { choice: 4, len: 4 }
        );
    }

    #[test]
    fn submitted_session_is_frozen() {
        let mut s = session(2, 300);
        s.start_timer();
        assert!(s.mark_submitted());
        assert!(!s.mark_submitted());
        assert_eq!(s.select(0).unwrap_err(), SessionStateError::Submitted);
        assert_eq!(s.tick(), TickOutcome::Idle);
        assert!(!s.start_timer());
    }

    #[test]
    fn expired_session_rejects_answers() {
        let mut s = session(2, 1);
        s.start_timer();
        assert_eq!(s.tick(), TickOutcome::Expired);
        assert_eq!(s.select(0).unwrap_err(), SessionStateError::Expired);
    }

    #[test]
    fn score_counts_unanswered_as_wrong() {
        let mut s = session(3, 300);
        s.select(0).unwrap();
        s.advance().unwrap();
        s.select(2).unwrap();
        s.advance().unwrap();
        assert_eq!(s.score(), 1);
        assert_eq!(s.answered_count(), 2);
    }

    #[test]
    fn time_taken_tracks_elapsed_ticks() {
        let mut s = session(1, 300);
        s.start_timer();
        for _ in 0..50 {
            s.tick();
        }
        assert_eq!(s.remaining_seconds(), 250);
        assert_eq!(s.time_taken(), 50);
    }
}
