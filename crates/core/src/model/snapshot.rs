use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Question, QuizSession, SessionKey};
use crate::timer::Countdown;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("snapshot has no questions")]
    NoQuestions,

    #[error("snapshot belongs to a submitted session")]
    AlreadySubmitted,
}

/// Durable mirror of a `QuizSession`, used only for reload recovery.
///
/// Field layout follows the persisted JSON: `questions`, `selectedAnswers`,
/// `currentIndex`, `time`, `submitted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub questions: Vec<Question>,
    #[serde(default, alias = "selected")]
    pub selected_answers: Vec<Option<usize>>,
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub time: Option<u32>,
    #[serde(default)]
    pub submitted: bool,
}

impl SessionSnapshot {
    #[must_use]
    pub fn capture(session: &QuizSession) -> Self {
        Self {
            questions: session.questions().to_vec(),
            selected_answers: session.selected_answers().to_vec(),
            current_index: session.current_index(),
            time: Some(session.remaining_seconds()),
            submitted: session.is_submitted(),
        }
    }

    /// Rebuild the live session this snapshot mirrors.
    ///
    /// Answers are padded or truncated to the question count and out-of-range
    /// choices are dropped. `currentIndex` is clamped to the last question and
    /// `time` to `duration_secs`; a missing `time` means the full duration.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the snapshot is empty or already submitted.
    pub fn restore(self, key: SessionKey, duration_secs: u32) -> Result<QuizSession, SnapshotError> {
        if self.submitted {
            return Err(SnapshotError::AlreadySubmitted);
        }
        if self.questions.is_empty() {
            return Err(SnapshotError::NoQuestions);
        }

        let len = self.questions.len();
        let mut selected = self.selected_answers;
        selected.resize(len, None);
        for (answer, question) in selected.iter_mut().zip(&self.questions) {
            if answer.is_some_and(|choice| choice >= question.choice_count()) {
                *answer = None;
            }
        }

        let current = self.current_index.min(len - 1);
        let countdown = Countdown::resume(duration_secs, self.time.unwrap_or(duration_secs));
        Ok(QuizSession::from_parts(
            key,
            self.questions,
            selected,
            current,
            countdown,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Level, QuestionId, StudentId};

    fn key() -> SessionKey {
        SessionKey::new(Level::new(2), StudentId::new(5))
    }

    fn questions(n: u64) -> Vec<Question> {
        (1..=n)
            .map(|id| {
                Question::new(
                    QuestionId::new(id),
                    format!("Q{id}"),
                    vec!["x".into(), "y".into()],
                    1,
                )
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn restore_reproduces_index_and_countdown() {
        let snapshot = SessionSnapshot {
            questions: questions(8),
            selected_answers: vec![Some(1), Some(0), Some(1), None, None, None, None, None],
            current_index: 3,
            time: Some(120),
            submitted: false,
        };
        let session = snapshot.restore(key(), 300).unwrap();
        assert_eq!(session.current_index(), 3);
        assert_eq!(session.remaining_seconds(), 120);
        assert_eq!(session.time_taken(), 180);
        assert_eq!(session.answered_count(), 3);
        assert!(!session.countdown().is_running());
    }

    #[test]
    fn capture_then_restore_preserves_state() {
        let mut live = QuizSession::new(key(), questions(3), 60).unwrap();
        live.start_timer();
        live.select(1).unwrap();
        live.advance().unwrap();
        live.tick();

        let restored = SessionSnapshot::capture(&live).restore(key(), 60).unwrap();
        assert_eq!(restored.current_index(), 1);
        assert_eq!(restored.remaining_seconds(), 59);
        assert_eq!(restored.selected_answers(), live.selected_answers());
    }

    #[test]
    fn restore_normalizes_ragged_snapshot() {
        let snapshot = SessionSnapshot {
            questions: questions(3),
            selected_answers: vec![Some(7)],
            current_index: 10,
            time: None,
            submitted: false,
        };
        let session = snapshot.restore(key(), 300).unwrap();
        assert_eq!(session.selected_answers(), &[None, None, None]);
        assert_eq!(session.current_index(), 2);
        assert_eq!(session.remaining_seconds(), 300);
    }

    #[test]
    fn restore_rejects_submitted_or_empty() {
        let submitted = SessionSnapshot {
            questions: questions(1),
            selected_answers: vec![None],
            current_index: 0,
            time: Some(10),
            submitted: true,
        };
        assert_eq!(
            submitted.restore(key(), 300).unwrap_err(),
            SnapshotError::AlreadySubmitted
        );

        let empty = SessionSnapshot {
            questions: Vec::new(),
            selected_answers: Vec::new(),
            current_index: 0,
            time: Some(10),
            submitted: false,
        };
        assert_eq!(empty.restore(key(), 300).unwrap_err(), SnapshotError::NoQuestions);
    }

    #[test]
    fn serializes_persisted_layout() {
        let live = QuizSession::new(key(), questions(1), 300).unwrap();
        let json = serde_json::to_value(SessionSnapshot::capture(&live)).unwrap();
        assert!(json.get("selectedAnswers").is_some());
        assert_eq!(json["currentIndex"], 0);
        assert_eq!(json["time"], 300);
        assert_eq!(json["submitted"], false);
        assert_eq!(json["questions"][0]["answerIndex"], 1);
    }

    #[test]
    fn accepts_legacy_selected_field() {
        let raw = r#"{"questions":[{"id":1,"text":"Q","choices":["a","b"],"answerIndex":0}],
                      "selected":[1],"time":42}"#;
        let snapshot: SessionSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.selected_answers, vec![Some(1)]);
        let session = snapshot.restore(key(), 300).unwrap();
        assert_eq!(session.remaining_seconds(), 42);
    }
}
