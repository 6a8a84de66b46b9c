use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::QuestionId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {id} has empty text")]
    EmptyText { id: QuestionId },

    #[error("question {id} has no choices")]
    NoChoices { id: QuestionId },

    #[error("question {id} answer index {index} is out of range for {len} choices")]
    AnswerOutOfRange {
        id: QuestionId,
        index: usize,
        len: usize,
    },
}

/// Wire shape of a question as served by the backend and stored in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub id: QuestionId,
    pub text: String,
    pub choices: Vec<String>,
    pub answer_index: usize,
}

/// A validated multiple-choice question.
///
/// `correct_choice` always indexes into `choices`; after shuffling it tracks the
/// relocated correct answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionRecord", into = "QuestionRecord")]
pub struct Question {
    id: QuestionId,
    text: String,
    choices: Vec<String>,
    correct_choice: usize,
}

impl Question {
    /// Build a question, checking that the correct index points at a choice.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` for blank text, no choices or an out-of-range answer.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        choices: Vec<String>,
        correct_choice: usize,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText { id });
        }
        if choices.is_empty() {
            return Err(QuestionError::NoChoices { id });
        }
        if correct_choice >= choices.len() {
            return Err(QuestionError::AnswerOutOfRange {
                id,
                index: correct_choice,
                len: choices.len(),
            });
        }
        Ok(Self {
            id,
            text,
            choices,
            correct_choice,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    #[must_use]
    pub fn choice_count(&self) -> usize {
        self.choices.len()
    }

    #[must_use]
    pub fn correct_choice(&self) -> usize {
        self.correct_choice
    }

    #[must_use]
    pub fn is_correct(&self, choice: usize) -> bool {
        self.correct_choice == choice
    }

    /// Reorder choices by `order`, where `order[new] = old`.
    ///
    /// Returns `None` if `order` is not a permutation of the choice indices.
    #[must_use]
    pub fn permuted(&self, order: &[usize]) -> Option<Self> {
        if order.len() != self.choices.len() {
            return None;
        }
        let mut seen = vec![false; order.len()];
        for &old in order {
            if old >= seen.len() || seen[old] {
                return None;
            }
            seen[old] = true;
        }

        let choices = order.iter().map(|&old| self.choices[old].clone()).collect();
        let correct_choice = order.iter().position(|&old| old == self.correct_choice)?;
        Some(Self {
            id: self.id,
            text: self.text.clone(),
            choices,
            correct_choice,
        })
    }
}

impl TryFrom<QuestionRecord> for Question {
    type Error = QuestionError;

    fn try_from(record: QuestionRecord) -> Result<Self, Self::Error> {
        Self::new(record.id, record.text, record.choices, record.answer_index)
    }
}

impl From<Question> for QuestionRecord {
    fn from(question: Question) -> Self {
        Self {
            id: question.id,
            text: question.text,
            choices: question.choices,
            answer_index: question.correct_choice,
        }
    }
}
