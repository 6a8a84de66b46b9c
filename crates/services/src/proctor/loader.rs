use std::sync::Arc;

use rand::Rng;

use escape_core::model::{Question, QuestionRecord};
use escape_core::policy::LevelConfig;

use super::shuffle::shuffle_question_set;
use crate::backend::QuizBackend;
use crate::error::LoaderError;

/// Fetches a level's bank and turns it into a freshly shuffled question set.
#[derive(Clone)]
pub struct QuestionSetLoader {
    backend: Arc<dyn QuizBackend>,
}

impl QuestionSetLoader {
    #[must_use]
    pub fn new(backend: Arc<dyn QuizBackend>) -> Self {
        Self { backend }
    }

    /// Every call produces a new permutation.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::EmptyBank` if the bank is empty, or backend and
    /// validation errors.
    pub async fn prepare_session(&self, config: &LevelConfig) -> Result<Vec<Question>, LoaderError> {
        let records = self.backend.get_questions(config.level()).await?;
        build_question_set(records, config, &mut rand::rng())
    }
}

/// Validate raw records and shuffle them into a subset of `config.subset_size()`.
///
/// # Errors
///
/// Returns `LoaderError::EmptyBank` for an empty bank or `LoaderError::Question` for a
/// malformed record.
pub fn build_question_set<R: Rng + ?Sized>(
    records: Vec<QuestionRecord>,
    config: &LevelConfig,
    rng: &mut R,
) -> Result<Vec<Question>, LoaderError> {
    if records.is_empty() {
        return Err(LoaderError::EmptyBank {
            level: config.level(),
        });
    }
    let bank = records
        .into_iter()
        .map(Question::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    if bank.len() < config.subset_size() {
        tracing::warn!(
            level = %config.level(),
            bank = bank.len(),
            subset = config.subset_size(),
            "question bank smaller than subset; using whole bank"
        );
    }
    Ok(shuffle_question_set(bank, config.subset_size(), rng))
}
