use std::collections::HashMap;
use std::sync::Arc;

use escape_core::model::{Level, StudentId};
use escape_core::policy::LevelConfig;

use crate::backend::{PlayerScore, QuizBackend};

/// Highest level. It stays replayable once unlocked.
pub const FINAL_LEVEL: Level = Level::new(3);

/// Whether a player may start a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelAccess {
    /// Playable. `prior` is the recorded score, if the level was played before.
    Open { prior: Option<PlayerScore> },
    /// Already qualified here; the level is locked.
    Passed { score: PlayerScore },
    /// The previous level has not been qualified yet.
    RequiresPrevious {
        previous: Level,
        min_score: Option<u32>,
    },
}

impl LevelAccess {
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

/// Recorded scores per level for one player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelProgress {
    scores: HashMap<Level, PlayerScore>,
}

impl LevelProgress {
    #[must_use]
    pub fn from_scores(scores: impl IntoIterator<Item = (Level, PlayerScore)>) -> Self {
        Self {
            scores: scores.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn score(&self, level: Level) -> Option<PlayerScore> {
        self.scores.get(&level).copied()
    }

    #[must_use]
    pub fn is_qualified(&self, level: Level) -> bool {
        self.score(level)
            .is_some_and(|s| LevelConfig::for_level(level).qualifies(s.score))
    }

    /// Sequential locking: a level needs the previous one qualified, and every
    /// level before the final one locks once qualified.
    #[must_use]
    pub fn access(&self, level: Level) -> LevelAccess {
        if level.value() > 1 {
            let previous = Level::new(level.value() - 1);
            if !self.is_qualified(previous) {
                return LevelAccess::RequiresPrevious {
                    previous,
                    min_score: LevelConfig::for_level(previous).qualification_score(),
                };
            }
        }
        match self.score(level) {
            Some(score) if level < FINAL_LEVEL && self.is_qualified(level) => {
                LevelAccess::Passed { score }
            }
            prior => LevelAccess::Open { prior },
        }
    }
}

/// Reads recorded scores from the backend to decide which levels are unlocked.
#[derive(Clone)]
pub struct LevelGate {
    backend: Arc<dyn QuizBackend>,
}

impl LevelGate {
    #[must_use]
    pub fn new(backend: Arc<dyn QuizBackend>) -> Self {
        Self { backend }
    }

    /// Scores for every level up to `FINAL_LEVEL`. A failed lookup counts as
    /// not played.
    pub async fn progress(&self, student_id: StudentId) -> LevelProgress {
        let mut scores = Vec::new();
        for value in 1..=FINAL_LEVEL.value() {
            let level = Level::new(value);
            match self.backend.get_player_score(student_id, level).await {
                Ok(Some(score)) => scores.push((level, score)),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(student = %student_id, %level, error = %err, "score lookup failed");
                }
            }
        }
        LevelProgress::from_scores(scores)
    }

    pub async fn access(&self, student_id: StudentId, level: Level) -> LevelAccess {
        self.progress(student_id).await.access(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use escape_core::model::ScoreSubmission;

    fn scored(score: u32) -> PlayerScore {
        PlayerScore {
            score,
            time_taken: 120,
            total_questions: 8,
        }
    }

    #[test]
    fn fresh_player_can_only_start_level_one() {
        let progress = LevelProgress::default();
        assert_eq!(progress.access(Level::new(1)), LevelAccess::Open { prior: None });
        assert_eq!(
            progress.access(Level::new(2)),
            LevelAccess::RequiresPrevious {
                previous: Level::new(1),
                min_score: Some(4)
            }
        );
        assert!(!progress.access(Level::new(3)).is_open());
    }

    #[test]
    fn failed_level_stays_open_with_its_prior_score() {
        let progress = LevelProgress::from_scores([(Level::new(1), scored(3))]);
        assert_eq!(
            progress.access(Level::new(1)),
            LevelAccess::Open {
                prior: Some(scored(3))
            }
        );
        assert!(!progress.access(Level::new(2)).is_open());
    }

    #[test]
    fn qualified_levels_lock_and_unlock_the_next() {
        let progress = LevelProgress::from_scores([
            (Level::new(1), scored(4)),
            (Level::new(2), scored(6)),
        ]);
        assert_eq!(
            progress.access(Level::new(1)),
            LevelAccess::Passed { score: scored(4) }
        );
        assert_eq!(
            progress.access(Level::new(2)),
            LevelAccess::Passed { score: scored(6) }
        );
        assert_eq!(progress.access(Level::new(3)), LevelAccess::Open { prior: None });
    }

    #[test]
    fn final_level_stays_replayable() {
        let progress = LevelProgress::from_scores([
            (Level::new(1), scored(8)),
            (Level::new(2), scored(7)),
            (Level::new(3), scored(8)),
        ]);
        assert_eq!(
            progress.access(Level::new(3)),
            LevelAccess::Open {
                prior: Some(scored(8))
            }
        );
    }

    #[tokio::test]
    async fn gate_reads_scores_from_the_backend() {
        let backend = InMemoryBackend::new();
        let student = backend.login("Ada", "Cambridge").await.unwrap().student_id;
        let gate = LevelGate::new(Arc::new(backend.clone()));
        assert!(!gate.access(student, Level::new(2)).await.is_open());

        backend
            .submit_score(&ScoreSubmission {
                student_id: student,
                level: Level::new(1),
                score: 5,
                time_taken: 90,
                total_questions: 8,
            })
            .await
            .unwrap();
        assert!(matches!(
            gate.access(student, Level::new(1)).await,
            LevelAccess::Passed { .. }
        ));
        assert_eq!(
            gate.access(student, Level::new(2)).await,
            LevelAccess::Open { prior: None }
        );
    }
}
