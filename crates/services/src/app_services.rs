use std::sync::Arc;

use escape_core::model::Level;
use escape_core::policy::{LevelConfig, LevelConfigDraft};
use storage::repository::Storage;

use crate::Clock;
use crate::backend::QuizBackend;
use crate::error::AppServicesError;
use crate::level_gate::LevelGate;
use crate::proctor::ProctorLoopService;

/// Assembles app-facing services around one storage and one backend.
#[derive(Clone)]
pub struct AppServices {
    backend: Arc<dyn QuizBackend>,
    level_gate: LevelGate,
    proctor_loop: Arc<ProctorLoopService>,
}

impl AppServices {
    /// Build services backed by `SQLite` snapshots, opened and migrated at `db_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        backend: Arc<dyn QuizBackend>,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::with_parts(&storage, backend, clock))
    }

    #[must_use]
    pub fn with_parts(storage: &Storage, backend: Arc<dyn QuizBackend>, clock: Clock) -> Self {
        let proctor_loop = Arc::new(ProctorLoopService::new(
            clock,
            Arc::clone(&storage.snapshots),
            Arc::clone(&backend),
        ));
        Self {
            level_gate: LevelGate::new(Arc::clone(&backend)),
            backend,
            proctor_loop,
        }
    }

    #[must_use]
    pub fn backend(&self) -> Arc<dyn QuizBackend> {
        Arc::clone(&self.backend)
    }

    #[must_use]
    pub fn level_gate(&self) -> &LevelGate {
        &self.level_gate
    }

    #[must_use]
    pub fn proctor_loop(&self) -> Arc<ProctorLoopService> {
        Arc::clone(&self.proctor_loop)
    }
}

/// Level configuration with optional overrides for duration and violation threshold.
///
/// # Errors
///
/// Returns `PolicyError` (wrapped) if an override is zero.
pub fn level_config(
    level: Level,
    duration_secs: Option<u32>,
    violation_threshold: Option<u32>,
) -> Result<LevelConfig, AppServicesError> {
    let draft = LevelConfigDraft {
        duration_secs,
        violation_threshold,
        ..LevelConfigDraft::new(level.value())
    };
    Ok(draft.validate()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use escape_core::model::{PlayerIdentity, QuestionId, QuestionRecord, StudentId};
    use escape_core::policy::PolicyError;

    #[test]
    fn level_config_applies_overrides() {
        let config = level_config(Level::new(3), Some(60), Some(5)).unwrap();
        assert_eq!(config.duration_secs(), 60);
        assert_eq!(config.policy().violation_threshold(), 5);
        assert_eq!(config.qualification_score(), Some(6));
    }

    #[test]
    fn level_config_rejects_zero_threshold() {
        let err = level_config(Level::new(1), None, Some(0)).unwrap_err();
        assert!(matches!(err, AppServicesError::Policy(PolicyError::ZeroThreshold)));
    }

    #[tokio::test]
    async fn in_memory_parts_share_backend() {
        let backend = InMemoryBackend::new();
        let services =
            AppServices::with_parts(&Storage::in_memory(), Arc::new(backend.clone()), Clock::default());
        let login = services.backend().login("Ada", "Cambridge").await.unwrap();
        assert_eq!(login.student_id.value(), 1);
    }

    #[tokio::test]
    async fn sqlite_services_persist_opened_sessions() {
        let backend = InMemoryBackend::new().with_bank(
            Level::new(1),
            vec![QuestionRecord {
                id: QuestionId::new(1),
                text: "Q1".into(),
                choices: vec!["a".into(), "b".into()],
                answer_index: 1,
            }],
        );
        let services = AppServices::new_sqlite(
            "sqlite:file:memdb_app_services?mode=memory&cache=shared",
            Arc::new(backend),
            Clock::default(),
        )
        .await
        .unwrap();
        let player = PlayerIdentity::new(StudentId::new(3), "Ada", "Cambridge");
        let config = LevelConfig::for_level(Level::new(1));

        let first = services
            .proctor_loop()
            .open(config.clone(), player.clone())
            .await
            .unwrap();
        assert!(!first.is_resumed());
        let again = services.proctor_loop().open(config, player).await.unwrap();
        assert!(again.is_resumed());
        assert!(services.level_gate().access(StudentId::new(3), Level::new(1)).await.is_open());
    }
}
