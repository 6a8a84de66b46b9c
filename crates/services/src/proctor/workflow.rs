use std::sync::Arc;

use chrono::{DateTime, Utc};

use escape_core::escalation::Escalation;
use escape_core::integrity::EnvironmentSignal;
use escape_core::model::{
    Advance, Notice, PlayerIdentity, SessionKey, SessionStateError, SubmitTrigger, TerminalResult,
};
use escape_core::policy::LevelConfig;
use escape_core::timer::TickOutcome;
use storage::repository::{SnapshotStore, StorageError};

use super::loader::QuestionSetLoader;
use super::session::{ProctorSession, SignalOutcome};
use crate::Clock;
use crate::backend::QuizBackend;
use crate::error::ProctorError;

/// Terminal state of a submission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Completed(TerminalResult),
    /// Every attempt failed. The session is terminal and the snapshot is gone.
    Failed { notice: Notice },
    /// The session had already been submitted; nothing was sent.
    AlreadySubmitted,
}

impl SubmissionOutcome {
    #[must_use]
    pub fn result(&self) -> Option<&TerminalResult> {
        match self {
            Self::Completed(result) => Some(result),
            _ => None,
        }
    }
}

/// Orchestrates restore, write-through persistence and score submission for
/// proctored levels.
#[derive(Clone)]
pub struct ProctorLoopService {
    clock: Clock,
    snapshots: Arc<dyn SnapshotStore>,
    backend: Arc<dyn QuizBackend>,
    loader: QuestionSetLoader,
}

impl ProctorLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        snapshots: Arc<dyn SnapshotStore>,
        backend: Arc<dyn QuizBackend>,
    ) -> Self {
        let loader = QuestionSetLoader::new(Arc::clone(&backend));
        Self {
            clock,
            snapshots,
            backend,
            loader,
        }
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Resume the persisted session for this player and level, or prepare and
    /// persist a fresh one. A corrupt or already-submitted snapshot is discarded.
    ///
    /// # Errors
    ///
    /// Returns `ProctorError` if the store cannot be read or no question set can
    /// be prepared.
    pub async fn open(
        &self,
        config: LevelConfig,
        player: PlayerIdentity,
    ) -> Result<ProctorSession, ProctorError> {
        let key = SessionKey::new(config.level(), player.student_id);
        match self.snapshots.restore(&key).await {
            Ok(Some(snapshot)) => {
                match ProctorSession::resume(config.clone(), player.clone(), snapshot) {
                    Ok(session) => {
                        tracing::info!(
                            %key,
                            index = session.quiz().current_index(),
                            remaining = session.quiz().remaining_seconds(),
                            "session resumed"
                        );
                        return Ok(session);
                    }
                    Err(err) => {
                        tracing::info!(%key, error = %err, "discarding unusable snapshot");
                        self.discard(&key).await;
                    }
                }
            }
            Ok(None) => {}
            Err(StorageError::Serialization(reason)) => {
                tracing::warn!(%key, %reason, "discarding corrupt snapshot");
                self.discard(&key).await;
            }
            Err(err) => return Err(err.into()),
        }

        let questions = self.loader.prepare_session(&config).await?;
        let session = ProctorSession::new(config, player, questions)?;
        self.snapshots.persist(&key, &session.snapshot()).await?;
        tracing::info!(%key, total = session.quiz().total_questions(), "session opened");
        Ok(session)
    }

    /// Start proctoring and the countdown. Returns true if the timer started.
    pub fn acknowledge(&self, session: &mut ProctorSession) -> bool {
        let started = session.acknowledge_proctoring();
        if started {
            tracing::info!(
                key = %session.key(),
                remaining = session.quiz().remaining_seconds(),
                "timer started"
            );
        }
        started
    }

    /// One-second tick, persisted when it changed the countdown.
    pub async fn tick(&self, session: &mut ProctorSession) -> TickOutcome {
        let outcome = session.tick();
        match outcome {
            TickOutcome::Idle => {}
            TickOutcome::Ticked { .. } => self.persist(session).await,
            TickOutcome::Expired => {
                tracing::info!(key = %session.key(), "timer expired");
                self.persist(session).await;
            }
        }
        outcome
    }

    /// # Errors
    ///
    /// Returns `SessionStateError` if the choice was rejected.
    pub async fn select(
        &self,
        session: &mut ProctorSession,
        choice: usize,
    ) -> Result<(), SessionStateError> {
        session.select(choice)?;
        self.persist(session).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionStateError` if the current question is unanswered or the
    /// session is terminal.
    pub async fn next(&self, session: &mut ProctorSession) -> Result<Advance, SessionStateError> {
        let advance = session.next()?;
        if matches!(advance, Advance::Moved { .. }) {
            self.persist(session).await;
        }
        Ok(advance)
    }

    pub fn handle_signal(
        &self,
        session: &mut ProctorSession,
        signal: &EnvironmentSignal,
    ) -> SignalOutcome {
        self.handle_signal_at(session, signal, self.clock.now())
    }

    pub fn handle_signal_at(
        &self,
        session: &mut ProctorSession,
        signal: &EnvironmentSignal,
        now: DateTime<Utc>,
    ) -> SignalOutcome {
        let outcome = session.on_signal(signal, now);
        let key = session.key();
        match outcome {
            SignalOutcome::Escalated(escalation) => match escalation {
                Escalation::Warning { count, reason } => {
                    tracing::warn!(%key, count, %reason, "violation accepted");
                }
                Escalation::ForceSubmit { count, reason, delay } => {
                    tracing::warn!(
                        %key,
                        count,
                        %reason,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "violation threshold reached; forced submission scheduled"
                    );
                }
                Escalation::Debounced => {
                    tracing::debug!(%key, "violation debounced");
                }
                Escalation::Ignored => {}
            },
            SignalOutcome::NavigationBlocked => tracing::debug!(%key, "navigation blocked"),
            SignalOutcome::Ignored => {}
        }
        outcome
    }

    /// Submit the session exactly once.
    ///
    /// The terminal flag is set and the snapshot retired before the backend is
    /// called. The backend is tried up to `submission_attempts` times with a
    /// doubling backoff.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Unanswered` for an incomplete player submission.
    pub async fn submit(
        &self,
        session: &mut ProctorSession,
        trigger: SubmitTrigger,
    ) -> Result<SubmissionOutcome, SessionStateError> {
        let Some(payload) = session.begin_submission(trigger)? else {
            return Ok(SubmissionOutcome::AlreadySubmitted);
        };
        let key = session.key();
        tracing::info!(
            %key,
            ?trigger,
            score = payload.score,
            time_taken = payload.time_taken,
            "submission started"
        );
        self.retire(session).await;

        let policy = session.config().policy();
        let attempts = policy.submission_attempts();
        let mut backoff = policy.retry_backoff();
        for attempt in 1..=attempts {
            match self.backend.submit_score(&payload).await {
                Ok(()) => {
                    tracing::info!(%key, attempt, "submission succeeded");
                    return Ok(SubmissionOutcome::Completed(session.terminal_result()));
                }
                Err(err) => {
                    tracing::warn!(%key, attempt, attempts, error = %err, "submission failed");
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                    }
                }
            }
        }
        Ok(SubmissionOutcome::Failed {
            notice: Notice::SubmissionFailed,
        })
    }

    async fn persist(&self, session: &ProctorSession) {
        if session.is_submitted() {
            return;
        }
        if let Err(err) = self.snapshots.persist(&session.key(), &session.snapshot()).await {
            tracing::warn!(key = %session.key(), error = %err, "snapshot persist failed");
        }
    }

    /// Remove the snapshot of a submitted session. If the delete fails, the
    /// submitted snapshot is written over it so `open` will not resume it.
    async fn retire(&self, session: &ProctorSession) {
        let key = session.key();
        let Err(err) = self.snapshots.clear(&key).await else {
            return;
        };
        tracing::warn!(%key, error = %err, "snapshot clear failed; marking it submitted");
        if let Err(err) = self.snapshots.persist(&key, &session.snapshot()).await {
            tracing::error!(%key, error = %err, "submitted session left resumable");
        }
    }

    async fn discard(&self, key: &SessionKey) {
        if let Err(err) = self.snapshots.clear(key).await {
            tracing::warn!(%key, error = %err, "snapshot clear failed");
        }
    }
}
