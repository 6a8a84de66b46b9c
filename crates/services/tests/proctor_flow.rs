use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use escape_core::escalation::Escalation;
use escape_core::integrity::EnvironmentSignal;
use escape_core::model::{
    Advance, Level, Notice, PlayerIdentity, QuestionId, QuestionRecord, ScoreSubmission,
    SessionKey, SessionSnapshot, StudentId, SubmitTrigger, ViolationReason,
};
use escape_core::policy::{LevelConfig, LevelConfigDraft};
use escape_core::time::{fixed_clock, fixed_now};
use services::{
    Clock, InMemoryBackend, ProctorLoopService, ProctorSession, SignalOutcome, SubmissionOutcome,
};
use storage::repository::{InMemorySnapshotStore, SnapshotStore, StorageError};

const LEVEL: u8 = 2;

fn bank(n: u64) -> Vec<QuestionRecord> {
    (1..=n)
        .map(|id| QuestionRecord {
            id: QuestionId::new(id),
            text: format!("Question {id}"),
            choices: (0..4).map(|c| format!("q{id} choice {c}")).collect(),
            answer_index: 1,
        })
        .collect()
}

fn player() -> PlayerIdentity {
    PlayerIdentity::new(StudentId::new(21), "Ada", "Cambridge")
}

struct Harness {
    store: InMemorySnapshotStore,
    backend: InMemoryBackend,
    service: ProctorLoopService,
}

fn harness(bank_size: u64, clock: Clock) -> Harness {
    let store = InMemorySnapshotStore::new();
    let backend = InMemoryBackend::new().with_bank(Level::new(LEVEL), bank(bank_size));
    let service = ProctorLoopService::new(clock, Arc::new(store.clone()), Arc::new(backend.clone()));
    Harness {
        store,
        backend,
        service,
    }
}

fn config() -> LevelConfig {
    LevelConfig::for_level(Level::new(LEVEL))
}

async fn answer_current(h: &Harness, session: &mut ProctorSession, correct: bool) -> Advance {
    let question = session.quiz().current_question();
    let right = question.correct_choice();
    let choice = if correct {
        right
    } else {
        (right + 1) % question.choice_count()
    };
    h.service.select(session, choice).await.unwrap();
    h.service.next(session).await.unwrap()
}

#[tokio::test]
async fn reload_resumes_position_and_countdown() {
    let h = harness(50, fixed_clock());
    let mut session = h.service.open(config(), player()).await.unwrap();
    h.service.acknowledge(&mut session);
    for _ in 0..3 {
        answer_current(&h, &mut session, true).await;
    }
    for _ in 0..180 {
        h.service.tick(&mut session).await;
    }
    assert_eq!(session.quiz().remaining_seconds(), 120);
    let question_ids: Vec<QuestionId> = session.quiz().questions().iter().map(|q| q.id()).collect();
    drop(session);

    let reloaded = h.service.open(config(), player()).await.unwrap();
    assert!(reloaded.is_resumed());
    assert_eq!(reloaded.quiz().current_index(), 3);
    assert_eq!(reloaded.quiz().remaining_seconds(), 120);
    assert_eq!(reloaded.quiz().answered_count(), 3);
    let reloaded_ids: Vec<QuestionId> =
        reloaded.quiz().questions().iter().map(|q| q.id()).collect();
    assert_eq!(reloaded_ids, question_ids);
}

#[tokio::test]
async fn fresh_session_is_written_through() {
    let h = harness(50, fixed_clock());
    let mut session = h.service.open(config(), player()).await.unwrap();
    assert_eq!(h.store.write_count(), 1);

    h.service.acknowledge(&mut session);
    h.service.tick(&mut session).await;
    h.service.select(&mut session, 0).await.unwrap();
    assert_eq!(h.store.write_count(), 3);

    let stored = h.store.restore(&session.key()).await.unwrap().unwrap();
    assert_eq!(stored.time, Some(299));
    assert_eq!(stored.selected_answers[0], Some(0));
}

#[tokio::test]
async fn six_correct_in_fifty_seconds_submits_expected_payload() {
    let h = harness(50, fixed_clock());
    let mut session = h.service.open(config(), player()).await.unwrap();
    assert_eq!(session.quiz().total_questions(), 8);
    h.service.acknowledge(&mut session);
    for _ in 0..50 {
        h.service.tick(&mut session).await;
    }

    for i in 0..8 {
        let advance = answer_current(&h, &mut session, i < 6).await;
        if i == 7 {
            assert_eq!(advance, Advance::Finished);
        }
    }
    let outcome = h
        .service
        .submit(&mut session, SubmitTrigger::Player)
        .await
        .unwrap();

    assert_eq!(
        h.backend.submissions(),
        [ScoreSubmission {
            student_id: StudentId::new(21),
            level: Level::new(LEVEL),
            score: 6,
            time_taken: 50,
            total_questions: 8,
        }]
    );
    let result = outcome.result().unwrap();
    assert_eq!((result.score, result.total, result.time_taken), (6, 8, 50));
    assert!(result.qualified);
    assert!(!h.store.contains(&session.key()));
}

#[tokio::test]
async fn timeout_counts_unanswered_as_wrong() {
    let h = harness(50, fixed_clock());
    let mut session = h.service.open(config(), player()).await.unwrap();
    h.service.acknowledge(&mut session);
    for _ in 0..3 {
        answer_current(&h, &mut session, true).await;
    }

    let mut ticks = 0;
    while h.service.tick(&mut session).await != escape_core::timer::TickOutcome::Expired {
        ticks += 1;
    }
    assert_eq!(ticks, 299);
    assert_eq!(
        session
            .quiz()
            .selected_answers()
            .iter()
            .filter(|a| a.is_none())
            .count(),
        5
    );

    let outcome = h
        .service
        .submit(&mut session, SubmitTrigger::Timeout)
        .await
        .unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(result.score, 3);
    assert_eq!(result.time_taken, 300);
    assert!(!result.qualified);
    assert_eq!(h.backend.submissions()[0].total_questions, 8);
}

#[tokio::test]
async fn three_tab_switches_three_seconds_apart_force_submission() {
    let mut clock = Clock::manual(fixed_now());
    let h = harness(50, clock.clone());
    let mut session = h.service.open(config(), player()).await.unwrap();
    h.service.acknowledge(&mut session);

    let hidden = EnvironmentSignal::VisibilityChanged { hidden: true };
    let mut outcomes = Vec::new();
    for _ in 0..3 {
        outcomes.push(h.service.handle_signal(&mut session, &hidden));
        clock.advance(ChronoDuration::seconds(3));
    }

    assert_eq!(
        outcomes[0],
        SignalOutcome::Escalated(Escalation::Warning {
            count: 1,
            reason: ViolationReason::TabSwitch
        })
    );
    assert_eq!(outcomes[1].notice(), Some(Notice::Warning { count: 2 }));
    assert_eq!(
        outcomes[2],
        SignalOutcome::Escalated(Escalation::ForceSubmit {
            count: 3,
            reason: ViolationReason::TabSwitch,
            delay: Duration::from_secs(1),
        })
    );
    assert!(session.violations().forced_submission_pending());

    let outcome = h
        .service
        .submit(&mut session, SubmitTrigger::Violations)
        .await
        .unwrap();
    assert!(matches!(outcome, SubmissionOutcome::Completed(_)));
    assert_eq!(h.backend.submissions().len(), 1);
}

#[tokio::test]
async fn signal_bursts_collapse_into_one_violation() {
    let h = harness(50, fixed_clock());
    let mut session = h.service.open(config(), player()).await.unwrap();
    h.service.acknowledge(&mut session);

    let t0 = fixed_now();
    h.service
        .handle_signal_at(&mut session, &EnvironmentSignal::WindowBlurred, t0);
    let second = h.service.handle_signal_at(
        &mut session,
        &EnvironmentSignal::VisibilityChanged { hidden: true },
        t0 + ChronoDuration::milliseconds(1500),
    );
    assert_eq!(second, SignalOutcome::Escalated(Escalation::Debounced));
    assert_eq!(session.violations().count(), 1);
}

#[tokio::test]
async fn racing_timeout_and_player_submit_send_one_score() {
    let h = harness(50, fixed_clock());
    let mut session = h.service.open(config(), player()).await.unwrap();
    h.service.acknowledge(&mut session);
    for _ in 0..8 {
        answer_current(&h, &mut session, true).await;
    }

    let first = h
        .service
        .submit(&mut session, SubmitTrigger::Timeout)
        .await
        .unwrap();
    let second = h
        .service
        .submit(&mut session, SubmitTrigger::Player)
        .await
        .unwrap();
    assert!(matches!(first, SubmissionOutcome::Completed(_)));
    assert_eq!(second, SubmissionOutcome::AlreadySubmitted);
    assert_eq!(h.backend.submissions().len(), 1);
    assert!(
        h.service
            .handle_signal(&mut session, &EnvironmentSignal::WindowBlurred)
            == SignalOutcome::Ignored
    );
}

#[tokio::test]
async fn failed_submission_surfaces_notice_and_stays_cleared() {
    let h = harness(50, fixed_clock());
    h.backend.fail_submissions(true);
    let mut session = h.service.open(config(), player()).await.unwrap();
    h.service.acknowledge(&mut session);

    let outcome = h
        .service
        .submit(&mut session, SubmitTrigger::Timeout)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        SubmissionOutcome::Failed {
            notice: Notice::SubmissionFailed
        }
    );
    assert_eq!(h.backend.submissions().len(), 1);
    assert!(session.is_submitted());
    assert!(!h.store.contains(&session.key()));
}

#[tokio::test(start_paused = true)]
async fn configured_attempts_retry_with_backoff() {
    let h = harness(50, fixed_clock());
    h.backend.fail_submissions(true);
    let config = LevelConfigDraft {
        submission_attempts: Some(3),
        ..LevelConfigDraft::new(LEVEL)
    }
    .validate()
    .unwrap();
    let mut session = h.service.open(config, player()).await.unwrap();

    let started = tokio::time::Instant::now();
    let outcome = h
        .service
        .submit(&mut session, SubmitTrigger::Violations)
        .await
        .unwrap();
    assert!(matches!(outcome, SubmissionOutcome::Failed { .. }));
    assert_eq!(h.backend.submissions().len(), 3);
    assert!(started.elapsed() >= Duration::from_millis(500 + 1000));
}

#[tokio::test]
async fn submitted_snapshot_is_not_resumed() {
    let h = harness(50, fixed_clock());
    let session = h.service.open(config(), player()).await.unwrap();
    let mut stale = session.snapshot();
    stale.submitted = true;
    h.store.persist(&session.key(), &stale).await.unwrap();

    let reopened = h.service.open(config(), player()).await.unwrap();
    assert!(!reopened.is_resumed());
    let key = SessionKey::new(Level::new(LEVEL), StudentId::new(21));
    let stored = h.store.restore(&key).await.unwrap().unwrap();
    assert!(!stored.submitted);
}

#[tokio::test]
async fn small_bank_yields_shorter_session() {
    let h = harness(5, fixed_clock());
    let session = h.service.open(config(), player()).await.unwrap();
    assert_eq!(session.quiz().total_questions(), 5);
}

/// Store whose deletes always fail.
#[derive(Clone, Default)]
struct StickyStore {
    inner: InMemorySnapshotStore,
}

#[async_trait]
impl SnapshotStore for StickyStore {
    async fn restore(&self, key: &SessionKey) -> Result<Option<SessionSnapshot>, StorageError> {
        self.inner.restore(key).await
    }

    async fn persist(
        &self,
        key: &SessionKey,
        snapshot: &SessionSnapshot,
    ) -> Result<(), StorageError> {
        self.inner.persist(key, snapshot).await
    }

    async fn clear(&self, _key: &SessionKey) -> Result<(), StorageError> {
        Err(StorageError::Connection("disk is read-only".into()))
    }
}

#[tokio::test]
async fn failed_clear_does_not_leave_a_resumable_session() {
    let store = StickyStore::default();
    let backend = InMemoryBackend::new().with_bank(Level::new(LEVEL), bank(10));
    let service =
        ProctorLoopService::new(fixed_clock(), Arc::new(store.clone()), Arc::new(backend.clone()));

    let mut session = service.open(config(), player()).await.unwrap();
    service.acknowledge(&mut session);
    let outcome = service
        .submit(&mut session, SubmitTrigger::Violations)
        .await
        .unwrap();
    assert!(matches!(outcome, SubmissionOutcome::Completed(_)));

    let stored = store.inner.restore(&session.key()).await.unwrap().unwrap();
    assert!(stored.submitted);

    let reopened = service.open(config(), player()).await.unwrap();
    assert!(!reopened.is_resumed());
    assert_eq!(backend.submissions().len(), 1);
}
