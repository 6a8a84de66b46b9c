use escape_core::model::{
    Level, Question, QuestionId, QuizSession, SessionKey, SessionSnapshot, StudentId,
};
use storage::repository::{SnapshotStore, StorageError};
use storage::sqlite::SqliteRepository;

fn build_session(key: SessionKey) -> QuizSession {
    let questions = (1..=3)
        .map(|id| {
            Question::new(
                QuestionId::new(id),
                format!("Q{id}"),
                vec!["a".into(), "b".into(), "c".into()],
                2,
            )
            .unwrap()
        })
        .collect();
    QuizSession::new(key, questions, 300).unwrap()
}

#[tokio::test]
async fn sqlite_snapshot_roundtrip_and_overwrite() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_snapshots?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let key = SessionKey::new(Level::new(2), StudentId::new(7));
    let mut session = build_session(key);
    repo.persist(&key, &SessionSnapshot::capture(&session))
        .await
        .unwrap();

    session.start_timer();
    session.select(2).unwrap();
    session.advance().unwrap();
    session.tick();
    let latest = SessionSnapshot::capture(&session);
    repo.persist(&key, &latest).await.unwrap();

    let restored = repo.restore(&key).await.unwrap().expect("snapshot present");
    assert_eq!(restored, latest);
    assert_eq!(restored.current_index, 1);
    assert_eq!(restored.time, Some(299));

    repo.clear(&key).await.unwrap();
    assert!(repo.restore(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_migrate_twice?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("first migrate");
    repo.migrate().await.expect("second migrate");
}

#[tokio::test]
async fn sqlite_reports_corrupt_payloads() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_corrupt?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    let key = SessionKey::new(Level::new(3), StudentId::new(1));
    sqlx::query(
        "INSERT INTO session_snapshots (storage_key, level, student_id, payload, updated_at)
         VALUES (?1, 3, 1, '{\"questions\": 5}', '2024-01-01T00:00:00Z')",
    )
    .bind(key.storage_key())
    .execute(repo.pool())
    .await
    .unwrap();

    let err = repo.restore(&key).await.unwrap_err();
    assert!(matches!(err, StorageError::Serialization(_)));
}
