use chrono::Utc;
use escape_core::model::{SessionKey, SessionSnapshot};
use sqlx::Row;

use super::SqliteRepository;
use crate::repository::{SnapshotStore, StorageError, decode_snapshot, encode_snapshot};

fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn student_i64(key: &SessionKey) -> Result<i64, StorageError> {
    i64::try_from(key.student_id().value())
        .map_err(|_| StorageError::Serialization("student_id overflow".into()))
}

#[async_trait::async_trait]
impl SnapshotStore for SqliteRepository {
    async fn restore(&self, key: &SessionKey) -> Result<Option<SessionSnapshot>, StorageError> {
        let row = sqlx::query("SELECT payload FROM session_snapshots WHERE storage_key = ?1")
            .bind(key.storage_key())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: String = row
            .try_get("payload")
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        decode_snapshot(&payload).map(Some)
    }

    async fn persist(
        &self,
        key: &SessionKey,
        snapshot: &SessionSnapshot,
    ) -> Result<(), StorageError> {
        let payload = encode_snapshot(snapshot)?;
        sqlx::query(
            r"
                INSERT INTO session_snapshots (storage_key, level, student_id, payload, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(storage_key) DO UPDATE SET
                    payload = excluded.payload,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(key.storage_key())
        .bind(i64::from(key.level().value()))
        .bind(student_i64(key)?)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn clear(&self, key: &SessionKey) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM session_snapshots WHERE storage_key = ?1")
            .bind(key.storage_key())
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            tracing::debug!(key = %key, "no snapshot to clear");
        }
        Ok(())
    }
}
