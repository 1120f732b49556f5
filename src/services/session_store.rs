//! Durable store for session records.
//!
//! `SessionStore` is the narrow capability the session service needs:
//! get/put/delete by id, plus a stale-session scan for the background sweep.
//! The production implementation persists rows in SQLite; tests substitute
//! an in-memory double.

use crate::errors::{UploadError, UploadResult};
use crate::models::session::{Session, SessionRow};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

pub trait SessionStore: Clone + Send + Sync + 'static {
    /// Fetch a session by id. `Ok(None)` when no record exists; a record
    /// that exists but fails row validation is an error, not a miss.
    fn get(&self, id: Uuid) -> impl Future<Output = UploadResult<Option<Session>>> + Send;

    /// Insert or overwrite the record for `session.id`.
    fn put(&self, session: &Session) -> impl Future<Output = UploadResult<()>> + Send;

    /// Persist a recomputed `uploaded_size`, but only while the record is
    /// still `in_progress`. Returns whether a record was updated, so a chunk
    /// retry that raced completion or deletion can tell the session is no
    /// longer live instead of resurrecting it.
    fn update_progress(
        &self,
        id: Uuid,
        uploaded_size: i64,
    ) -> impl Future<Output = UploadResult<bool>> + Send;

    /// Remove the record. Succeeds when the record is already absent.
    fn delete(&self, id: Uuid) -> impl Future<Output = UploadResult<()>> + Send;

    /// Ids of `in_progress` sessions created before `cutoff`.
    fn stale_in_progress(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = UploadResult<Vec<Uuid>>> + Send;

    /// Cheap connectivity probe for readiness checks.
    fn ping(&self) -> impl Future<Output = UploadResult<()>> + Send;
}

/// SQLite-backed session record store.
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: Arc<SqlitePool>,
}

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

impl SqliteSessionStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Statements are idempotent, so running this
    /// on every startup is safe.
    pub async fn migrate(db: &SqlitePool) -> UploadResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::debug!("running {} migration statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(db).await?;
        }
        Ok(())
    }
}

impl SessionStore for SqliteSessionStore {
    async fn get(&self, id: Uuid) -> UploadResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, record_version, file_name, file_size, chunk_size,
                    uploaded_size, status, created_at
             FROM sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => row
                .decode()
                .map(Some)
                .map_err(|reason| UploadError::CorruptRecord { id, reason }),
        }
    }

    async fn put(&self, session: &Session) -> UploadResult<()> {
        let row = SessionRow::encode(session);
        sqlx::query(
            "INSERT INTO sessions (
                id, record_version, file_name, file_size, chunk_size,
                uploaded_size, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                record_version = excluded.record_version,
                uploaded_size = excluded.uploaded_size,
                status = excluded.status",
        )
        .bind(row.id)
        .bind(row.record_version)
        .bind(&row.file_name)
        .bind(row.file_size)
        .bind(row.chunk_size)
        .bind(row.uploaded_size)
        .bind(&row.status)
        .bind(row.created_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    async fn update_progress(&self, id: Uuid, uploaded_size: i64) -> UploadResult<bool> {
        let result = sqlx::query(
            "UPDATE sessions SET uploaded_size = ? WHERE id = ? AND status = 'in_progress'",
        )
        .bind(uploaded_size)
        .bind(id)
        .execute(&*self.db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> UploadResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn stale_in_progress(&self, cutoff: DateTime<Utc>) -> UploadResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM sessions WHERE status = 'in_progress' AND created_at < ?",
        )
        .bind(cutoff)
        .fetch_all(&*self.db)
        .await?;
        Ok(ids)
    }

    async fn ping(&self) -> UploadResult<()> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one != 1 {
            return Err(UploadError::Io(std::io::Error::other(
                "unexpected ping result",
            )));
        }
        Ok(())
    }
}
