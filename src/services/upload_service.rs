//! Session lifecycle orchestration.
//!
//! `UploadService` is the only writer of either store. It owns the
//! chunk-size policy, progress accounting, status computation, completion,
//! and deletion. Progress is always recomputed from the chunk store's
//! authoritative presence set, never taken from the client, so concurrent
//! chunk uploads for one session cannot lose updates.

use crate::errors::{UploadError, UploadResult};
use crate::models::session::{
    MAX_CHUNK_COUNT, MAX_CHUNK_SIZE, Session, SessionStatus, chunk_size_for,
};
use crate::services::admission::AdmissionController;
use crate::services::assembler::assemble_chunks;
use crate::services::chunk_store::{ChunkEntry, ChunkStore, FsChunkStore};
use crate::services::session_store::{SessionStore, SqliteSessionStore};
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// The production service: SQLite records, filesystem chunks.
pub type AppService = UploadService<SqliteSessionStore, FsChunkStore>;

const MAX_FILE_NAME_LEN: usize = 1024;

/// Result of `create_session`.
#[derive(Serialize, Clone, Debug)]
pub struct NewSession {
    pub session_id: Uuid,
    pub chunk_size: i64,
}

/// Acknowledgement of one stored chunk.
#[derive(Serialize, Clone, Debug)]
pub struct ChunkAck {
    pub session_id: Uuid,
    pub index: u64,
    pub byte_len: u64,
    pub uploaded_size: i64,
}

/// Progress view returned by `upload_status`.
#[derive(Serialize, Clone, Debug)]
pub struct UploadStatusView {
    pub file_size: i64,
    pub uploaded_size: i64,
    pub remaining_size: i64,
    pub completed: bool,
    pub status: SessionStatus,
    /// Sorted missing chunk indices; omitted once the upload is complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_chunks: Option<Vec<u64>>,
}

/// Result of a successful completion.
#[derive(Serialize, Clone, Debug)]
pub struct CompletedUpload {
    pub session_id: Uuid,
    pub file_name: String,
    #[serde(skip)]
    pub output_path: PathBuf,
}

#[derive(Clone)]
pub struct UploadService<S, C> {
    sessions: S,
    chunks: C,
    admission: AdmissionController,
    output_dir: PathBuf,
    max_chunk_size: i64,
}

impl<S: SessionStore, C: ChunkStore> UploadService<S, C> {
    pub fn new(
        sessions: S,
        chunks: C,
        admission: AdmissionController,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sessions,
            chunks,
            admission,
            output_dir: output_dir.into(),
            max_chunk_size: MAX_CHUNK_SIZE,
        }
    }

    /// Override the chunk-size cap. Tests use small caps to exercise the
    /// multi-chunk paths without gigabyte fixtures.
    pub fn with_max_chunk_size(mut self, max_chunk_size: i64) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    /// Free admission slots right now, for readiness reporting.
    pub fn available_slots(&self) -> usize {
        self.admission.available()
    }

    /// Start a session for `file_name` of `file_size` bytes and pick its
    /// chunk size.
    pub async fn create_session(
        &self,
        file_name: &str,
        file_size: i64,
    ) -> UploadResult<NewSession> {
        let _permit = self.admission.acquire().await?;

        ensure_file_name_safe(file_name)?;
        if file_size <= 0 {
            return Err(UploadError::validation("File size must be positive."));
        }

        let chunk_size = chunk_size_for(file_size, self.max_chunk_size);
        let chunk_count = (file_size as u64).div_ceil(chunk_size as u64);
        if chunk_count > MAX_CHUNK_COUNT {
            return Err(UploadError::Validation(format!(
                "File of {file_size} bytes would need {chunk_count} chunks (limit {MAX_CHUNK_COUNT})."
            )));
        }

        let session = Session::new(file_name.to_string(), file_size, chunk_size);
        self.sessions.put(&session).await?;

        tracing::info!(
            session_id = %session.id,
            file_name,
            file_size,
            chunk_size,
            "created upload session"
        );
        Ok(NewSession {
            session_id: session.id,
            chunk_size,
        })
    }

    /// Store the chunk at `index`, then recompute `uploaded_size` from the
    /// chunks actually present. Re-uploading an index overwrites it, so the
    /// operation is safe to retry.
    pub async fn upload_chunk<B>(
        &self,
        session_id: Uuid,
        index: u64,
        data: B,
    ) -> UploadResult<ChunkAck>
    where
        B: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        let _permit = self.admission.acquire().await?;

        let session = self.in_progress(session_id).await?;
        let chunk_count = session.chunk_count();
        if index >= chunk_count {
            return Err(UploadError::Validation(format!(
                "Chunk index {index} out of range [0, {chunk_count})."
            )));
        }

        let byte_len = self.chunks.put_chunk(session_id, index, data).await?;

        let entries = self.chunks.list_chunks(session_id).await?;
        let uploaded_size = uploaded_bytes(&session, &entries);
        // Conditional update: the session may have been completed or deleted
        // while the chunk bytes were streaming in. An unconditional write here
        // would revert a terminal status or resurrect a deleted record.
        if !self.sessions.update_progress(session_id, uploaded_size).await? {
            self.chunks.delete_chunks(session_id).await?;
            return Err(UploadError::SessionNotFound(session_id));
        }

        tracing::debug!(
            session_id = %session_id,
            index,
            byte_len,
            uploaded_size,
            "stored chunk"
        );
        Ok(ChunkAck {
            session_id,
            index,
            byte_len,
            uploaded_size,
        })
    }

    /// Current progress, recomputed from the chunk store for live sessions.
    pub async fn upload_status(&self, session_id: Uuid) -> UploadResult<UploadStatusView> {
        let _permit = self.admission.acquire().await?;

        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(UploadError::SessionNotFound(session_id))?;

        // Terminal sessions no longer have chunks on disk; report the record.
        if session.status != SessionStatus::InProgress {
            return Ok(UploadStatusView {
                file_size: session.file_size,
                uploaded_size: session.uploaded_size,
                remaining_size: session.file_size - session.uploaded_size,
                completed: session.status == SessionStatus::Completed,
                status: session.status,
                missing_chunks: None,
            });
        }

        let entries = self.chunks.list_chunks(session_id).await?;
        let uploaded = uploaded_bytes(&session, &entries);
        let missing = missing_indices(&session, &entries);
        let completed = uploaded >= session.file_size && missing.is_empty();

        Ok(UploadStatusView {
            file_size: session.file_size,
            uploaded_size: uploaded,
            remaining_size: session.file_size - uploaded,
            completed,
            status: session.status,
            missing_chunks: if completed { None } else { Some(missing) },
        })
    }

    /// Assemble the artifact once every chunk is present, clean up the
    /// chunks, and mark the session completed.
    ///
    /// Assembly failure leaves the session `in_progress` so completion can
    /// be retried; a repeated call after success is acknowledged without
    /// reassembling.
    pub async fn complete_upload(&self, session_id: Uuid) -> UploadResult<CompletedUpload> {
        let _permit = self.admission.acquire().await?;

        let session = self
            .sessions
            .get(session_id)
            .await?
            .ok_or(UploadError::SessionNotFound(session_id))?;

        let output_path = self.output_dir.join(&session.file_name);
        if session.status == SessionStatus::Completed {
            return Ok(CompletedUpload {
                session_id,
                file_name: session.file_name,
                output_path,
            });
        }
        if session.status != SessionStatus::InProgress {
            return Err(UploadError::SessionNotFound(session_id));
        }

        let entries = self.chunks.list_chunks(session_id).await?;
        let missing = missing_indices(&session, &entries);
        if !missing.is_empty() {
            return Err(UploadError::MissingChunks(missing));
        }

        assemble_chunks(&self.chunks, &session, &output_path).await?;

        self.chunks.delete_chunks(session_id).await?;
        let mut session = session;
        session.uploaded_size = session.file_size;
        session.status = SessionStatus::Completed;
        self.sessions.put(&session).await?;

        tracing::info!(
            session_id = %session_id,
            file_name = %session.file_name,
            "completed upload"
        );
        Ok(CompletedUpload {
            session_id,
            file_name: session.file_name,
            output_path,
        })
    }

    /// Cancel a session: delete its chunks, then its record. Idempotent —
    /// deleting an unknown session succeeds. If chunk deletion fails the
    /// record stays intact so nothing half-deleted is observable.
    pub async fn delete_session(&self, session_id: Uuid) -> UploadResult<()> {
        let _permit = self.admission.acquire().await?;

        // A corrupt record must still be deletable.
        let record = match self.sessions.get(session_id).await {
            Ok(record) => record,
            Err(UploadError::CorruptRecord { .. }) => None,
            Err(err) => return Err(err),
        };

        self.chunks.delete_chunks(session_id).await?;

        if let Some(mut session) = record {
            if session.status == SessionStatus::InProgress {
                session.status = SessionStatus::Cancelled;
                self.sessions.put(&session).await?;
            }
        }
        self.sessions.delete(session_id).await?;

        tracing::info!(session_id = %session_id, "deleted upload session");
        Ok(())
    }

    /// Drop `in_progress` sessions older than `ttl`, chunks included.
    /// Returns how many were purged.
    pub async fn purge_stale(&self, ttl: Duration) -> UploadResult<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(ttl)
                .map_err(|err| UploadError::validation(err.to_string()))?;
        let stale = self.sessions.stale_in_progress(cutoff).await?;
        let count = stale.len();

        for session_id in stale {
            self.chunks.delete_chunks(session_id).await?;
            self.sessions.delete(session_id).await?;
            tracing::info!(session_id = %session_id, "purged stale upload session");
        }
        Ok(count)
    }

    /// Readiness probe: both stores must answer.
    pub async fn check_stores(&self) -> (UploadResult<()>, UploadResult<()>) {
        (self.sessions.ping().await, self.chunks.ping().await)
    }

    async fn in_progress(&self, session_id: Uuid) -> UploadResult<Session> {
        match self.sessions.get(session_id).await? {
            Some(session) if session.status == SessionStatus::InProgress => Ok(session),
            _ => Err(UploadError::SessionNotFound(session_id)),
        }
    }
}

/// Sum of bytes present for the session, counting only in-range indices and
/// clamped to `file_size` so the record invariant holds even against
/// oversized chunks.
fn uploaded_bytes(session: &Session, entries: &[ChunkEntry]) -> i64 {
    let chunk_count = session.chunk_count();
    let sum: i64 = entries
        .iter()
        .filter(|e| e.index < chunk_count)
        .map(|e| e.byte_len as i64)
        .sum();
    sum.min(session.file_size)
}

/// Sorted set difference of `[0, chunk_count)` and the indices present.
fn missing_indices(session: &Session, entries: &[ChunkEntry]) -> Vec<u64> {
    let present: HashSet<u64> = entries.iter().map(|e| e.index).collect();
    (0..session.chunk_count())
        .filter(|index| !present.contains(index))
        .collect()
}

/// File names become artifact paths under the output directory, so reject
/// anything path-like: empty, oversized, absolute, traversing, or carrying
/// control bytes or separators.
fn ensure_file_name_safe(file_name: &str) -> UploadResult<()> {
    if file_name.is_empty() {
        return Err(UploadError::validation("File name must not be empty."));
    }
    if file_name.len() > MAX_FILE_NAME_LEN {
        return Err(UploadError::validation("File name is too long."));
    }
    if file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
        return Err(UploadError::validation(
            "File name must not contain path separators or `..`.",
        ));
    }
    if file_name.bytes().any(|b| b.is_ascii_control()) {
        return Err(UploadError::validation(
            "File name must not contain control characters.",
        ));
    }
    Ok(())
}
