//! Upload session record and its row codec.
//!
//! The record format is explicitly versioned: every row carries
//! `record_version`, and rows are validated on read so a corrupt or
//! partially-written record is detected instead of silently misinterpreted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Largest chunk size the service will ever hand out (1 GiB).
pub const MAX_CHUNK_SIZE: i64 = 1024 * 1024 * 1024;

/// Current on-disk record version. Bump when the row shape changes.
pub const RECORD_VERSION: i64 = 1;

/// Most chunks a single session may span. Caps the size of the missing-index
/// computation; at the 1 GiB chunk cap this still allows ~100 TB uploads.
pub const MAX_CHUNK_COUNT: u64 = 100_000;

/// Lifecycle state of an upload session.
///
/// `InProgress` is the only non-terminal state; `Completed` and `Cancelled`
/// never transition away.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(SessionStatus::InProgress),
            "completed" => Some(SessionStatus::Completed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }
}

/// One upload session: metadata only, never chunk bytes.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Session {
    /// Opaque unique identifier, generated at creation.
    pub id: Uuid,

    /// Client-supplied name of the file being uploaded.
    pub file_name: String,

    /// Total expected bytes. Immutable after creation.
    pub file_size: i64,

    /// Chunk size chosen at creation by [`chunk_size_for`]. Immutable.
    pub chunk_size: i64,

    /// Sum of byte lengths of the chunks currently present, recomputed from
    /// the chunk store after every chunk write. Never client-supplied.
    pub uploaded_size: i64,

    pub status: SessionStatus,

    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh `in_progress` session for a validated name and size.
    pub fn new(file_name: String, file_size: i64, chunk_size: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name,
            file_size,
            chunk_size,
            uploaded_size: 0,
            status: SessionStatus::InProgress,
            created_at: Utc::now(),
        }
    }

    /// Number of chunks the file splits into: `ceil(file_size / chunk_size)`.
    pub fn chunk_count(&self) -> u64 {
        (self.file_size as u64).div_ceil(self.chunk_size as u64)
    }
}

/// Chunk-size policy: the whole file in one chunk when it fits under the
/// maximum, otherwise the maximum (the final chunk may run short). Caps
/// per-request memory while keeping per-chunk overhead minimal for small
/// files.
pub fn chunk_size_for(file_size: i64, max_chunk_size: i64) -> i64 {
    file_size.min(max_chunk_size)
}

/// Raw `sessions` row as stored in SQLite. Decoded into [`Session`] through
/// [`SessionRow::decode`], which is the only path from storage bytes to a
/// live record.
#[derive(FromRow, Debug)]
pub struct SessionRow {
    pub id: Uuid,
    pub record_version: i64,
    pub file_name: String,
    pub file_size: i64,
    pub chunk_size: i64,
    pub uploaded_size: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl SessionRow {
    /// Validate and decode a stored row.
    ///
    /// Rejects unknown record versions, unknown status strings, and any row
    /// violating the session invariants (`file_size > 0`,
    /// `0 < chunk_size <= MAX_CHUNK_SIZE`, `0 <= uploaded_size <= file_size`).
    pub fn decode(self) -> Result<Session, String> {
        if self.record_version != RECORD_VERSION {
            return Err(format!(
                "unsupported record version {} (expected {})",
                self.record_version, RECORD_VERSION
            ));
        }
        let status = SessionStatus::parse(&self.status)
            .ok_or_else(|| format!("unknown status `{}`", self.status))?;
        if self.file_name.is_empty() {
            return Err("empty file name".into());
        }
        if self.file_size <= 0 {
            return Err(format!("non-positive file size {}", self.file_size));
        }
        if self.chunk_size <= 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(format!("chunk size {} out of range", self.chunk_size));
        }
        if self.uploaded_size < 0 || self.uploaded_size > self.file_size {
            return Err(format!(
                "uploaded size {} outside [0, {}]",
                self.uploaded_size, self.file_size
            ));
        }
        let chunk_count = (self.file_size as u64).div_ceil(self.chunk_size as u64);
        if chunk_count > MAX_CHUNK_COUNT {
            return Err(format!(
                "chunk count {} exceeds limit {}",
                chunk_count, MAX_CHUNK_COUNT
            ));
        }
        Ok(Session {
            id: self.id,
            file_name: self.file_name,
            file_size: self.file_size,
            chunk_size: self.chunk_size,
            uploaded_size: self.uploaded_size,
            status,
            created_at: self.created_at,
        })
    }

    pub fn encode(session: &Session) -> Self {
        Self {
            id: session.id,
            record_version: RECORD_VERSION,
            file_name: session.file_name.clone(),
            file_size: session.file_size,
            chunk_size: session.chunk_size,
            uploaded_size: session.uploaded_size,
            status: session.status.as_str().to_string(),
            created_at: session.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(session: &Session) -> SessionRow {
        SessionRow::encode(session)
    }

    #[test]
    fn chunk_policy_small_file_single_chunk() {
        assert_eq!(chunk_size_for(25, MAX_CHUNK_SIZE), 25);
        assert_eq!(chunk_size_for(1, MAX_CHUNK_SIZE), 1);
    }

    #[test]
    fn chunk_policy_large_file_capped_at_max() {
        assert_eq!(chunk_size_for(MAX_CHUNK_SIZE + 1, MAX_CHUNK_SIZE), MAX_CHUNK_SIZE);
        assert_eq!(chunk_size_for(25, 10), 10);
    }

    #[test]
    fn chunk_count_rounds_up() {
        let mut s = Session::new("report.pdf".into(), 25, 10);
        assert_eq!(s.chunk_count(), 3);
        s.file_size = 30;
        assert_eq!(s.chunk_count(), 3);
        s.file_size = 31;
        assert_eq!(s.chunk_count(), 4);
        s.file_size = 9;
        assert_eq!(s.chunk_count(), 1);
    }

    #[test]
    fn chunk_count_handles_huge_file_sizes() {
        // ceil() must not overflow near i64::MAX.
        let session = Session::new("big.bin".into(), i64::MAX, MAX_CHUNK_SIZE);
        assert_eq!(
            session.chunk_count(),
            (i64::MAX as u64).div_ceil(MAX_CHUNK_SIZE as u64)
        );
    }

    #[test]
    fn decode_rejects_excessive_chunk_count() {
        let session = Session::new("big.bin".into(), i64::MAX, MAX_CHUNK_SIZE);
        let err = row(&session).decode().unwrap_err();
        assert!(err.contains("chunk count"));
    }

    #[test]
    fn status_codec_round_trips() {
        for status in [
            SessionStatus::InProgress,
            SessionStatus::Completed,
            SessionStatus::Cancelled,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("paused"), None);
    }

    #[test]
    fn row_codec_round_trips() {
        let session = Session::new("report.pdf".into(), 25, 10);
        let decoded = row(&session).decode().unwrap();
        assert_eq!(decoded.id, session.id);
        assert_eq!(decoded.file_name, "report.pdf");
        assert_eq!(decoded.file_size, 25);
        assert_eq!(decoded.chunk_size, 10);
        assert_eq!(decoded.status, SessionStatus::InProgress);
    }

    #[test]
    fn decode_rejects_unknown_version() {
        let session = Session::new("a.bin".into(), 10, 10);
        let mut r = row(&session);
        r.record_version = 99;
        assert!(r.decode().unwrap_err().contains("record version"));
    }

    #[test]
    fn decode_rejects_unknown_status() {
        let session = Session::new("a.bin".into(), 10, 10);
        let mut r = row(&session);
        r.status = "exploded".into();
        assert!(r.decode().unwrap_err().contains("status"));
    }

    #[test]
    fn decode_rejects_invariant_violations() {
        let session = Session::new("a.bin".into(), 10, 10);

        let mut r = row(&session);
        r.file_size = 0;
        assert!(r.decode().is_err());

        let mut r = row(&session);
        r.chunk_size = MAX_CHUNK_SIZE + 1;
        assert!(r.decode().is_err());

        let mut r = row(&session);
        r.uploaded_size = 11;
        assert!(r.decode().is_err());

        let mut r = row(&session);
        r.uploaded_size = -1;
        assert!(r.decode().is_err());
    }
}
