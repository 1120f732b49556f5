//! Chunk assembly: concatenate a session's chunks, in index order, into the
//! final file artifact.
//!
//! The artifact is written to a temp file next to the destination and
//! published with an atomic rename, so readers never observe a half-written
//! output. Assembly does not delete chunks; cleanup stays with the session
//! service so a failed completion can be retried.

use crate::errors::{UploadError, UploadResult};
use crate::models::session::Session;
use crate::services::chunk_store::ChunkStore;
use std::io::{self, ErrorKind};
use std::path::Path;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use uuid::Uuid;

/// Read chunks `0..chunk_count` strictly in ascending index order and write
/// their bytes contiguously to `output_path`. Returns the total bytes
/// written. A missing chunk or any read failure aborts the whole run and
/// removes the temp file.
pub async fn assemble_chunks<C: ChunkStore>(
    chunks: &C,
    session: &Session,
    output_path: &Path,
) -> UploadResult<u64> {
    let parent = output_path.parent().ok_or_else(|| {
        UploadError::Io(io::Error::new(
            ErrorKind::InvalidInput,
            "output path missing parent directory",
        ))
    })?;
    fs::create_dir_all(parent).await?;

    let tmp_path = parent.join(format!(".assemble-{}", Uuid::new_v4()));
    let mut out = File::create(&tmp_path).await?;

    let mut total: u64 = 0;
    for index in 0..session.chunk_count() {
        let mut reader = match chunks.open_chunk(session.id, index).await {
            Ok(reader) => reader,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };
        match tokio::io::copy(&mut reader, &mut out).await {
            Ok(copied) => total += copied,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(UploadError::Io(err));
            }
        }
    }

    if let Err(err) = out.flush().await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(UploadError::Io(err));
    }
    if let Err(err) = out.sync_all().await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(UploadError::Io(err));
    }
    drop(out);

    if let Err(err) = fs::rename(&tmp_path, output_path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(UploadError::Io(err));
    }

    tracing::debug!(
        session_id = %session.id,
        bytes = total,
        output = %output_path.display(),
        "assembled upload artifact"
    );
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chunk_store::FsChunkStore;
    use bytes::Bytes;
    use futures::stream;
    use tempfile::TempDir;

    async fn put(store: &FsChunkStore, session: Uuid, index: u64, data: &'static [u8]) {
        store
            .put_chunk(
                session,
                index,
                stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(data))]),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn concatenates_in_index_order() {
        let dir = TempDir::new().unwrap();
        let store = FsChunkStore::new(dir.path().join("chunks"));
        let session = Session::new("report.pdf".into(), 25, 10);

        // Upload out of order; assembly must still be ordered.
        put(&store, session.id, 2, b"54321").await;
        put(&store, session.id, 0, b"0123456789").await;
        put(&store, session.id, 1, b"abcdefghij").await;

        let output = dir.path().join("out").join("report.pdf");
        let written = assemble_chunks(&store, &session, &output).await.unwrap();
        assert_eq!(written, 25);

        let contents = std::fs::read(&output).unwrap();
        assert_eq!(contents, b"0123456789abcdefghij54321");
    }

    #[tokio::test]
    async fn missing_chunk_aborts_without_partial_output() {
        let dir = TempDir::new().unwrap();
        let store = FsChunkStore::new(dir.path().join("chunks"));
        let session = Session::new("report.pdf".into(), 25, 10);

        put(&store, session.id, 0, b"0123456789").await;
        // Chunks 1 and 2 never arrive.

        let out_dir = dir.path().join("out");
        let output = out_dir.join("report.pdf");
        assert!(assemble_chunks(&store, &session, &output).await.is_err());

        assert!(!output.exists());
        // No temp litter either.
        let leftovers: Vec<_> = std::fs::read_dir(&out_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn overwrites_existing_artifact() {
        let dir = TempDir::new().unwrap();
        let store = FsChunkStore::new(dir.path().join("chunks"));
        let session = Session::new("a.bin".into(), 5, 5);
        put(&store, session.id, 0, b"fresh").await;

        let output = dir.path().join("out").join("a.bin");
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();
        std::fs::write(&output, b"stale artifact").unwrap();

        assemble_chunks(&store, &session, &output).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"fresh");
    }
}
