//! Byte store for uploaded chunks.
//!
//! Chunks live on local disk under `<root>/<session_id>/<index>.chunk`. A
//! chunk write streams to a temp file and renames into place, so a retried
//! upload of the same index atomically replaces the previous bytes and a
//! client that aborts mid-chunk never leaves a half-visible chunk.

use crate::errors::{UploadError, UploadResult};
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::io::{self, ErrorKind};
use std::path::PathBuf;
use tokio::{
    fs::{self, File},
    io::{AsyncRead, AsyncWriteExt},
};
use uuid::Uuid;

/// One chunk present in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkEntry {
    pub index: u64,
    pub byte_len: u64,
}

pub trait ChunkStore: Clone + Send + Sync + 'static {
    /// Sequential reader over one stored chunk.
    type Reader: AsyncRead + Send + Unpin;

    /// Stream `data` into the chunk at `(session_id, index)`, overwriting any
    /// prior bytes there. Returns the number of bytes written.
    fn put_chunk<S>(
        &self,
        session_id: Uuid,
        index: u64,
        data: S,
    ) -> impl Future<Output = UploadResult<u64>> + Send
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static;

    /// Every chunk currently present for the session, sorted by index.
    fn list_chunks(
        &self,
        session_id: Uuid,
    ) -> impl Future<Output = UploadResult<Vec<ChunkEntry>>> + Send;

    /// Open the chunk at `index` for sequential reading.
    fn open_chunk(
        &self,
        session_id: Uuid,
        index: u64,
    ) -> impl Future<Output = UploadResult<Self::Reader>> + Send;

    /// Remove every chunk of the session. Succeeds when none exist.
    fn delete_chunks(&self, session_id: Uuid) -> impl Future<Output = UploadResult<()>> + Send;

    /// Best-effort write/read/delete probe for readiness checks.
    fn ping(&self) -> impl Future<Output = UploadResult<()>> + Send;
}

/// Filesystem-backed chunk store.
#[derive(Clone)]
pub struct FsChunkStore {
    root: PathBuf,
}

const CHUNK_EXT: &str = "chunk";

impl FsChunkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn session_dir(&self, session_id: Uuid) -> PathBuf {
        self.root.join(session_id.to_string())
    }

    fn chunk_path(&self, session_id: Uuid, index: u64) -> PathBuf {
        self.session_dir(session_id)
            .join(format!("{index}.{CHUNK_EXT}"))
    }
}

impl ChunkStore for FsChunkStore {
    type Reader = File;

    async fn put_chunk<S>(&self, session_id: Uuid, index: u64, data: S) -> UploadResult<u64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir).await?;

        let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut written: u64 = 0;
        pin_mut!(data);
        while let Some(piece) = data.next().await {
            let piece = match piece {
                Ok(piece) => piece,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(UploadError::Io(err));
                }
            };
            written += piece.len() as u64;
            if let Err(err) = file.write_all(&piece).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(UploadError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(UploadError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(UploadError::Io(err));
        }
        drop(file);

        let final_path = self.chunk_path(session_id, index);
        if let Err(err) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(UploadError::Io(err));
        }

        Ok(written)
    }

    async fn list_chunks(&self, session_id: Uuid) -> UploadResult<Vec<ChunkEntry>> {
        let dir = self.session_dir(session_id);
        let mut entries = Vec::new();

        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(entries),
            Err(err) => return Err(UploadError::Io(err)),
        };

        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            // Only `<index>.chunk` counts; temp files and strays are ignored.
            let Some(stem) = name.strip_suffix(&format!(".{CHUNK_EXT}")) else {
                continue;
            };
            let Ok(index) = stem.parse::<u64>() else {
                continue;
            };
            let byte_len = entry.metadata().await?.len();
            entries.push(ChunkEntry { index, byte_len });
        }

        entries.sort_by_key(|e| e.index);
        Ok(entries)
    }

    async fn open_chunk(&self, session_id: Uuid, index: u64) -> UploadResult<File> {
        let path = self.chunk_path(session_id, index);
        let file = File::open(&path).await?;
        Ok(file)
    }

    async fn delete_chunks(&self, session_id: Uuid) -> UploadResult<()> {
        let dir = self.session_dir(session_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UploadError::Io(err)),
        }
    }

    async fn ping(&self) -> UploadResult<()> {
        fs::create_dir_all(&self.root).await?;
        let probe = self.root.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&probe, b"readyz").await?;
        let bytes = fs::read(&probe).await?;
        let _ = fs::remove_file(&probe).await;
        if bytes != b"readyz" {
            return Err(UploadError::Io(io::Error::other("probe content mismatch")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn bytes_stream(parts: Vec<&'static [u8]>) -> impl Stream<Item = io::Result<Bytes>> + Send {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    #[tokio::test]
    async fn put_list_read_delete() {
        let dir = TempDir::new().unwrap();
        let store = FsChunkStore::new(dir.path());
        let session = Uuid::new_v4();

        let written = store
            .put_chunk(session, 0, bytes_stream(vec![b"hello", b" world"]))
            .await
            .unwrap();
        assert_eq!(written, 11);
        store
            .put_chunk(session, 2, bytes_stream(vec![b"tail"]))
            .await
            .unwrap();

        let entries = store.list_chunks(session).await.unwrap();
        assert_eq!(
            entries,
            vec![
                ChunkEntry { index: 0, byte_len: 11 },
                ChunkEntry { index: 2, byte_len: 4 },
            ]
        );

        let mut reader = store.open_chunk(session, 0).await.unwrap();
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"hello world");

        store.delete_chunks(session).await.unwrap();
        assert!(store.list_chunks(session).await.unwrap().is_empty());
        // Idempotent.
        store.delete_chunks(session).await.unwrap();
    }

    #[tokio::test]
    async fn reupload_overwrites_prior_bytes() {
        let dir = TempDir::new().unwrap();
        let store = FsChunkStore::new(dir.path());
        let session = Uuid::new_v4();

        store
            .put_chunk(session, 1, bytes_stream(vec![b"first version"]))
            .await
            .unwrap();
        store
            .put_chunk(session, 1, bytes_stream(vec![b"second"]))
            .await
            .unwrap();

        let entries = store.list_chunks(session).await.unwrap();
        assert_eq!(entries, vec![ChunkEntry { index: 1, byte_len: 6 }]);

        let mut reader = store.open_chunk(session, 1).await.unwrap();
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"second");
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_chunk() {
        let dir = TempDir::new().unwrap();
        let store = FsChunkStore::new(dir.path());
        let session = Uuid::new_v4();

        let broken = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::other("connection reset")),
        ]);
        let result = store.put_chunk(session, 0, broken).await;
        assert!(result.is_err());
        assert!(store.list_chunks(session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_missing_session_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FsChunkStore::new(dir.path());
        assert!(store.list_chunks(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
