//! Accumulation buffers for in-flight chunked uploads.
//!
//! The filesystem is the only record of an in-flight upload: one append-only
//! scratch file per upload id, created on the first chunk and removed on
//! finalization, decode failure, or by the retention sweep. The store knows
//! nothing about chunk indices; callers append in arrival order.

use std::io;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

const BUFFER_EXT: &str = "b64";

#[derive(Clone, Debug)]
pub struct PendingStore {
    dir: PathBuf,
}

impl PendingStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn buffer_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{BUFFER_EXT}"))
    }

    /// Appends chunk text at the end of the buffer for `id`, creating the
    /// buffer if this is the first chunk. Never truncates or reorders.
    pub async fn append(&self, id: &str, chunk: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.buffer_path(id))
            .await?;
        file.write_all(chunk).await
    }

    /// Reads the complete accumulated buffer for `id`.
    pub async fn read(&self, id: &str) -> io::Result<Vec<u8>> {
        fs::read(self.buffer_path(id)).await
    }

    /// Removes the buffer for `id`.
    pub async fn discard(&self, id: &str) -> io::Result<()> {
        fs::remove_file(self.buffer_path(id)).await
    }

    /// Current buffer size in bytes, or `None` when no buffer exists.
    pub async fn len(&self, id: &str) -> io::Result<Option<u64>> {
        match fs::metadata(self.buffer_path(id)).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Counts live buffers, i.e. uploads currently in flight.
    pub async fn count(&self) -> io::Result<u64> {
        if fs::metadata(&self.dir).await.is_err() {
            return Ok(0);
        }
        let mut dir = fs::read_dir(&self.dir).await?;
        let mut count = 0;
        while let Some(entry) = dir.next_entry().await? {
            if entry.metadata().await?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Removes buffers whose last modification is older than `ttl`.
    /// A zero `ttl` disables the sweep.
    pub async fn sweep_stale(&self, ttl: Duration) -> io::Result<()> {
        if ttl.is_zero() {
            return Ok(());
        }
        if fs::metadata(&self.dir).await.is_err() {
            return Ok(());
        }

        let now = SystemTime::now();
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified = match metadata.modified() {
                Ok(value) => value,
                Err(_) => continue,
            };
            let age = match now.duration_since(modified) {
                Ok(value) => value,
                Err(_) => continue,
            };
            if age >= ttl {
                let path = entry.path();
                if let Err(err) = fs::remove_file(&path).await {
                    warn!(path = ?path, error = %err, "failed to remove stale chunk buffer");
                } else {
                    info!(path = ?path, "removed stale chunk buffer");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn append_accumulates_in_arrival_order() {
        let temp = tempdir().expect("tempdir");
        let store = PendingStore::new(temp.path().to_path_buf());

        store.append("up1", b"aGVs").await.expect("append");
        store.append("up1", b"bG8=").await.expect("append");

        assert_eq!(store.read("up1").await.expect("read"), b"aGVsbG8=");
        assert_eq!(store.len("up1").await.expect("len"), Some(8));
    }

    #[tokio::test]
    async fn buffers_are_isolated_by_id() {
        let temp = tempdir().expect("tempdir");
        let store = PendingStore::new(temp.path().to_path_buf());

        store.append("a", b"first").await.expect("append");
        store.append("b", b"second").await.expect("append");

        assert_eq!(store.read("a").await.expect("read"), b"first");
        assert_eq!(store.read("b").await.expect("read"), b"second");
        assert_eq!(store.count().await.expect("count"), 2);
    }

    #[tokio::test]
    async fn discard_removes_the_buffer() {
        let temp = tempdir().expect("tempdir");
        let store = PendingStore::new(temp.path().to_path_buf());

        store.append("gone", b"data").await.expect("append");
        store.discard("gone").await.expect("discard");

        assert_eq!(store.len("gone").await.expect("len"), None);
        assert!(store.read("gone").await.is_err());
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_buffers() {
        let temp = tempdir().expect("tempdir");
        let store = PendingStore::new(temp.path().to_path_buf());

        store.append("old", b"data").await.expect("append");
        tokio::time::sleep(Duration::from_millis(1200)).await;
        store.append("fresh", b"data").await.expect("append");

        store
            .sweep_stale(Duration::from_secs(1))
            .await
            .expect("sweep");

        assert_eq!(store.len("old").await.expect("len"), None);
        assert!(store.len("fresh").await.expect("len").is_some());
    }

    #[tokio::test]
    async fn zero_ttl_disables_the_sweep() {
        let temp = tempdir().expect("tempdir");
        let store = PendingStore::new(temp.path().to_path_buf());

        store.append("kept", b"data").await.expect("append");
        store.sweep_stale(Duration::ZERO).await.expect("sweep");

        assert!(store.len("kept").await.expect("len").is_some());
    }
}
