use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;

use crate::config::{ARTIFACT_DIR, SCRATCH_DIR};

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_layout(&self) -> io::Result<()> {
        fs::create_dir_all(self.artifact_dir()).await?;
        fs::create_dir_all(self.scratch_dir()).await
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.root.join(ARTIFACT_DIR)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join(SCRATCH_DIR)
    }

    /// Resolves an artifact name to its on-disk path. Names must be a single
    /// normal path component; anything else is rejected.
    pub fn resolve_artifact(&self, name: &str) -> Result<PathBuf, StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidName);
        }
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return Err(StorageError::InvalidName),
        }
        Ok(self.artifact_dir().join(name))
    }

    pub async fn list_artifacts(&self) -> Result<Vec<ArtifactEntry>, StorageError> {
        let mut dir = fs::read_dir(self.artifact_dir()).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let modified = metadata
                .modified()
                .ok()
                .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
                .map(format_timestamp);

            entries.push(ArtifactEntry {
                url: format!("/{ARTIFACT_DIR}/{name}"),
                name,
                size: metadata.len(),
                modified,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

fn format_timestamp(duration: Duration) -> String {
    let timestamp = UNIX_EPOCH + duration;
    let datetime: DateTime<Utc> = timestamp.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug)]
pub enum StorageError {
    InvalidName,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEntry {
    pub name: String,
    pub url: String,
    pub size: u64,
    pub modified: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{Storage, StorageError};
    use tempfile::tempdir;

    #[test]
    fn resolve_artifact_rejects_traversal() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().to_path_buf());

        for name in ["../secret.txt", "a/b.jpg", "/etc/passwd", "..", ""] {
            let result = storage.resolve_artifact(name);
            assert!(
                matches!(result, Err(StorageError::InvalidName)),
                "{name:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn list_artifacts_reports_stored_files() {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().to_path_buf());
        storage.ensure_layout().await.expect("layout");

        tokio::fs::write(storage.artifact_dir().join("b.jpg"), b"bb")
            .await
            .expect("write");
        tokio::fs::write(storage.artifact_dir().join("a.jpg"), b"a")
            .await
            .expect("write");

        let entries = storage.list_artifacts().await.expect("list");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.jpg");
        assert_eq!(entries[0].size, 1);
        assert_eq!(entries[0].url, "/uploads/a.jpg");
        assert_eq!(entries[1].name, "b.jpg");
    }
}
