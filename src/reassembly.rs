//! Reassembly finalizer: decode an upload's accumulated text and persist it.

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::atomic::AtomicFile;
use crate::codec;
use crate::config::{ARTIFACT_DIR, DEFAULT_ARTIFACT_EXT};
use crate::error::ApiError;
use crate::pending::PendingStore;
use crate::storage::Storage;

/// Reference to a persisted artifact, returned to the uploading client.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRef {
    pub img_url: String,
    pub saved_path: String,
}

/// Decodes the complete buffer for `upload_id` and persists the bytes as a
/// freshly named artifact. The buffer is removed on success and on decode
/// failure alike; a later upload under the same id starts from nothing.
pub async fn finalize(
    storage: &Storage,
    pending: &PendingStore,
    public_base_url: Option<&str>,
    upload_id: &str,
) -> Result<ArtifactRef, ApiError> {
    let buffer = pending
        .read(upload_id)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let text = String::from_utf8_lossy(&buffer);
    let bytes = match codec::decode(&text) {
        Ok(bytes) => bytes,
        Err(err) => {
            if let Err(remove_err) = pending.discard(upload_id).await {
                warn!(upload_id, error = %remove_err, "failed to remove corrupt chunk buffer");
            }
            warn!(upload_id, error = %err, "assembled upload failed to decode");
            return Err(err.into());
        }
    };

    let artifact = store_artifact(storage, public_base_url, &bytes, DEFAULT_ARTIFACT_EXT).await?;
    pending
        .discard(upload_id)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    info!(
        upload_id,
        path = artifact.saved_path,
        size = bytes.len(),
        "upload finalized"
    );
    Ok(artifact)
}

/// Writes `bytes` atomically under a generated unique name and returns its
/// public reference. Shared by the finalizer and the single-shot surface.
pub async fn store_artifact(
    storage: &Storage,
    public_base_url: Option<&str>,
    bytes: &[u8],
    ext: &str,
) -> Result<ArtifactRef, ApiError> {
    let file_name = format!("{}.{ext}", Uuid::new_v4());
    let target = storage.artifact_dir().join(&file_name);

    let mut atomic = AtomicFile::new(&target).await?;
    if let Err(err) = atomic.file_mut().write_all(bytes).await {
        atomic.cleanup().await;
        return Err(ApiError::Internal(err.to_string()));
    }
    atomic.finalize().await?;

    let relative = format!("/{ARTIFACT_DIR}/{file_name}");
    let img_url = match public_base_url {
        Some(base) => format!("{}{relative}", base.trim_end_matches('/')),
        None => relative,
    };
    Ok(ArtifactRef {
        img_url,
        saved_path: target.to_string_lossy().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn make_state() -> (tempfile::TempDir, Storage, PendingStore) {
        let temp = tempdir().expect("tempdir");
        let storage = Storage::new(temp.path().to_path_buf());
        storage.ensure_layout().await.expect("layout");
        let pending = PendingStore::new(storage.scratch_dir());
        (temp, storage, pending)
    }

    #[tokio::test]
    async fn finalize_persists_decoded_bytes_and_drops_the_buffer() {
        let (_temp, storage, pending) = make_state().await;
        pending
            .append("up1", codec::encode(b"hello world!").as_bytes())
            .await
            .expect("append");

        let artifact = finalize(&storage, &pending, None, "up1")
            .await
            .unwrap_or_else(|_| panic!("finalize failed"));

        let stored = tokio::fs::read(&artifact.saved_path).await.expect("read");
        assert_eq!(stored, b"hello world!");
        assert!(artifact.img_url.starts_with("/uploads/"));
        assert!(artifact.img_url.ends_with(".jpg"));
        assert_eq!(pending.len("up1").await.expect("len"), None);
    }

    #[tokio::test]
    async fn decode_failure_removes_the_buffer_and_stores_nothing() {
        let (_temp, storage, pending) = make_state().await;
        pending
            .append("bad", b"!!!not-valid!!!")
            .await
            .expect("append");

        let result = finalize(&storage, &pending, None, "bad").await;
        assert!(matches!(result, Err(ApiError::Decode(_))));
        assert_eq!(pending.len("bad").await.expect("len"), None);

        let artifacts = storage.list_artifacts().await.expect("list");
        assert!(artifacts.is_empty());
    }

    #[tokio::test]
    async fn same_id_is_clean_after_a_failed_decode() {
        let (_temp, storage, pending) = make_state().await;
        pending.append("id1", b"%%%%").await.expect("append");
        let _ = finalize(&storage, &pending, None, "id1").await;

        pending
            .append("id1", codec::encode(b"second try").as_bytes())
            .await
            .expect("append");
        let artifact = finalize(&storage, &pending, None, "id1")
            .await
            .unwrap_or_else(|_| panic!("finalize failed"));
        let stored = tokio::fs::read(&artifact.saved_path).await.expect("read");
        assert_eq!(stored, b"second try");
    }

    #[tokio::test]
    async fn public_base_url_prefixes_the_reference() {
        let (_temp, storage, pending) = make_state().await;
        pending
            .append("up2", codec::encode(b"x").as_bytes())
            .await
            .expect("append");

        let artifact = finalize(&storage, &pending, Some("https://img.example.com/"), "up2")
            .await
            .unwrap_or_else(|_| panic!("finalize failed"));
        assert!(artifact.img_url.starts_with("https://img.example.com/uploads/"));
    }
}
