//! Upload surfaces: single-shot multipart and chunked base64 submission.

use axum::Error as AxumError;
use axum::body::Body as AxumBody;
use axum::extract::{Extension, Multipart, Query};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use futures_util::stream::StreamExt;
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{DEFAULT_ARTIFACT_EXT, DEFAULT_LOCK_WAIT_TIMEOUT_SECS, MAX_CHUNK_SIZE};
use crate::error::ApiError;
use crate::locking::LockManager;
use crate::pending::PendingStore;
use crate::reassembly::{self, ArtifactRef};
use crate::session::{ChunkOutcome, ChunkQuery, ChunkSubmission};
use crate::storage::Storage;

#[derive(Debug)]
pub struct UploadConfig {
    pub max_upload_size: u64,
    pub pending_max: u64,
    pub pending_ttl: Duration,
    pub public_base_url: Option<String>,
}

/// Mid-stream acknowledgment for a chunk that did not complete the upload.
#[derive(serde::Serialize)]
pub(crate) struct ChunkProgress {
    status: &'static str,
    received: u64,
    total: u64,
}

/// Accepts one chunk of a chunked upload.
///
/// Parameters are validated before any state mutation. Appends run under the
/// upload's lock; the chunk carrying `idx == total` triggers finalization.
pub async fn submit_chunk(
    Query(query): Query<ChunkQuery>,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(pending): Extension<Arc<PendingStore>>,
    Extension(locks): Extension<Arc<LockManager>>,
    Extension(config): Extension<Arc<UploadConfig>>,
    body: AxumBody,
) -> Result<Response, ApiError> {
    let submission = ChunkSubmission::from_query(query)?;

    let mut chunk_text: Vec<u8> = Vec::new();
    let mut data_stream = BodyExt::into_data_stream(body);
    while let Some(part) = data_stream.next().await {
        let part = part.map_err(|err: AxumError| ApiError::Internal(err.to_string()))?;
        if part.is_empty() {
            continue;
        }
        if (chunk_text.len() + part.len()) as u64 > MAX_CHUNK_SIZE {
            return Err(ApiError::PayloadTooLarge("chunk too large".into()));
        }
        chunk_text.extend_from_slice(&part);
    }
    if chunk_text.is_empty() {
        return Err(ApiError::EmptyBody);
    }

    let _guard = locks
        .lock_upload_with_timeout(
            &submission.upload_id,
            Duration::from_secs(DEFAULT_LOCK_WAIT_TIMEOUT_SECS),
        )
        .await
        .map_err(|_| ApiError::Conflict("upload busy".into()))?;

    let buffered = pending
        .len(&submission.upload_id)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    if buffered.is_none() && config.pending_max > 0 {
        let active = pending
            .count()
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        if active >= config.pending_max {
            return Err(ApiError::TooManyRequests(60));
        }
    }
    if config.max_upload_size > 0 {
        let cap = encoded_size_cap(config.max_upload_size);
        if buffered.unwrap_or(0) + chunk_text.len() as u64 > cap {
            return Err(ApiError::PayloadTooLarge("upload size exceeds limit".into()));
        }
    }

    pending
        .append(&submission.upload_id, &chunk_text)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    debug!(
        upload_id = submission.upload_id,
        idx = submission.index,
        total = submission.total,
        bytes = chunk_text.len(),
        "chunk appended"
    );

    match submission.outcome() {
        ChunkOutcome::Continuing { received, total } => Ok(JsonResponse(ChunkProgress {
            status: "continuing",
            received,
            total,
        })
        .into_response()),
        ChunkOutcome::ReadyToFinalize => {
            let artifact = reassembly::finalize(
                &storage,
                &pending,
                config.public_base_url.as_deref(),
                &submission.upload_id,
            )
            .await?;
            Ok(JsonResponse(artifact).into_response())
        }
    }
}

/// Accepts one complete file in a single multipart request, bypassing the
/// chunk protocol entirely.
pub async fn upload_image(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(config): Extension<Arc<UploadConfig>>,
    mut multipart: Multipart,
) -> Result<JsonResponse<ArtifactRef>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(err.to_string()))?
    {
        let preferred = matches!(field.name(), Some("file") | Some("image"));
        if !preferred && field.file_name().is_none() {
            continue;
        }

        let ext = infer_extension(field.file_name());
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::BadRequest(err.to_string()))?;
        if bytes.is_empty() {
            return Err(ApiError::EmptyBody);
        }
        if config.max_upload_size > 0 && bytes.len() as u64 > config.max_upload_size {
            return Err(ApiError::PayloadTooLarge("upload size exceeds limit".into()));
        }

        let artifact =
            reassembly::store_artifact(&storage, config.public_base_url.as_deref(), &bytes, &ext)
                .await?;
        info!(
            path = artifact.saved_path,
            size = bytes.len(),
            "single-shot upload stored"
        );
        return Ok(JsonResponse(artifact));
    }

    Err(ApiError::BadRequest("no file received".into()))
}

/// Maximum accumulated transport-text size for a given decoded-size limit.
fn encoded_size_cap(max_decoded: u64) -> u64 {
    4 * max_decoded.div_ceil(3)
}

/// Extension from the client filename when it looks sane, default otherwise.
fn infer_extension(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.bytes().all(|b| b.is_ascii_alphanumeric())
        })
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_ARTIFACT_EXT.to_string())
}
