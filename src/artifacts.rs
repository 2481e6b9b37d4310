//! Stored artifact listing and download handlers.

use axum::body::Body as AxumBody;
use axum::extract::{Extension, Path as UrlPath};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::error::ApiError;
use crate::storage::{ArtifactEntry, Storage};

/// Lists stored artifacts.
pub async fn list_artifacts(
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<Vec<ArtifactEntry>>, ApiError> {
    let entries = storage.list_artifacts().await?;
    info!(count = entries.len(), "list artifacts");
    Ok(JsonResponse(entries))
}

/// Streams one stored artifact.
pub async fn download_artifact(
    UrlPath(name): UrlPath<String>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let target = storage.resolve_artifact(&name)?;
    let metadata = match fs::metadata(&target).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ApiError::NotFound("no such image".into()));
        }
        Err(err) => return Err(ApiError::Internal(err.to_string())),
    };
    if !metadata.is_file() {
        return Err(ApiError::NotFound("no such image".into()));
    }

    let mime = mime_guess::from_path(&name).first_or_octet_stream();
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| ApiError::Internal("invalid mime type".into()))?,
    );
    response_headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&metadata.len().to_string())
            .map_err(|_| ApiError::Internal("invalid header value".into()))?,
    );

    let file = File::open(&target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    info!(name, size = metadata.len(), "download artifact");
    let stream = ReaderStream::new(file);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tempfile::tempdir;

    async fn make_storage() -> (tempfile::TempDir, Arc<Storage>) {
        let temp = tempdir().expect("tempdir");
        let storage = Arc::new(Storage::new(temp.path().to_path_buf()));
        storage.ensure_layout().await.expect("layout");
        (temp, storage)
    }

    #[tokio::test]
    async fn download_rejects_traversal_name() {
        let (_temp, storage) = make_storage().await;
        let result = download_artifact(UrlPath("..".to_string()), Extension(storage)).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn download_missing_artifact_is_not_found() {
        let (_temp, storage) = make_storage().await;
        let result =
            download_artifact(UrlPath("nope.jpg".to_string()), Extension(storage)).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn download_streams_stored_bytes_with_content_type() {
        let (_temp, storage) = make_storage().await;
        tokio::fs::write(storage.artifact_dir().join("pic.jpg"), b"not really a jpeg")
            .await
            .expect("write");

        let response = download_artifact(UrlPath("pic.jpg".to_string()), Extension(storage))
            .await
            .unwrap_or_else(|_| panic!("download failed"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("image/jpeg")
        );

        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect")
            .to_bytes();
        assert_eq!(&bytes[..], b"not really a jpeg");
    }
}
