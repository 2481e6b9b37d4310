//! Chunk submission validation and the completion decision.
//!
//! A session is a logical grouping only: everything the protocol needs is
//! derivable from the submission itself plus the existence of the
//! accumulation buffer, so nothing is kept in memory between requests.

use serde::Deserialize;

use crate::error::ApiError;

/// Raw query parameters of a chunk submission. All fields arrive as text and
/// are validated by [`ChunkSubmission::from_query`] before anything mutates.
#[derive(Deserialize)]
pub struct ChunkQuery {
    pub id: Option<String>,
    pub idx: Option<String>,
    pub total: Option<String>,
}

/// A validated chunk submission: non-empty id, 1-based index, declared total.
pub struct ChunkSubmission {
    pub upload_id: String,
    pub index: u64,
    pub total: u64,
}

pub enum ChunkOutcome {
    Continuing { received: u64, total: u64 },
    ReadyToFinalize,
}

impl ChunkSubmission {
    pub fn from_query(query: ChunkQuery) -> Result<Self, ApiError> {
        let upload_id = query
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::BadRequest("id is required".into()))?;
        if !valid_upload_id(upload_id) {
            return Err(ApiError::BadRequest("id is invalid".into()));
        }

        let index = parse_positive(query.idx.as_deref(), "idx")?;
        let total = parse_positive(query.total.as_deref(), "total")?;
        if index > total {
            return Err(ApiError::BadRequest("idx exceeds total".into()));
        }

        Ok(Self {
            upload_id: upload_id.to_string(),
            index,
            total,
        })
    }

    /// The final chunk carries `idx == total`; everything before it keeps the
    /// upload pending.
    pub fn outcome(&self) -> ChunkOutcome {
        if self.index == self.total {
            ChunkOutcome::ReadyToFinalize
        } else {
            ChunkOutcome::Continuing {
                received: self.index,
                total: self.total,
            }
        }
    }
}

fn parse_positive(value: Option<&str>, name: &str) -> Result<u64, ApiError> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))?;
    match value.parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ApiError::BadRequest(format!(
            "{name} must be a positive integer"
        ))),
    }
}

/// Upload ids become a scratch file name, so they are held to a single safe
/// path component.
fn valid_upload_id(id: &str) -> bool {
    id != "." && id != ".."
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}
