//! Transport codec: base64 text representation of binary payloads.

use base64::{Engine, engine::general_purpose::STANDARD};

/// Encodes raw bytes into transport text.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes transport text back into bytes.
///
/// Chunk boundaries and transport framing may introduce incidental
/// whitespace, so every whitespace character is removed before decoding.
pub fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = text.split_whitespace().collect();
    STANDARD.decode(compact.as_bytes())
}
