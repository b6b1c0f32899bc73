//! # File Validator
//!
//! Three independent checks on an attachment. Type and size are cheap
//! pre-filters on attacker-controlled metadata; the signature check reads the
//! content itself and is the one that catches a renamed executable.

use alifa_core::Attachment;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes read from the start of a file for signature matching.
pub const HEADER_LEN: usize = 12;

/// Declared type → accepted leading byte sequences.
pub static FILE_SIGNATURES: &[(&str, &[&[u8]])] = &[
    ("image/jpeg", &[&[0xFF, 0xD8, 0xFF]]),
    ("image/png", &[&[0x89, 0x50, 0x4E, 0x47]]),
    ("image/gif", &[&[0x47, 0x49, 0x46]]),
    ("image/webp", &[&[0x52, 0x49, 0x46, 0x46]]),
];

/// The declared type must be one of `allowed_types`, compared exactly.
pub fn validate_file_type(file: &Attachment, allowed_types: &[String]) -> bool {
    allowed_types.iter().any(|allowed| *allowed == file.content_type)
}

pub fn validate_file_size(file: &Attachment, max_mb: u64) -> bool {
    file.size() <= max_mb.saturating_mul(1024 * 1024)
}

/// Whether any signature is known for `content_type`.
pub fn has_signature(content_type: &str) -> bool {
    signatures_for(content_type).is_some()
}

fn signatures_for(content_type: &str) -> Option<&'static [&'static [u8]]> {
    FILE_SIGNATURES
        .iter()
        .find(|(mime, _)| *mime == content_type)
        .map(|(_, signatures)| *signatures)
}

/// Matches a file header against the signatures of `content_type`.
/// Unknown types never match.
pub fn signature_matches(content_type: &str, header: &[u8]) -> bool {
    let Some(signatures) = signatures_for(content_type) else {
        return false;
    };
    signatures.iter().any(|signature| header.starts_with(signature))
}

/// Reads at most `HEADER_LEN` bytes from `reader`.
pub async fn read_header<R: AsyncRead + Unpin>(reader: R) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    reader.take(HEADER_LEN as u64).read_to_end(&mut header).await?;
    Ok(header)
}

/// Checks that the file's leading bytes match its declared type.
pub async fn validate_file_signature(file: &Attachment) -> bool {
    if !has_signature(&file.content_type) {
        return false;
    }
    match read_header(&file.content[..]).await {
        Ok(header) => signature_matches(&file.content_type, &header),
        Err(e) => {
            tracing::warn!(name = %file.name, error = %e, "could not read file header");
            false
        }
    }
}
