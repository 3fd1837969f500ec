/// Reported for bytes that match none of the known image signatures.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Sniffs the content type from the leading magic bytes.
pub fn detect_content_type(bytes: &[u8]) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, ..] => "image/png",
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => "image/gif",
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => "image/webp",
        [b'B', b'M', ..] => "image/bmp",
        _ => {
            tracing::debug!(
                "Unrecognized content (first 4 bytes: {:02X?})",
                &bytes[..bytes.len().min(4)]
            );
            OCTET_STREAM
        }
    }
}
