//! Content-based MIME detection.

const OCTET_STREAM: &str = "application/octet-stream";

/// (offset, magic bytes, mime type)
const SIGNATURES: &[(usize, &[u8], &str)] = &[
    (0, b"\x89PNG\r\n\x1a\n", "image/png"),
    (0, b"\xff\xd8\xff", "image/jpeg"),
    (0, b"GIF87a", "image/gif"),
    (0, b"GIF89a", "image/gif"),
    (0, b"%PDF-", "application/pdf"),
    (0, b"PK\x03\x04", "application/zip"),
    (0, b"\x1f\x8b", "application/gzip"),
    (0, b"BZh", "application/x-bzip2"),
    (0, b"\xfd7zXZ\x00", "application/x-xz"),
    (0, b"7z\xbc\xaf\x27\x1c", "application/x-7z-compressed"),
    (0, b"\x7fELF", "application/x-elf"),
    (0, b"OggS", "audio/ogg"),
    (0, b"fLaC", "audio/flac"),
    (0, b"ID3", "audio/mpeg"),
    (0, b"\x1aE\xdf\xa3", "video/webm"),
    (0, b"BM", "image/bmp"),
    (4, b"ftyp", "video/mp4"),
];

/// Detect a MIME type from the leading bytes of `data`.
///
/// Binary signatures win; otherwise valid UTF-8 is text (markdown when the
/// first line is a `#` or `##` heading), and anything else is
/// `application/octet-stream`.
pub fn sniff_mime_type(data: &[u8]) -> &'static str {
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return "image/webp";
    }
    for (offset, magic, mime) in SIGNATURES {
        if data.len() >= offset + magic.len() && &data[*offset..offset + magic.len()] == *magic {
            return *mime;
        }
    }

    let text = match std::str::from_utf8(data) {
        Ok(text) => text,
        Err(_) => return OCTET_STREAM,
    };
    if text.contains('\0') {
        return OCTET_STREAM;
    }

    let first_line = text.split('\n').next().unwrap_or_default();
    if first_line.starts_with("# ") || first_line.starts_with("## ") {
        return "text/markdown";
    }

    let trimmed = text.trim_start();
    if trimmed.starts_with("<svg") {
        "image/svg+xml"
    } else if trimmed
        .get(..9)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("<!doctype"))
    {
        "text/html"
    } else if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
            "application/json"
        } else {
            "text/plain"
        }
    } else {
        "text/plain"
    }
}

/// Normalise a declared content type: strip parameters, lowercase, and
/// discard values that carry no information.
pub fn declared_mime_type(content_type: Option<&str>) -> Option<String> {
    let essence = content_type?.split(';').next()?.trim().to_lowercase();
    if essence.is_empty() || essence == OCTET_STREAM || !essence.contains('/') {
        None
    } else {
        Some(essence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_signatures() {
        assert_eq!(sniff_mime_type(b"\x89PNG\r\n\x1a\n0000"), "image/png");
        assert_eq!(sniff_mime_type(b"%PDF-1.7"), "application/pdf");
        assert_eq!(sniff_mime_type(b"\0\0\0\x18ftypmp42"), "video/mp4");
        assert_eq!(sniff_mime_type(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
    }

    #[test]
    fn test_text_detection() {
        assert_eq!(sniff_mime_type(b"hello world"), "text/plain");
        assert_eq!(sniff_mime_type(b"# Title\nbody"), "text/markdown");
        assert_eq!(sniff_mime_type(b"## Section"), "text/markdown");
        assert_eq!(sniff_mime_type(b"#!/bin/sh\necho"), "text/plain");
        assert_eq!(sniff_mime_type(br#"{"a": 1}"#), "application/json");
        assert_eq!(sniff_mime_type(b"{ not json"), "text/plain");
    }

    #[test]
    fn test_invalid_utf8_is_binary() {
        assert_eq!(sniff_mime_type(&[0xff, 0xfe, 0x00, 0x80]), OCTET_STREAM);
        assert_eq!(sniff_mime_type(b"abc\0def"), OCTET_STREAM);
    }

    #[test]
    fn test_declared_mime_type() {
        assert_eq!(
            declared_mime_type(Some("Text/HTML; charset=utf-8")).as_deref(),
            Some("text/html")
        );
        assert_eq!(declared_mime_type(Some("application/octet-stream")), None);
        assert_eq!(declared_mime_type(Some("")), None);
        assert_eq!(declared_mime_type(None), None);
    }
}
