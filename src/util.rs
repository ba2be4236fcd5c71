//! Text decoding and media type helpers.

use std::borrow::Cow;

/// Decode bytes to a string, handling various encodings.
///
/// This function:
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Falls back to Windows-1252
///
/// Uses `Cow<str>` to avoid allocation when the input is valid UTF-8.
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    // Try UTF-8 first (handles BOM automatically)
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    // Fallback: Windows-1252 (superset of ISO-8859-1)
    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

// ============================================================================
// Media Types
// ============================================================================

/// Media format of a picture or embedded resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Jpeg,
    Png,
    Gif,
    Svg,
    WebP,
    Bmp,
    Tiff,
    /// Unknown/binary format
    Binary,
}

impl MediaFormat {
    /// Get the MIME type string for this format.
    pub fn mime_type(self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "image/jpeg",
            MediaFormat::Png => "image/png",
            MediaFormat::Gif => "image/gif",
            MediaFormat::Svg => "image/svg+xml",
            MediaFormat::WebP => "image/webp",
            MediaFormat::Bmp => "image/bmp",
            MediaFormat::Tiff => "image/tiff",
            MediaFormat::Binary => "application/octet-stream",
        }
    }

    /// Format named by a MIME type; parameters after `;` are ignored.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => MediaFormat::Jpeg,
            "image/png" => MediaFormat::Png,
            "image/gif" => MediaFormat::Gif,
            "image/svg+xml" => MediaFormat::Svg,
            "image/webp" => MediaFormat::WebP,
            "image/bmp" | "image/x-ms-bmp" => MediaFormat::Bmp,
            "image/tiff" => MediaFormat::Tiff,
            _ => MediaFormat::Binary,
        }
    }

    /// File extension including the dot, or an empty string when unknown.
    pub fn extension(self) -> &'static str {
        match self {
            MediaFormat::Jpeg => ".jpg",
            MediaFormat::Png => ".png",
            MediaFormat::Gif => ".gif",
            MediaFormat::Svg => ".svg",
            MediaFormat::WebP => ".webp",
            MediaFormat::Bmp => ".bmp",
            MediaFormat::Tiff => ".tiff",
            MediaFormat::Binary => "",
        }
    }
}

/// Detect a format from magic bytes.
pub fn sniff_media_format(data: &[u8]) -> MediaFormat {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => MediaFormat::Jpeg,
        [0x89, b'P', b'N', b'G', ..] => MediaFormat::Png,
        [b'G', b'I', b'F', b'8', ..] => MediaFormat::Gif,
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => MediaFormat::WebP,
        [b'B', b'M', ..] => MediaFormat::Bmp,
        [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => MediaFormat::Tiff,
        _ => {
            let head = &data[..data.len().min(512)];
            let text = String::from_utf8_lossy(head);
            let text = text.trim_start_matches('\u{feff}').trim_start();
            if (text.starts_with("<?xml") || text.starts_with("<svg")) && text.contains("<svg") {
                MediaFormat::Svg
            } else {
                MediaFormat::Binary
            }
        }
    }
}

// ============================================================================
// Encoding Detection
// ============================================================================

/// Extract encoding from XML declaration.
///
/// Parses `<?xml ... encoding="..." ?>` in the first 100 bytes.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    let (&quote, rest) = after_enc.split_first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_end = rest.iter().position(|&b| b == quote)?;
    std::str::from_utf8(&rest[..value_end]).ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_media_format() {
        assert_eq!(sniff_media_format(&[0xFF, 0xD8, 0xFF, 0xE0]), MediaFormat::Jpeg);
        assert_eq!(
            sniff_media_format(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
            MediaFormat::Png
        );
        assert_eq!(sniff_media_format(b"GIF89a"), MediaFormat::Gif);
        assert_eq!(sniff_media_format(b"RIFF\0\0\0\0WEBPVP8 "), MediaFormat::WebP);
        assert_eq!(
            sniff_media_format(b"<?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\"/>"),
            MediaFormat::Svg
        );
        assert_eq!(sniff_media_format(b"plain"), MediaFormat::Binary);
    }

    #[test]
    fn test_mime_and_extension() {
        assert_eq!(MediaFormat::from_mime("image/png"), MediaFormat::Png);
        assert_eq!(MediaFormat::from_mime("IMAGE/JPEG; q=1"), MediaFormat::Jpeg);
        assert_eq!(MediaFormat::from_mime(""), MediaFormat::Binary);
        assert_eq!(MediaFormat::Jpeg.extension(), ".jpg");
        assert_eq!(MediaFormat::Binary.extension(), "");
        assert_eq!(MediaFormat::Svg.mime_type(), "image/svg+xml");
    }

    #[test]
    fn test_extract_xml_encoding() {
        assert_eq!(
            extract_xml_encoding(br#"<?xml version="1.0" encoding="ISO-8859-1"?><a/>"#),
            Some("ISO-8859-1")
        );
        assert_eq!(extract_xml_encoding(b"<a/>"), None);
    }

    #[test]
    fn test_decode_text_falls_back_to_hint() {
        assert_eq!(decode_text(b"caf\xe9", Some("iso-8859-1")), "café");
        assert_eq!(decode_text("café".as_bytes(), None), "café");
    }
}
