use log::warn;

use crate::models::NoteMetadata;

/// Marker inside the trailing metadata comment. A note file ends with a
/// single line `<!-- floatnote-meta: {json} -->` carrying its properties.
pub const METADATA_MARKER: &str = "floatnote-meta";

/// Result of splitting a stored note text into content and properties.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedNote {
    pub metadata: NoteMetadata,
    pub body: String,
}

/// Appends the metadata block as a single trailing comment line to `body`.
pub fn encode(body: &str, metadata: &NoteMetadata) -> String {
    match serde_json::to_string(metadata) {
        Ok(json) => format!("{}\n<!-- {}: {} -->", body, METADATA_MARKER, json),
        Err(e) => {
            // Practically unreachable for this type; keep the body intact.
            warn!("failed to serialize note metadata: {}", e);
            body.to_string()
        }
    }
}

/// Splits stored text into `{metadata, body}`.
///
/// The metadata comment must be the final line of the text. Missing metadata
/// is not an error (older files have none) and malformed JSON inside the
/// comment degrades to empty metadata with the full text as body. Never
/// fails.
pub fn decode(text: &str) -> DecodedNote {
    let trimmed = text.trim_end();
    let last_line = trimmed.rsplit('\n').next().unwrap_or(trimmed);

    let prefix = format!("<!-- {}:", METADATA_MARKER);
    if !last_line.starts_with(&prefix) || !last_line.ends_with("-->") {
        return DecodedNote {
            metadata: NoteMetadata::default(),
            body: text.to_string(),
        };
    }

    let rest = &last_line[prefix.len()..];
    let json = rest[..rest.len() - "-->".len()].trim();
    match serde_json::from_str::<NoteMetadata>(json) {
        Ok(metadata) => {
            let body_end = trimmed.len() - last_line.len();
            let body = trimmed[..body_end].trim_end_matches('\n').to_string();
            DecodedNote { metadata, body }
        }
        Err(e) => {
            warn!("malformed note metadata comment, treating as plain text: {}", e);
            DecodedNote {
                metadata: NoteMetadata::default(),
                body: text.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_without_metadata() {
        let text = "<p>just some content</p>";
        let decoded = decode(text);
        assert_eq!(decoded.metadata, NoteMetadata::default());
        assert_eq!(decoded.body, text);
    }

    #[test]
    fn test_encode_then_decode() {
        let meta = NoteMetadata {
            id: Some("abc-123".to_string()),
            color: Some("#2d2d2d".to_string()),
            pinned: Some(true),
            favorite: Some(false),
            transparency: Some(0.85),
        };
        let encoded = encode("<p>hello</p>", &meta);
        assert!(encoded.ends_with("-->"));

        let decoded = decode(&encoded);
        assert_eq!(decoded.body, "<p>hello</p>");
        assert_eq!(decoded.metadata, meta);
    }

    #[test]
    fn test_decode_malformed_json_degrades() {
        let text = format!("<p>body</p>\n<!-- {}: {{not json -->", METADATA_MARKER);
        let decoded = decode(&text);
        assert_eq!(decoded.metadata, NoteMetadata::default());
        // The whole text stays as body so nothing is lost.
        assert_eq!(decoded.body, text);
    }

    #[test]
    fn test_decode_ignores_mid_text_comment() {
        let text = format!(
            "<p>before</p>\n<!-- {}: {{\"id\":\"x\"}} -->\n<p>after</p>",
            METADATA_MARKER
        );
        let decoded = decode(&text);
        assert_eq!(decoded.metadata, NoteMetadata::default());
        assert_eq!(decoded.body, text);
    }

    #[test]
    fn test_decode_ignores_foreign_trailing_comment() {
        let text = "<p>body</p>\n<!-- some other comment -->";
        let decoded = decode(text);
        assert_eq!(decoded.metadata, NoteMetadata::default());
        assert_eq!(decoded.body, text);
    }

    #[test]
    fn test_decode_tolerates_trailing_newline() {
        let meta = NoteMetadata {
            id: Some("n1".to_string()),
            ..Default::default()
        };
        let encoded = format!("{}\n", encode("body", &meta));
        let decoded = decode(&encoded);
        assert_eq!(decoded.metadata.id.as_deref(), Some("n1"));
        assert_eq!(decoded.body, "body");
    }

    #[test]
    fn test_decode_empty_text() {
        let decoded = decode("");
        assert_eq!(decoded.metadata, NoteMetadata::default());
        assert_eq!(decoded.body, "");
    }
}
