//! Tolerant request-body parsing.
//!
//! Callers send JSON from shell scripts, spreadsheet macros and hand-written
//! clients, so bodies arrive with missing content types, stray encodings and
//! Python-style single quotes. [`LenientPayload::parse`] tries progressively
//! looser interpretations and only gives up when all of them fail.

use serde_json::{Map, Value};
use std::borrow::Cow;
use tracing::{debug, info, warn};

pub type Payload = Map<String, Value>;

/// Bytes shown on each side of the failure offset in diagnostics.
const EXCERPT_RADIUS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error(
        "Invalid JSON format at byte {offset} (near `{excerpt}`). Please ensure the request body is valid JSON. \
         Common issues: 1) Use double quotes for strings, 2) Escape backslashes in paths \
         (use \\\\\\\\server\\\\share for UNC paths), 3) Ensure proper JSON structure."
    )]
    Malformed { offset: usize, excerpt: String },
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// Which interpretation produced the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// Strict parse, trusting a JSON content type.
    DeclaredJson,
    /// Strict UTF-8 decode followed by a strict parse.
    Utf8Text,
    /// Lossy decode with apostrophes rewritten as double quotes.
    QuoteRepair,
}

pub struct LenientPayload;

impl LenientPayload {
    pub fn parse(body: &[u8], content_type: Option<&str>) -> Result<Payload, PayloadError> {
        Self::parse_with_strategy(body, content_type).map(|(payload, _)| payload)
    }

    pub fn parse_with_strategy(
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<(Payload, ParseStrategy), PayloadError> {
        debug!(
            "Request content type: {}, {} bytes",
            content_type.unwrap_or("<none>"),
            body.len()
        );

        if is_json_content_type(content_type) {
            match serde_json::from_slice::<Value>(body) {
                // An empty object counts as "no data" and gets a second look below.
                Ok(Value::Object(map)) if !map.is_empty() => {
                    debug!("Parsed declared JSON body");
                    return Ok((map, ParseStrategy::DeclaredJson));
                }
                Ok(_) => debug!("Declared JSON body is empty or not an object"),
                Err(e) => warn!(
                    "JSON decode error at line {}, column {}: {}",
                    e.line(),
                    e.column(),
                    e
                ),
            }
        }

        let failure_offset = match std::str::from_utf8(body) {
            Ok(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => {
                    debug!("Parsed body after manual UTF-8 decode");
                    return Ok((map, ParseStrategy::Utf8Text));
                }
                Ok(other) => {
                    warn!("Body is valid JSON but not an object: {}", kind_of(&other));
                    0
                }
                Err(e) => {
                    let offset = byte_offset(text, e.line(), e.column());
                    warn!(
                        "Manual JSON parsing failed: {} (problem at byte {}: {})",
                        e,
                        offset,
                        excerpt(body, offset)
                    );
                    offset
                }
            },
            Err(e) => {
                warn!("Body is not valid UTF-8: {}", e);
                e.valid_up_to()
            }
        };

        let text = String::from_utf8_lossy(body);
        if looks_single_quoted(&text) {
            let repaired = text.replace('\'', "\"");
            warn!("Retrying with apostrophes replaced by double quotes; apostrophes inside values are altered too");
            match serde_json::from_str::<Value>(&repaired) {
                Ok(Value::Object(map)) => {
                    info!("Parsed body after fixing quotes");
                    return Ok((map, ParseStrategy::QuoteRepair));
                }
                Ok(other) => warn!("Repaired body is not an object: {}", kind_of(&other)),
                Err(e) => warn!("Quote repair failed: {}", e),
            }
        }

        Err(PayloadError::Malformed {
            offset: failure_offset,
            excerpt: excerpt(body, failure_offset).into_owned(),
        })
    }
}

pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return false;
    };
    let essence = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

fn looks_single_quoted(text: &str) -> bool {
    text.trim_start().starts_with('\'') || text.contains("': '") || text.contains("': \"")
}

/// serde_json reports 1-based line/column; turn that into a byte offset.
fn byte_offset(text: &str, line: usize, column: usize) -> usize {
    if line == 0 {
        return 0;
    }
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line - 1)
        .map(str::len)
        .sum();
    (line_start + column.saturating_sub(1)).min(text.len())
}

fn excerpt(body: &[u8], offset: usize) -> Cow<'_, str> {
    let offset = offset.min(body.len());
    let start = offset.saturating_sub(EXCERPT_RADIUS);
    let end = (offset + EXCERPT_RADIUS).min(body.len());
    String::from_utf8_lossy(&body[start..end])
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_parameters_are_ignored() {
        assert!(is_json_content_type(Some("application/json; charset=utf-8")));
        assert!(is_json_content_type(Some("application/problem+json")));
        assert!(!is_json_content_type(Some("text/plain")));
        assert!(!is_json_content_type(None));
    }

    #[test]
    fn byte_offset_accounts_for_earlier_lines() {
        let text = "{\n  \"a\": 1,\n  oops\n}";
        // line 3, column 3 is the 'o' of oops
        assert_eq!(byte_offset(text, 3, 3), text.find("oops").unwrap());
        assert_eq!(byte_offset(text, 0, 0), 0);
        assert_eq!(byte_offset(text, 99, 99), text.len());
    }

    #[test]
    fn excerpt_is_windowed_around_offset() {
        let body = b"0123456789012345678901234567890123456789XYZ0123456789012345678901234567890123456789";
        let ex = excerpt(body, 40);
        assert_eq!(ex.len(), 2 * EXCERPT_RADIUS);
        assert!(ex.contains("XYZ"));
    }

    #[test]
    fn empty_declared_object_falls_through_to_text_strategy() {
        let (payload, strategy) =
            LenientPayload::parse_with_strategy(b"{}", Some("application/json")).unwrap();
        assert!(payload.is_empty());
        assert_eq!(strategy, ParseStrategy::Utf8Text);
    }

    #[test]
    fn invalid_utf8_reports_first_bad_byte() {
        let err = LenientPayload::parse(b"{\"a\": \"\xff\xfe\"", None).unwrap_err();
        match err {
            PayloadError::Malformed { offset, .. } => assert_eq!(offset, 7),
            other => panic!("unexpected {other:?}"),
        }
    }
}
