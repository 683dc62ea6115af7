//! Parsing of the model's recognition reply.
//!
//! Accepts both the requested shape (`{"matches": [...], "reason": ...}`)
//! and the legacy single-match shape (`{"match": true, "userId": ...}`) —
//! both normalize to a [`RecognitionReply`] carrying a list of zero or
//! more matches.

use facecheck_core::{RecognitionReply, RecognizedMatch};
use serde::Deserialize;
use serde_json::Value;

use crate::client::RecognizeError;

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    matches: Option<Vec<RawMatch>>,
    #[serde(rename = "match", default)]
    matched: Option<bool>,
    #[serde(rename = "userId", default)]
    user_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct RawMatch {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(default)]
    name: String,
}

/// Extract and parse the reply from a full `generateContent` response body.
pub fn parse_reply(payload: &Value) -> Result<RecognitionReply, RecognizeError> {
    let parts = payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| RecognizeError::MalformedReply("no candidates in response".into()))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        return Err(RecognizeError::MalformedReply(
            "candidate has no text parts".into(),
        ));
    }

    parse_reply_text(&text)
}

/// Parse the model's JSON text, tolerating a markdown code fence around it.
pub fn parse_reply_text(text: &str) -> Result<RecognitionReply, RecognizeError> {
    let body = strip_code_fence(text.trim());
    let raw: RawReply = serde_json::from_str(body)
        .map_err(|error| RecognizeError::MalformedReply(error.to_string()))?;

    let matches = match raw.matches {
        Some(list) => list
            .into_iter()
            .filter(|m| !m.user_id.is_empty())
            .map(|m| RecognizedMatch {
                identity_id: m.user_id,
                name: m.name,
            })
            .collect(),
        // Legacy single-match shape: a list of length <= 1.
        None => match (raw.matched, raw.user_id) {
            (Some(true), Some(user_id)) if !user_id.is_empty() => vec![RecognizedMatch {
                identity_id: user_id,
                name: raw.name.unwrap_or_default(),
            }],
            _ => Vec::new(),
        },
    };

    Ok(RecognitionReply {
        matches,
        reason: raw.reason,
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip an optional language tag on the fence line.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_match_list() {
        let reply =
            parse_reply_text(r#"{"matches": [{"userId": "u1", "name": "Alice"}, {"userId": "u2", "name": "Bob"}]}"#)
                .unwrap();
        assert_eq!(reply.matches.len(), 2);
        assert_eq!(reply.matches[0].identity_id, "u1");
        assert_eq!(reply.matches[1].name, "Bob");
        assert!(reply.reason.is_none());
    }

    #[test]
    fn parses_no_match_with_reason() {
        let reply = parse_reply_text(r#"{"matches": [], "reason": "No face detected"}"#).unwrap();
        assert!(reply.matches.is_empty());
        assert_eq!(reply.reason.as_deref(), Some("No face detected"));
    }

    #[test]
    fn parses_legacy_single_match_shape() {
        let reply = parse_reply_text(r#"{"match": true, "userId": "u1"}"#).unwrap();
        assert_eq!(reply.matches.len(), 1);
        assert_eq!(reply.matches[0].identity_id, "u1");

        let reply = parse_reply_text(r#"{"match": false, "reason": "No matching user"}"#).unwrap();
        assert!(reply.matches.is_empty());
        assert_eq!(reply.reason.as_deref(), Some("No matching user"));
    }

    #[test]
    fn strips_markdown_code_fence() {
        let fenced = "```json\n{\"matches\": [{\"userId\": \"u1\", \"name\": \"Alice\"}]}\n```";
        let reply = parse_reply_text(fenced).unwrap();
        assert_eq!(reply.matches.len(), 1);
    }

    #[test]
    fn rejects_non_json_text() {
        let err = parse_reply_text("I could not find anyone.").unwrap_err();
        assert!(matches!(err, RecognizeError::MalformedReply(_)));
    }

    #[test]
    fn drops_matches_without_an_id() {
        let reply =
            parse_reply_text(r#"{"matches": [{"userId": "", "name": "x"}, {"userId": "u2", "name": "Bob"}]}"#)
                .unwrap();
        assert_eq!(reply.matches.len(), 1);
        assert_eq!(reply.matches[0].identity_id, "u2");
    }

    #[test]
    fn extracts_text_from_generate_content_envelope() {
        let payload = json!({
            "candidates": [{
                "content": {
                    "parts": [{"text": r#"{"matches": [{"userId": "u1", "name": "Alice"}]}"#}]
                }
            }]
        });
        let reply = parse_reply(&payload).unwrap();
        assert_eq!(reply.matches.len(), 1);
    }

    #[test]
    fn missing_candidates_is_malformed() {
        let err = parse_reply(&json!({"candidates": []})).unwrap_err();
        assert!(matches!(err, RecognizeError::MalformedReply(_)));
    }
}
