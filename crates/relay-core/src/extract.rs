//! Response extractor: turns raw model text into a structured value
//!
//! Models wrap JSON in markdown fences often enough that every transport runs
//! its text through here. Grammar:
//!
//! ```text
//! raw      := ws* (fenced | bare) ws*
//! fenced   := any* "```" (tag (newline | " "))? body "```" any*
//! tag      := [A-Za-z][A-Za-z0-9_+.-]* (e.g. "json")
//! ```
//!
//! Only the first fenced block is used. A fence that is opened but never
//! closed is an error, as is empty content. The body is parsed as strict JSON;
//! no schema conformance is checked.

use serde_json::Value;

use crate::error::ExtractionError;

const FENCE: &str = "```";

/// Extract a structured value from provider output text
pub fn extract(raw: &str) -> Result<Value, ExtractionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ExtractionError::EmptyContent);
    }

    let body = match trimmed.find(FENCE) {
        Some(open) => fenced_body(&trimmed[open + FENCE.len()..])?,
        None => trimmed,
    };

    let body = body.trim();
    if body.is_empty() {
        return Err(ExtractionError::EmptyContent);
    }

    serde_json::from_str(body).map_err(|e| ExtractionError::Parse(e.to_string()))
}

/// Text between an opening fence (already consumed) and the next closing fence
fn fenced_body(after_open: &str) -> Result<&str, ExtractionError> {
    let content = skip_language_tag(after_open);
    let close = content.find(FENCE).ok_or(ExtractionError::UnclosedFence)?;
    Ok(&content[..close])
}

/// Skip a language tag such as `json` right after the opening fence. The tag
/// may end the fence line or be followed by a space and the body.
fn skip_language_tag(s: &str) -> &str {
    let token_end = s.find(char::is_whitespace).unwrap_or(s.len());
    let tag = &s[..token_end];
    if !is_language_tag(tag) {
        return s;
    }

    let rest = &s[token_end..];
    let same_line = rest.trim_start_matches([' ', '\t']);
    if rest.is_empty() || same_line.starts_with(['\n', '\r']) {
        return rest;
    }
    if same_line.is_empty() || same_line.starts_with(FENCE) {
        // "```true ```" is a bare scalar, not a tag
        return s;
    }
    same_line
}

fn is_language_tag(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_alphabetic())
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_json_with_tag() {
        let value = extract("```json\n{\"a\":1}\n```").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_bare_json() {
        let value = extract("  {\"name\": \"Acme\", \"score\": 4.5}\n").unwrap();
        assert_eq!(value, json!({"name": "Acme", "score": 4.5}));
    }

    #[test]
    fn test_fence_without_tag() {
        let value = extract("```\n[1, 2, 3]\n```").unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn test_prose_around_fence() {
        let raw = "Here is the analysis you asked for:\n```json\n{\"ok\": true}\n```\nLet me know!";
        assert_eq!(extract(raw).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_only_first_block_used() {
        let raw = "```json\n{\"first\": 1}\n```\n```json\n{\"second\": 2}\n```";
        assert_eq!(extract(raw).unwrap(), json!({"first": 1}));
    }

    #[test]
    fn test_inline_fence() {
        assert_eq!(extract("```{\"a\": [true]}```").unwrap(), json!({"a": [true]}));
    }

    #[test]
    fn test_unclosed_fence() {
        assert_eq!(
            extract("```json\n{\"a\":1}"),
            Err(ExtractionError::UnclosedFence)
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(extract("   \n\t "), Err(ExtractionError::EmptyContent));
        assert_eq!(extract(""), Err(ExtractionError::EmptyContent));
    }

    #[test]
    fn test_tag_on_same_line_as_body() {
        assert_eq!(extract("```json {\"a\":1}\n```").unwrap(), json!({"a": 1}));
        assert_eq!(extract("```json\t[1, 2]```").unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_bare_scalar_in_fence_is_not_a_tag() {
        assert_eq!(extract("```true ```").unwrap(), json!(true));
    }

    #[test]
    fn test_empty_fence() {
        assert_eq!(extract("```json\n\n```"), Err(ExtractionError::EmptyContent));
    }

    #[test]
    fn test_malformed_json() {
        let err = extract("```json\n{\"a\": 1,}\n```").unwrap_err();
        assert!(matches!(err, ExtractionError::Parse(_)));
    }

    #[test]
    fn test_scalar_value() {
        assert_eq!(extract("42").unwrap(), json!(42));
        assert_eq!(extract("\"text\"").unwrap(), json!("text"));
    }

    #[test]
    fn test_reextract_canonical_form() {
        let inputs = [
            "```json\n{\"competitors\": [{\"name\": \"A\", \"rating\": 3}], \"summary\": null}\n```",
            "[1, {\"nested\": {\"deep\": [false]}}]",
            "\"plain\"",
        ];
        for raw in inputs {
            let first = extract(raw).unwrap();
            let canonical = serde_json::to_string(&first).unwrap();
            assert_eq!(extract(&canonical).unwrap(), first);
        }
    }
}
