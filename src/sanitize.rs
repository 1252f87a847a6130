// Cleans raw oracle output so it parses as JSON.
//
// Models like to wrap JSON in markdown code fences and to write positive
// numbers as `+20`, which is not valid JSON.

use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Opening fence with an optional language tag, the body, and the next fence.
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[A-Za-z0-9_+-]*[^\S\n]*\n?(.*?)```").unwrap();
    /// Unclosed opening fence: everything after it is the body.
    static ref OPEN_FENCE: Regex = Regex::new(r"(?s)```[A-Za-z0-9_+-]*[^\S\n]*\n?(.*)$").unwrap();
    /// `: +12` style members.
    static ref PLUS_SIGNED: Regex = Regex::new(r":(\s*)\+(\d+)").unwrap();
}

/// Return the body of the first fenced block, or the whole text if unfenced.
pub fn strip_code_fence(raw: &str) -> &str {
    if let Some(body) = FENCED_BLOCK.captures(raw).and_then(|c| c.get(1)) {
        return body.as_str().trim();
    }
    if let Some(body) = OPEN_FENCE.captures(raw).and_then(|c| c.get(1)) {
        return body.as_str().trim();
    }
    raw.trim()
}

/// Drop the leading `+` from integers that follow a colon.
pub fn strip_plus_signs(text: &str) -> Cow<'_, str> {
    PLUS_SIGNED.replace_all(text, ":${1}${2}")
}

/// Fence strip, sign strip, then parse.
pub fn parse_oracle_json(raw: &str) -> Result<serde_json::Value, serde_json::Error> {
    let body = strip_code_fence(raw);
    let cleaned = strip_plus_signs(body);
    serde_json::from_str(&cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json_passes_through() {
        let v = parse_oracle_json(r#"{"score": 12, "sentiment": 0.5, "story": "ok"}"#).unwrap();
        assert_eq!(v, json!({"score": 12, "sentiment": 0.5, "story": "ok"}));
    }

    #[test]
    fn test_language_tagged_fence() {
        let raw = "Here you go:\n```json\n{\"score\": 30, \"story\": \"trees\"}\n```\nEnjoy!";
        assert_eq!(strip_code_fence(raw), "{\"score\": 30, \"story\": \"trees\"}");
    }

    #[test]
    fn test_bare_fence() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fence(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_only_first_block_is_used() {
        let raw = "```json\n{\"a\": 1}\n```\n```json\n{\"a\": 2}\n```";
        assert_eq!(parse_oracle_json(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_unclosed_fence() {
        let raw = "```json\n{\"a\": 1}";
        assert_eq!(parse_oracle_json(raw).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_plus_signs_are_dropped() {
        assert_eq!(strip_plus_signs(r#"{"score": +25}"#), r#"{"score": 25}"#);
        assert_eq!(strip_plus_signs(r#"{"score":+5,"x":  +7}"#), r#"{"score":5,"x":  7}"#);
        // Inside strings without a preceding colon nothing changes.
        assert_eq!(strip_plus_signs(r#"{"story": "a +5 boost"}"#), r#"{"story": "a +5 boost"}"#);
    }

    #[test]
    fn test_fenced_signed_equals_clean_equivalent() {
        let clean = r#"{"score": 40, "sentiment": 0.9, "story": "The year is 2100: forests."}"#;
        let messy = "```json\n{\"score\": +40, \"sentiment\": 0.9, \"story\": \"The year is 2100: forests.\"}\n```";
        assert_eq!(
            parse_oracle_json(messy).unwrap(),
            serde_json::from_str::<serde_json::Value>(clean).unwrap()
        );
    }

    #[test]
    fn test_garbage_still_fails() {
        assert!(parse_oracle_json("Canned Response").is_err());
        assert!(parse_oracle_json("```json\nnot json\n```").is_err());
        assert!(parse_oracle_json("").is_err());
    }
}
