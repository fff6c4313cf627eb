//! Response normalization: strip a ```json fence, then try to parse.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Opening ```json fence at the start of a response (after whitespace).
static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\A\s*```[ \t]*json\b[ \t]*\r?\n?").expect("valid regex"));

/// Closing ``` fence at the end of a response (before whitespace).
static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n?```\s*\z").expect("valid regex"));

/// Result of trying to deserialize a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The body parsed as JSON.
    Structured(Value),
    /// The body is not JSON; `error` is the parser's message.
    Unstructured { error: String },
}

/// A normalized model response.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// The response exactly as received.
    pub raw: String,
    /// The response with any ```json fence removed. Written to the `.txt`
    /// artifact and returned to the caller.
    pub body: String,
    pub outcome: ParseOutcome,
}

impl Normalized {
    /// The parsed record, if any.
    pub fn structured(&self) -> Option<&Value> {
        match &self.outcome {
            ParseOutcome::Structured(v) => Some(v),
            ParseOutcome::Unstructured { .. } => None,
        }
    }
}

/// Remove a leading ```json fence and its closing fence. Text without a
/// `json`-tagged opening fence is returned unchanged.
pub fn strip_fence(raw: &str) -> &str {
    let Some(open) = OPENING_FENCE.find(raw) else {
        return raw;
    };
    let rest = &raw[open.end()..];
    let inner = match CLOSING_FENCE.find(rest) {
        Some(close) => &rest[..close.start()],
        None => rest,
    };
    inner.trim()
}

/// Strip fences and attempt to parse `raw` as JSON.
pub fn normalize(raw: &str) -> Normalized {
    let body = strip_fence(raw);
    let outcome = match serde_json::from_str::<Value>(body) {
        Ok(value) => ParseOutcome::Structured(value),
        Err(e) => ParseOutcome::Unstructured {
            error: e.to_string(),
        },
    };

    Normalized {
        raw: raw.to_string(),
        body: body.to_string(),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_json_fence() {
        let n = normalize("```json\n[\"a\",\"b\"]\n```");
        assert_eq!(n.body, "[\"a\",\"b\"]");
        assert_eq!(n.structured(), Some(&json!(["a", "b"])));
        assert_eq!(n.raw, "```json\n[\"a\",\"b\"]\n```");
    }

    #[test]
    fn fence_tag_is_case_insensitive_and_tolerates_whitespace() {
        let n = normalize("  ```JSON\r\n{\"k\": 1}\r\n```  \n");
        assert_eq!(n.structured(), Some(&json!({"k": 1})));
    }

    #[test]
    fn fence_does_not_change_structured_outcome() {
        let bodies = [
            "{\"url\": [\"https://example.org\"], \"version\": 2}",
            "[1, 2, 3]",
            "\"just a string\"",
            "42",
            "{\"nested\": {\"list\": [true, null]}}",
        ];
        for body in bodies {
            let fenced = format!("```json\n{body}\n```");
            assert_eq!(normalize(&fenced).outcome, normalize(body).outcome, "body: {body}");
        }
    }

    #[test]
    fn missing_closing_fence_still_parses() {
        let n = normalize("```json\n{\"a\": true}");
        assert_eq!(n.structured(), Some(&json!({"a": true})));
    }

    #[test]
    fn unparseable_text_keeps_raw_exactly() {
        let inputs = [
            "No structured data available.",
            "{\"truncated\": [1, 2",
            "```json\n{oops}\n```",
            "",
        ];
        for raw in inputs {
            let n = normalize(raw);
            assert!(n.structured().is_none(), "input: {raw:?}");
            assert!(matches!(n.outcome, ParseOutcome::Unstructured { .. }));
            assert_eq!(n.raw, raw);
        }
    }

    #[test]
    fn untagged_or_other_fences_are_left_alone() {
        let raw = "```\n[1]\n```";
        assert_eq!(strip_fence(raw), raw);

        let yaml = "```yaml\nkey: value\n```";
        assert_eq!(strip_fence(yaml), yaml);
    }

    #[test]
    fn plain_text_body_is_unchanged() {
        let raw = "  prose with surrounding space  ";
        assert_eq!(normalize(raw).body, raw);
    }

    #[test]
    fn unstructured_reports_parser_error() {
        match normalize("not json").outcome {
            ParseOutcome::Unstructured { error } => assert!(error.contains("expected")),
            other => panic!("expected Unstructured, got {other:?}"),
        }
    }
}
