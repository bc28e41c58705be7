//! Parsing JSON out of model replies.
//!
//! Models are told to answer with bare JSON but often wrap it in a Markdown
//! code fence anyway.

use serde::de::DeserializeOwned;

use errata_core::{Error, Result};

/// Trim `raw`; when it opens with a code fence, drop the first and last lines.
pub fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let lines: Vec<&str> = trimmed.split('\n').collect();
    if lines.len() < 2 {
        return String::new();
    }
    lines[1..lines.len() - 1].join("\n")
}

/// Strip fences and deserialize.
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(&strip_fences(raw))
        .map_err(|e| Error::Serialization(format!("Model reply is not valid JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_plain_json_is_trimmed() {
        assert_eq!(strip_fences("  {\"a\":1}\n"), "{\"a\":1}");
    }

    #[test]
    fn test_fenced_json_drops_first_and_last_line() {
        let raw = "```json\n{\"mistakes\": []}\n```";
        assert_eq!(strip_fences(raw), "{\"mistakes\": []}");
        let v: Value = parse_json_reply(raw).unwrap();
        assert_eq!(v["mistakes"], Value::Array(vec![]));
    }

    #[test]
    fn test_single_fence_line_is_empty() {
        assert_eq!(strip_fences("```"), "");
    }

    #[test]
    fn test_prose_is_an_error() {
        let r: Result<Value> = parse_json_reply("Sorry, I cannot read this image.");
        assert!(matches!(r, Err(Error::Serialization(_))));
    }
}
