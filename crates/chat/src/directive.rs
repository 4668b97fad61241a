//! Tool-call directives embedded in model output.
//!
//! A directive is a fenced block tagged `mcp` holding a JSON object with a
//! `tool` name and a `params` value:
//!
//! ````text
//! ```mcp
//! {"tool": "search_feeds", "params": {"query": "rust"}}
//! ```
//! ````

use regex_lite::Regex;
use serde_json::Value;
use std::ops::Range;
use std::sync::LazyLock;
use thiserror::Error;

static FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```mcp\s*([\s\S]*?)\s*```").expect("directive pattern is valid"));

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallDirective {
    pub tool: String,
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("directive is not a JSON object")]
    NotAnObject,

    #[error("directive is missing '{0}'")]
    MissingField(&'static str),
}

/// One fenced candidate and its byte span in the scanned text.
#[derive(Debug, Clone)]
pub struct DirectiveMatch {
    pub span: Range<usize>,
    pub parsed: Result<ToolCallDirective, ParseError>,
}

pub fn parse(body: &str) -> Result<ToolCallDirective, ParseError> {
    let value: Value = serde_json::from_str(body.trim()).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(ParseError::NotAnObject);
    };

    let tool = match object.remove("tool") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return Err(ParseError::MissingField("tool")),
    };
    let params = object.remove("params").ok_or(ParseError::MissingField("params"))?;

    Ok(ToolCallDirective { tool, params })
}

/// Every fenced candidate in `text`, left to right.
pub fn scan(text: &str) -> Vec<DirectiveMatch> {
    FENCED
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let body = caps.get(1).map_or("", |m| m.as_str());
            Some(DirectiveMatch {
                span: whole.range(),
                parsed: parse(body),
            })
        })
        .collect()
}

/// Replace spans taken from one scan of `text`.
///
/// Spans must not overlap; they are applied in order against the original
/// text, so earlier replacements never shift later ones.
pub fn substitute(text: &str, replacements: &[(Range<usize>, String)]) -> String {
    let mut ordered: Vec<&(Range<usize>, String)> = replacements.iter().collect();
    ordered.sort_by_key(|(span, _)| span.start);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (span, replacement) in ordered {
        if span.start < cursor || span.end > text.len() {
            continue;
        }
        out.push_str(&text[cursor..span.start]);
        out.push_str(replacement);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// First balanced `{...}` in `text` that parses as a JSON object.
pub fn first_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(offset) = text[start..].find('{') {
        let open = start + offset;
        if let Some(close) = matching_brace(bytes, open) {
            if let Ok(Value::Object(map)) = serde_json::from_str(&text[open..=close]) {
                return Some(map);
            }
        }
        start = open + 1;
    }
    None
}

/// Corrected parameters from a free-form model reply: the `params` member
/// of the first JSON object if it has one, else the object itself.
pub fn corrected_params(reply: &str) -> Option<Value> {
    let mut object = first_json_object(reply)?;
    Some(object.remove("params").unwrap_or(Value::Object(object)))
}

fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_single_directive() {
        let text = "Let me look.\n```mcp\n{\"tool\": \"greet\", \"params\": {\"name\": \"Bob\"}}\n```\nDone.";
        let found = scan(text);
        assert_eq!(found.len(), 1);
        let directive = found[0].parsed.clone().unwrap();
        assert_eq!(directive.tool, "greet");
        assert_eq!(directive.params, json!({"name": "Bob"}));
        assert!(text[found[0].span.clone()].starts_with("```mcp"));
        assert!(text[found[0].span.clone()].ends_with("```"));
    }

    #[test]
    fn malformed_candidates_are_reported_not_fatal() {
        let text = concat!(
            "```mcp\n{not json}\n```\n",
            "```mcp\n[1, 2]\n```\n",
            "```mcp\n{\"params\": {}}\n```\n",
            "```mcp\n{\"tool\": \"x\"}\n```\n",
            "```mcp\n{\"tool\": \"ok\", \"params\": {}}\n```",
        );
        let found = scan(text);
        assert_eq!(found.len(), 5);
        assert!(matches!(found[0].parsed, Err(ParseError::InvalidJson(_))));
        assert_eq!(found[1].parsed, Err(ParseError::NotAnObject));
        assert_eq!(found[2].parsed, Err(ParseError::MissingField("tool")));
        assert_eq!(found[3].parsed, Err(ParseError::MissingField("params")));
        assert_eq!(found[4].parsed.as_ref().unwrap().tool, "ok");
    }

    #[test]
    fn other_fences_are_ignored() {
        assert!(scan("```json\n{\"tool\": \"a\", \"params\": {}}\n```").is_empty());
        assert!(scan("no directives here").is_empty());
    }

    #[test]
    fn substitution_uses_original_spans() {
        let text = "A ```mcp\n{\"tool\":\"a\",\"params\":{}}\n``` B ```mcp\n{\"tool\":\"b\",\"params\":{}}\n``` C";
        let found = scan(text);
        let replacements: Vec<_> = found
            .iter()
            .map(|m| (m.span.clone(), format!("<{}: a much longer replacement>", m.parsed.as_ref().unwrap().tool)))
            .collect();
        assert_eq!(
            substitute(text, &replacements),
            "A <a: a much longer replacement> B <b: a much longer replacement> C"
        );
    }

    #[test]
    fn substitution_leaves_unreplaced_text() {
        let text = "keep ```mcp\n{bad}\n``` this";
        assert_eq!(substitute(text, &[]), text);
    }

    #[test]
    fn bare_json_prefers_params_member() {
        let reply = "Sorry, try this: {\"tool\": \"search_feeds\", \"params\": {\"query\": \"rust {async}\"}} thanks";
        assert_eq!(corrected_params(reply), Some(json!({"query": "rust {async}"})));
    }

    #[test]
    fn bare_json_falls_back_to_whole_object() {
        let reply = "Use {broken then {\"query\": \"tokio\", \"n\": 3}";
        assert_eq!(corrected_params(reply), Some(json!({"query": "tokio", "n": 3})));
        assert_eq!(corrected_params("no json at all"), None);
    }
}
