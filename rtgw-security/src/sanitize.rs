//! Input Sanitizer (C3): recursively neutralizes injection payloads in
//! request structures (spec §4.3). Pure — never mutates in place, always
//! returns a new structure.

use std::collections::BTreeMap;

/// A minimal value tree (scalar / ordered sequence / string-keyed
/// mapping) the sanitizer operates over, independent of `serde_json`'s
/// specific representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Number(n) => serde_json::Value::Number(n),
            Value::String(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

const SQL_KEYWORDS: &[&str] = &["DROP", "DELETE", "INSERT", "UPDATE", "UNION", "SELECT"];

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Strip `javascript:` (case-insensitive) wherever it occurs as a substring.
fn strip_javascript_scheme(input: &str) -> String {
    strip_ci_substring(input, "javascript:")
}

fn strip_ci_substring(input: &str, needle: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let needle_lower = needle.to_ascii_lowercase();
    if !lower.contains(&needle_lower) {
        return input.to_string();
    }
    let mut result = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let lower_bytes = lower.as_bytes();
    let needle_len = needle_lower.len();
    let mut i = 0;
    while i < bytes.len() {
        if i + needle_len <= lower_bytes.len() && &lower_bytes[i..i + needle_len] == needle_lower.as_bytes() {
            i += needle_len;
            continue;
        }
        result.push(bytes[i] as char);
        i += 1;
    }
    result
}

/// Strip `on<event>=` attribute patterns, e.g. `onclick=`, `onerror=`.
fn strip_inline_event_handlers(input: &str) -> String {
    let lower = input.to_ascii_lowercase();
    let bytes = input.as_bytes();
    let lower_bytes = lower.as_bytes();
    let mut result = String::with_capacity(input.len());
    let mut i = 0;
    while i < bytes.len() {
        if lower_bytes[i..].starts_with(b"on") {
            let mut j = i + 2;
            while j < lower_bytes.len() && is_word_byte(lower_bytes[j]) {
                j += 1;
            }
            if j > i + 2 && j < lower_bytes.len() && lower_bytes[j] == b'=' {
                i = j + 1;
                continue;
            }
        }
        result.push(bytes[i] as char);
        i += 1;
    }
    result
}

/// Strip SQL comment/statement-separator meta-sequences: `--`, `;`, `/*...*/`.
fn strip_sql_meta_sequences(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
            let mut j = i + 2;
            while j < chars.len() && !(chars[j] == '*' && chars.get(j + 1) == Some(&'/')) {
                j += 1;
            }
            i = if j < chars.len() { j + 2 } else { chars.len() };
            continue;
        }
        if chars[i] == '-' && chars.get(i + 1) == Some(&'-') {
            i += 2;
            continue;
        }
        if chars[i] == ';' {
            i += 1;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Strip standalone SQL keywords (`DROP`, `DELETE`, ...), bounded by
/// non-alphanumeric characters on both sides, case-insensitively.
fn strip_sql_keywords(input: &str) -> String {
    let mut out = input.to_string();
    for keyword in SQL_KEYWORDS {
        out = strip_standalone_word_ci(&out, keyword);
    }
    out
}

fn strip_standalone_word_ci(input: &str, word: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let word_lower: Vec<char> = word.to_ascii_lowercase().chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < chars.len() {
        let matches = chars[i..].iter().zip(word_lower.iter()).all(|(c, w)| c.to_ascii_lowercase() == *w)
            && chars.len() - i >= word_lower.len();
        let left_boundary = i == 0 || !chars[i - 1].is_alphanumeric() && chars[i - 1] != '_';
        let right_idx = i + word_lower.len();
        let right_boundary = right_idx >= chars.len()
            || (!chars[right_idx].is_alphanumeric() && chars[right_idx] != '_');

        if matches && left_boundary && right_boundary {
            i = right_idx;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// HTML-escape `< > " ' &`.
fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '&' => out.push_str("&amp;"),
            other => out.push(other),
        }
    }
    out
}

fn sanitize_string(input: &str) -> String {
    let stripped = strip_javascript_scheme(input);
    let stripped = strip_inline_event_handlers(&stripped);
    let stripped = strip_sql_meta_sequences(&stripped);
    let stripped = strip_sql_keywords(&stripped);
    html_escape(&stripped)
}

/// A mapping key is dropped if it begins with `$` or contains a `.`
/// (NoSQL injection guard).
fn is_key_rejected(key: &str) -> bool {
    key.starts_with('$') || key.contains('.')
}

/// Recursively sanitize a [`Value`] tree, returning a new tree.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_string(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !is_key_rejected(k))
                .map(|(k, v)| (k.clone(), sanitize(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Convenience entry point operating directly on `serde_json::Value`, the
/// HTTP-body boundary.
pub fn sanitize_json(value: serde_json::Value) -> serde_json::Value {
    sanitize(&Value::from(value)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn html_special_characters_are_escaped() {
        let result = sanitize_json(json!("<script>alert('x')</script>"));
        assert_eq!(
            result,
            json!("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;")
        );
    }

    #[test]
    fn javascript_scheme_is_stripped() {
        let result = sanitize_json(json!("javascript:alert(1)"));
        assert_eq!(result, json!("alert(1)"));
    }

    #[test]
    fn inline_event_handler_is_stripped() {
        let result = sanitize_json(json!("onclick=alert(1)"));
        assert_eq!(result, json!("alert(1)"));
    }

    #[test]
    fn sql_comment_and_separator_sequences_are_stripped() {
        let result = sanitize_json(json!("1; DROP TABLE users; --"));
        assert_eq!(result, json!("1  TABLE users "));
    }

    #[test]
    fn sql_keyword_inside_another_word_is_not_stripped() {
        let result = sanitize_json(json!("selection"));
        assert_eq!(result, json!("selection"));
    }

    #[test]
    fn dollar_prefixed_keys_are_dropped() {
        let result = sanitize_json(json!({ "$where": "1==1", "name": "ok" }));
        assert_eq!(result, json!({ "name": "ok" }));
    }

    #[test]
    fn dotted_keys_are_dropped() {
        let result = sanitize_json(json!({ "user.role": "admin", "name": "ok" }));
        assert_eq!(result, json!({ "name": "ok" }));
    }

    #[test]
    fn nested_structures_are_sanitized_recursively() {
        let result = sanitize_json(json!({
            "comments": ["<b>hi</b>", "javascript:evil()"],
            "$meta": { "a": 1 },
        }));
        assert_eq!(
            result,
            json!({ "comments": ["&lt;b&gt;hi&lt;/b&gt;", "evil()"] })
        );
    }

    #[test]
    fn sanitizer_does_not_mutate_in_place() {
        let original = Value::String("<x>".to_string());
        let sanitized = sanitize(&original);
        assert_eq!(original, Value::String("<x>".to_string()));
        assert_eq!(sanitized, Value::String("&lt;x&gt;".to_string()));
    }
}
