//! Fragment Repair
//!
//! Upstream providers hand us SSE lines that are frequently not valid JSON on
//! their own: the `data: ` prefix is not a JSON key, writes get cut mid-object,
//! and the closing braces go missing. Nothing here guarantees valid JSON; it
//! only improves the odds for the envelope decoders.

const SSE_DATA_PREFIX: &str = "data: {";

/// Rewrites a raw fragment into something closer to a JSON object.
///
/// A leading `data: {` becomes the key form `"data": {`, a leading `{` is
/// added when missing, and one `}` is appended unless the fragment already
/// ends in `}}`. Only the prefix is rewritten; payload text is left alone.
pub fn process_format(raw: &str) -> String {
    let mut item = match raw.strip_prefix(SSE_DATA_PREFIX) {
        Some(rest) => format!("\"data\": {{{}", rest),
        None => raw.to_string(),
    };
    if !item.starts_with('{') {
        item.insert(0, '{');
    }
    if !item.ends_with("}}") {
        item.push('}');
    }
    item
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Balance {
    braces: i32,
    brackets: i32,
    in_string: bool,
    underflow: bool,
}

fn scan(text: &str) -> Balance {
    let mut balance = Balance::default();
    let mut escape_next = false;

    for ch in text.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if balance.in_string => escape_next = true,
            '"' => balance.in_string = !balance.in_string,
            '{' if !balance.in_string => balance.braces += 1,
            '}' if !balance.in_string => balance.braces -= 1,
            '[' if !balance.in_string => balance.brackets += 1,
            ']' if !balance.in_string => balance.brackets -= 1,
            _ => {}
        }

        if balance.braces < 0 || balance.brackets < 0 {
            balance.underflow = true;
        }
    }

    balance
}

/// Detects if a JSON string is balanced (no open strings, braces or brackets).
pub fn is_json_complete(json_str: &str) -> bool {
    let trimmed = json_str.trim();
    if trimmed.is_empty() {
        return false;
    }
    let balance = scan(trimmed);
    !balance.underflow && !balance.in_string && balance.braces == 0 && balance.brackets == 0
}

/// Closes an unterminated string, then open brackets, then open braces.
///
/// Returns `None` when there is nothing to close, or when the text closes more
/// than it opens (no suffix can fix that).
pub fn close_open_structures(json_str: &str) -> Option<String> {
    let trimmed = json_str.trim();
    let balance = scan(trimmed);
    if balance.underflow {
        return None;
    }
    if !balance.in_string && balance.braces == 0 && balance.brackets == 0 {
        return None;
    }

    let mut result = trimmed.to_string();
    if balance.in_string {
        result.push('"');
    }
    result.extend(std::iter::repeat(']').take(balance.brackets as usize));
    result.extend(std::iter::repeat('}').take(balance.braces as usize));
    Some(result)
}

/// Like [`close_open_structures`], but first drops a dangling `,` left by a
/// truncated write. A string that is still open keeps its trailing commas.
pub fn close_truncated(json_str: &str) -> Option<String> {
    let trimmed = json_str.trim_end();
    let base = if scan(trimmed).in_string {
        trimmed
    } else {
        trimmed.trim_end_matches(|c: char| c == ',' || c.is_whitespace())
    };
    match close_open_structures(base) {
        Some(closed) => Some(closed),
        None if base.len() < trimmed.len() && is_json_complete(base) => Some(base.to_string()),
        None => None,
    }
}

/// Drops the final character, respecting UTF-8 boundaries.
pub fn strip_last_char(text: &str) -> Option<&str> {
    let (idx, _) = text.char_indices().next_back()?;
    if idx == 0 {
        return None;
    }
    Some(&text[..idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_process_format_rewrites_data_prefix() {
        let repaired = process_format(r#"data: {"choices":[]}"#);
        assert_eq!(repaired, r#"{"data": {"choices":[]}}"#);
        assert!(serde_json::from_str::<Value>(&repaired).is_ok());
    }

    #[test]
    fn test_process_format_leaves_payload_text_alone() {
        let raw = r#"data: {"choices":[{"delta":{"content":"const x = { data: {a: 1} };"}}]}"#;
        let repaired = process_format(raw);
        assert!(repaired.starts_with(r#"{"data": {"choices""#));
        assert!(repaired.contains("const x = { data: {a: 1} };"));
        assert!(serde_json::from_str::<Value>(&repaired).is_ok());

        let bare = r#"{"choices":[{"delta":{"content":"data: {x}"}}]}"#;
        assert!(process_format(bare).contains(r#""content":"data: {x}""#));
    }

    #[test]
    fn test_process_format_keeps_complete_objects() {
        let raw = r#"{"error":{"message":"x","type":"y"}}"#;
        assert_eq!(process_format(raw), raw);
    }

    #[test]
    fn test_process_format_done_marker() {
        assert_eq!(process_format("data: [DONE]"), "{data: [DONE]}");
        assert_eq!(process_format("[DONE]"), "{[DONE]}");
        assert_eq!(process_format("data:"), "{data:}");
    }

    #[test]
    fn test_process_format_is_deterministic() {
        let raw = r#"data: {"choices":[{"delta":{"content":"a"}}]"#;
        assert_eq!(process_format(raw), process_format(raw));
    }

    #[test]
    fn test_is_json_complete() {
        assert!(is_json_complete("{}"));
        assert!(is_json_complete(r#"{"key": "val\"ue"}"#));
        assert!(!is_json_complete(r#"{"key": "value""#));
        assert!(!is_json_complete("[1, 2"));
        assert!(!is_json_complete("}{"));
        assert!(!is_json_complete("   "));
    }

    #[test]
    fn test_close_open_structures() {
        let closed = close_open_structures(r#"{"data": {"choices":[{"delta":{"content":"hi"}}]}"#);
        let closed = closed.unwrap_or_default();
        assert!(serde_json::from_str::<Value>(&closed).is_ok());

        let closed = close_open_structures(r#"{"a": ["b"#).unwrap_or_default();
        assert_eq!(closed, r#"{"a": ["b"]}"#);
    }

    #[test]
    fn test_close_open_structures_nothing_to_do() {
        assert_eq!(close_open_structures("{}"), None);
        assert_eq!(close_open_structures("{}}"), None);
    }

    #[test]
    fn test_close_truncated_drops_dangling_comma() {
        let closed = close_truncated(r#"{"data": {"choices":[{"delta":{"content":"x"}}],"#);
        assert_eq!(
            closed.as_deref(),
            Some(r#"{"data": {"choices":[{"delta":{"content":"x"}}]}}"#)
        );

        let closed = close_truncated(r#"{"a": [1]},"#);
        assert_eq!(closed.as_deref(), Some(r#"{"a": [1]}"#));

        let closed = close_truncated(r#"{"a": "b,"#);
        assert_eq!(closed.as_deref(), Some(r#"{"a": "b,"}"#));

        assert_eq!(close_truncated("{}"), None);
    }

    #[test]
    fn test_strip_last_char() {
        assert_eq!(strip_last_char("{}}"), Some("{}"));
        assert_eq!(strip_last_char("ab€"), Some("ab"));
        assert_eq!(strip_last_char("x"), None);
        assert_eq!(strip_last_char(""), None);
    }
}
