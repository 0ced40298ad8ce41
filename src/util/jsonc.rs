//! Comment-tolerant JSON parsing for config files.
//!
//! Config files are JSONC: JSON plus `//` line comments and `/* */` block
//! comments. Comments inside string literals are preserved verbatim.

/// Strip `//` and `/* */` comments from JSONC input.
///
/// The stripper is string-aware: comment markers inside quoted strings are
/// left alone, and escaped quotes do not terminate a string.
#[must_use]
pub fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' => match chars.peek() {
                Some('/') => {
                    for next in chars.by_ref() {
                        if next == '\n' {
                            out.push('\n');
                            break;
                        }
                    }
                }
                Some('*') => {
                    chars.next();
                    let mut prev = '\0';
                    for next in chars.by_ref() {
                        if prev == '*' && next == '/' {
                            break;
                        }
                        // Keep newlines so parse errors report useful lines.
                        if next == '\n' {
                            out.push('\n');
                        }
                        prev = next;
                    }
                }
                _ => out.push(c),
            },
            _ => out.push(c),
        }
    }

    out
}

/// Parse JSONC text into a deserializable value.
///
/// # Errors
///
/// Returns the underlying `serde_json` error when the comment-stripped text
/// is not valid JSON.
pub fn from_str<T: serde::de::DeserializeOwned>(input: &str) -> serde_json::Result<T> {
    serde_json::from_str(&strip_comments(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_line_comments() {
        let parsed: Value = from_str("// header\n{\"a\": 1} // trailing\n").unwrap();
        assert_eq!(parsed["a"], 1);
    }

    #[test]
    fn test_block_comments() {
        let parsed: Value = from_str("{/* x */\"a\": /* y */ 2}").unwrap();
        assert_eq!(parsed["a"], 2);
    }

    #[test]
    fn test_comment_markers_inside_strings() {
        let parsed: Value = from_str(r#"{"url": "https://example.com/*not-a-comment*/"}"#).unwrap();
        assert_eq!(parsed["url"], "https://example.com/*not-a-comment*/");
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let parsed: Value = from_str(r#"{"a": "quote \" // still in string"}"#).unwrap();
        assert_eq!(parsed["a"], "quote \" // still in string");
    }

    #[test]
    fn test_plain_json_passes_through() {
        let input = r#"{"a": [1, 2], "b": {"c": null}}"#;
        assert_eq!(strip_comments(input), input);
    }
}
