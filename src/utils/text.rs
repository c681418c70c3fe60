//! Text truncation helpers for one-line summaries.

/// Truncate a string to a maximum length, handling multi-byte characters properly.
/// Appends "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{truncated}...")
    }
}

/// First non-blank line of `s`, trimmed. Empty when there is none.
pub fn first_line(s: &str) -> &str {
    s.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string_unchanged() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_adds_ellipsis() {
        assert_eq!(truncate_string("hello world", 8), "hello...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate_string("日本語のテキスト", 5), "日本...");
        assert_eq!(truncate_string("日本語", 2), "日本");
    }

    #[test]
    fn test_first_line() {
        assert_eq!(first_line("\n  \n  Error: boom \nmore"), "Error: boom");
        assert_eq!(first_line("   "), "");
    }
}
