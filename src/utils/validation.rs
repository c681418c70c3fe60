//! Input validation for tool arguments.
//!
//! Functions return `String` errors so request structs can surface them
//! directly as validation failures.

/// Maximum length for comment text (in characters).
pub const MAX_COMMENT_LENGTH: usize = 10_000;

/// Largest page size a search may ask for.
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// Page size used when a search gives none.
pub const DEFAULT_SEARCH_LIMIT: u32 = 25;

/// Reject empty or whitespace-only identifiers.
pub fn validate_identifier(value: &str, field: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} cannot be empty"));
    }
    if value.chars().any(char::is_control) {
        return Err(format!("{field} cannot contain control characters"));
    }
    Ok(())
}

/// Comment text must be non-empty and at most [`MAX_COMMENT_LENGTH`] characters.
pub fn validate_comment(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("comment cannot be empty".to_string());
    }
    let len = text.chars().count();
    if len > MAX_COMMENT_LENGTH {
        return Err(format!(
            "comment too long ({len} characters, max {MAX_COMMENT_LENGTH})"
        ));
    }
    Ok(())
}

pub fn validate_limit(limit: u32) -> Result<(), String> {
    if limit == 0 || limit > MAX_SEARCH_LIMIT {
        return Err(format!(
            "limit must be between 1 and {MAX_SEARCH_LIMIT}, got {limit}"
        ));
    }
    Ok(())
}
