//! Field validation for canvas payloads.
//!
//! Pure checks applied before anything reaches storage. Checks collect every
//! violation rather than stopping at the first so a chat modal can highlight
//! all offending fields at once. Lengths count Unicode scalar values.

use std::fmt;

use serde::Serialize;

/// Minimum canvas title length, in characters.
pub const TITLE_MIN_LEN: usize = 3;

/// Maximum canvas title length, in characters.
pub const TITLE_MAX_LEN: usize = 100;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Name of the offending field
    pub field: &'static str,
    /// Human-readable description of the failure
    pub message: String,
}

impl FieldViolation {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a canvas title against the fixed length bounds.
#[must_use]
pub fn validate_title(title: &str) -> Option<FieldViolation> {
    let len = title.chars().count();
    if len < TITLE_MIN_LEN {
        Some(FieldViolation::new(
            "title",
            format!("must be at least {TITLE_MIN_LEN} characters"),
        ))
    } else if len > TITLE_MAX_LEN {
        Some(FieldViolation::new(
            "title",
            format!("must be at most {TITLE_MAX_LEN} characters"),
        ))
    } else {
        None
    }
}

/// Check canvas content: non-empty and within the configured maximum.
#[must_use]
pub fn validate_content(content: &str, max_len: usize) -> Option<FieldViolation> {
    let len = content.chars().count();
    if len == 0 {
        Some(FieldViolation::new("content", "must not be empty"))
    } else if len > max_len {
        Some(FieldViolation::new(
            "content",
            format!("must be at most {max_len} characters"),
        ))
    } else {
        None
    }
}

/// Check the provided fields of a create/update payload, collecting every
/// violation. `None` fields are not being changed and are skipped.
#[must_use]
pub fn validate_canvas_fields(
    title: Option<&str>,
    content: Option<&str>,
    max_content_len: usize,
) -> Vec<FieldViolation> {
    let mut violations = Vec::new();
    if let Some(title) = title {
        violations.extend(validate_title(title));
    }
    if let Some(content) = content {
        violations.extend(validate_content(content, max_content_len));
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_too_short() {
        let violation = validate_title("ab").unwrap();
        assert_eq!(violation.field, "title");
        assert!(violation.message.contains("at least 3"));
    }

    #[test]
    fn test_title_bounds() {
        assert!(validate_title("abc").is_none());
        assert!(validate_title(&"x".repeat(100)).is_none());
        assert!(validate_title(&"x".repeat(101)).is_some());
    }

    #[test]
    fn test_title_counts_characters_not_bytes() {
        // three scalar values, nine bytes
        assert!(validate_title("äöü").is_none());
    }

    #[test]
    fn test_content_empty() {
        let violation = validate_content("", 100).unwrap();
        assert_eq!(violation.field, "content");
        assert!(violation.message.contains("empty"));
    }

    #[test]
    fn test_content_bounds() {
        assert!(validate_content("x", 100).is_none());
        assert!(validate_content(&"x".repeat(100), 100).is_none());
        assert!(validate_content(&"x".repeat(101), 100).is_some());
    }

    #[test]
    fn test_collects_all_violations() {
        let violations = validate_canvas_fields(Some("ab"), Some(""), 100);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].field, "title");
        assert_eq!(violations[1].field, "content");
    }

    #[test]
    fn test_skips_absent_fields() {
        let violations = validate_canvas_fields(None, Some("ok"), 100);
        assert!(violations.is_empty());
    }
}
