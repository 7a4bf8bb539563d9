//! Input sanitisation for free-text fields.
//!
//! Rejects script-injection patterns and over-length payloads before they
//! reach storage. Patterns are matched case-insensitively against the raw
//! text; the engine stores text verbatim once it passes.

use crate::error::{EngramError, EngramResult};

/// Patterns that reject a text field outright.
const DANGEROUS_PATTERNS: &[&str] = &[
    "<script",
    "javascript:",
    "vbscript:",
    "onload=",
    "onerror=",
    "onclick=",
    "onmouseover=",
];

/// Validate a free-text field against the injection patterns and a byte
/// ceiling.
pub fn validate_text_field(field: &str, value: &str, max_bytes: usize) -> EngramResult<()> {
    if value.len() > max_bytes {
        return Err(EngramError::invalid(format!(
            "{field} exceeds {max_bytes} bytes"
        )));
    }

    let lowered = value.to_lowercase();
    for pattern in DANGEROUS_PATTERNS {
        if lowered.contains(pattern) {
            tracing::warn!(field, pattern, "dangerous content rejected");
            return Err(EngramError::invalid(format!(
                "{field} contains potentially dangerous content"
            )));
        }
    }
    Ok(())
}

/// Validate an identifier-like field: non-empty and bounded.
pub fn validate_id_field(field: &str, value: &str, max_bytes: usize) -> EngramResult<()> {
    if value.is_empty() {
        return Err(EngramError::invalid(format!("{field} must not be empty")));
    }
    if value.len() > max_bytes {
        return Err(EngramError::invalid(format!(
            "{field} exceeds {max_bytes} bytes"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_passes() {
        assert!(validate_text_field("text", "a perfectly normal memory", 1000).is_ok());
    }

    #[test]
    fn script_patterns_rejected_case_insensitively() {
        for payload in [
            "<script>alert(1)</script>",
            "<SCRIPT SRC=x>",
            "click javascript:alert(1)",
            "VBSCRIPT:msgbox",
            "<img onerror=alert(1)>",
            "<body onload=evil()>",
            "<a onclick=x>",
            "<div onmouseover=x>",
        ] {
            assert!(
                validate_text_field("text", payload, 1000).is_err(),
                "should reject: {payload}"
            );
        }
    }

    #[test]
    fn length_ceiling_enforced() {
        let long = "a".repeat(101);
        assert!(validate_text_field("text", &long, 100).is_err());
        let ok = "a".repeat(100);
        assert!(validate_text_field("text", &ok, 100).is_ok());
    }

    #[test]
    fn id_fields_must_be_nonempty() {
        assert!(validate_id_field("entity_id", "", 100).is_err());
        assert!(validate_id_field("entity_id", "alice", 100).is_ok());
        assert!(validate_id_field("entity_id", &"x".repeat(101), 100).is_err());
    }
}
