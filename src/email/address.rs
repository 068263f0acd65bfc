//! Email address normalization, validation, and dedupe keys.
//!
//! The dedupe key is the SHA-256 hex digest of the normalized (trimmed,
//! lower-cased) address; it keys webhook/email correlation and provider-side
//! deduplication. Normalizing before hashing makes the key insensitive to
//! case and surrounding whitespace.

use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Pragmatic email shape check: one `@`, non-empty local part, and a domain
/// with at least one dot. Real deliverability is the provider's problem.
fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex")
    })
}

/// Trim surrounding whitespace and lowercase the address.
pub fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalize and validate an address, returning the normalized form.
///
/// # Errors
///
/// Returns a non-retryable [`Error::Validation`] for malformed input.
pub fn normalize_and_validate(email: &str) -> Result<String> {
    let normalized = normalize(email);
    if normalized.is_empty() {
        return Err(Error::validation("email is empty"));
    }
    if normalized.len() > 254 {
        return Err(Error::validation("email exceeds 254 characters"));
    }
    if !email_pattern().is_match(&normalized) {
        return Err(Error::validation(format!(
            "malformed email address: {normalized}"
        )));
    }
    Ok(normalized)
}

/// SHA-256 hex digest of the normalized address.
pub fn dedupe_key(email: &str) -> String {
    let normalized = normalize(email);
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Test@Example.COM "), "test@example.com");
        assert_eq!(normalize("a@b.co"), "a@b.co");
    }

    #[test]
    fn test_validation() {
        assert!(normalize_and_validate("user@example.com").is_ok());
        assert!(normalize_and_validate("  User@Example.com ").is_ok());

        for bad in ["", "   ", "no-at-sign", "two@@example.com", "user@nodot", "a b@example.com"] {
            assert!(
                normalize_and_validate(bad).is_err(),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_dedupe_key_known_value() {
        // sha256("test@example.com")
        assert_eq!(
            dedupe_key("Test@Example.com "),
            "973dfe463ec85785f5f95af5ba3906eedb2d931c24e69824a89ea65dba4e813b"
        );
    }

    proptest! {
        /// dedupe_key(e) == dedupe_key(trim(e).lower()) for arbitrary input.
        #[test]
        fn prop_dedupe_key_normalization_invariant(email in "\\PC{0,64}") {
            let normalized = email.trim().to_lowercase();
            prop_assert_eq!(dedupe_key(&email), dedupe_key(&normalized));
        }
    }
}
