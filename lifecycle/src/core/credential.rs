//! Credential normalization for the generation service.
//!
//! Operators paste keys in several shapes (`sk-…`, `Bearer sk-…`, bare key,
//! surrounding whitespace). The service accepts exactly one header shape:
//! `Authorization: Bearer sk-<key>`.

use std::fmt;

use crate::error::CredentialError;

const BEARER_PREFIX: &str = "Bearer ";
const KEY_PREFIX: &str = "sk-";

/// A normalized generation service credential.
///
/// `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    key: String,
}

impl Credential {
    /// Normalize a raw credential.
    ///
    /// Strips surrounding whitespace, then a leading `Bearer ` and a leading
    /// `sk-`. Fails when nothing usable remains or the key could not be sent
    /// as a header value.
    pub fn parse(raw: Option<&str>) -> Result<Self, CredentialError> {
        let trimmed = raw.map(str::trim).unwrap_or_default();
        if trimmed.is_empty() {
            return Err(CredentialError::Missing);
        }
        let key = trimmed.strip_prefix(BEARER_PREFIX).unwrap_or(trimmed);
        let key = key.strip_prefix(KEY_PREFIX).unwrap_or(key);
        if key.is_empty() {
            return Err(CredentialError::Malformed {
                reason: "no key after removing prefixes".to_string(),
            });
        }
        if let Some(bad) = key.chars().find(|c| !c.is_ascii_graphic()) {
            return Err(CredentialError::Malformed {
                reason: format!("unexpected character {bad:?} in key"),
            });
        }
        Ok(Self {
            key: key.to_string(),
        })
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("{BEARER_PREFIX}{KEY_PREFIX}{}", self.key)
    }

    /// Short prefix safe to log.
    pub fn redacted(&self) -> String {
        let visible: String = self.key.chars().take(5).collect();
        format!("{KEY_PREFIX}{visible}...")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.redacted()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_common_shape() {
        for raw in [
            "abc123",
            "sk-abc123",
            "Bearer sk-abc123",
            "Bearer abc123",
            "  sk-abc123\n",
        ] {
            let credential = Credential::parse(Some(raw)).expect(raw);
            assert_eq!(credential.authorization_header(), "Bearer sk-abc123");
        }
    }

    #[test]
    fn missing_or_blank_is_missing() {
        assert_eq!(Credential::parse(None), Err(CredentialError::Missing));
        assert_eq!(Credential::parse(Some("")), Err(CredentialError::Missing));
        assert_eq!(Credential::parse(Some(" \t ")), Err(CredentialError::Missing));
    }

    #[test]
    fn prefix_only_is_malformed() {
        for raw in ["sk-", "Bearer sk-"] {
            assert!(matches!(
                Credential::parse(Some(raw)),
                Err(CredentialError::Malformed { .. })
            ));
        }
    }

    #[test]
    fn embedded_whitespace_is_malformed() {
        let err = Credential::parse(Some("sk-abc 123")).unwrap_err();
        assert!(err.to_string().contains("unexpected character"));
    }

    #[test]
    fn debug_hides_key() {
        let credential = Credential::parse(Some("sk-supersecretvalue")).expect("parse");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("supersecretvalue"));
        assert!(rendered.contains("sk-super..."));
    }
}
