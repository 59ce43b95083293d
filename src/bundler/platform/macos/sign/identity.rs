//! Signing identity parsing and Developer ID validation.

use crate::bundler::error::{Error, Result};
use regex::Regex;
use std::fmt;

/// Prefix `codesign` expects in front of a Developer ID name.
pub const DEVELOPER_ID_PREFIX: &str = "Developer ID Application: ";

/// Name with an optional ` (TEAMID)` suffix of ten upper-case alphanumerics.
const DEVELOPER_ID_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9\s\.\-,']+(?:\s+\([A-Z0-9]{10}\))?$";

const MIN_LEN: usize = 2;
const MAX_LEN: usize = 100;

/// Identity used for `codesign --sign`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningIdentity {
    /// Ad-hoc signature (`--sign -`), local execution only.
    AdHoc,
    /// Developer ID name, without the `Developer ID Application:` prefix.
    DeveloperId(String),
}

impl SigningIdentity {
    /// Parses an identity string.
    ///
    /// `-` selects ad-hoc signing. Anything else must be a well-formed
    /// Developer ID, optionally already carrying the `Developer ID Application:`
    /// prefix.
    pub fn parse(value: &str) -> Result<Self> {
        if value == "-" {
            return Ok(SigningIdentity::AdHoc);
        }
        let name = value
            .trim()
            .strip_prefix(DEVELOPER_ID_PREFIX)
            .unwrap_or(value.trim());
        validate_developer_id(name)?;
        Ok(SigningIdentity::DeveloperId(name.to_string()))
    }

    /// Resolves the identity from an explicit value, falling back to a
    /// configured value; absent both, signing is ad-hoc.
    pub fn resolve(explicit: Option<&str>, fallback: Option<&str>) -> Result<Self> {
        match explicit.or(fallback) {
            Some(value) => Self::parse(value),
            None => Ok(SigningIdentity::AdHoc),
        }
    }

    /// Value passed to `codesign --sign`.
    pub fn authority(&self) -> String {
        match self {
            SigningIdentity::AdHoc => "-".to_string(),
            SigningIdentity::DeveloperId(name) => format!("{DEVELOPER_ID_PREFIX}{name}"),
        }
    }

    pub fn is_ad_hoc(&self) -> bool {
        matches!(self, SigningIdentity::AdHoc)
    }
}

impl fmt::Display for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningIdentity::AdHoc => write!(f, "ad-hoc"),
            SigningIdentity::DeveloperId(_) => write!(f, "{}", self.authority()),
        }
    }
}

/// Checks that `id` looks like a Developer ID name such as
/// `Jane Appleseed` or `Jane Appleseed (ABCDE12345)`.
pub fn validate_developer_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::Validation(
            "Developer ID cannot be empty or whitespace".into(),
        ));
    }
    if id.chars().any(char::is_control) {
        return Err(Error::Validation(
            "Developer ID contains control characters".into(),
        ));
    }

    let trimmed = id.trim();
    let len = trimmed.chars().count();
    if !(MIN_LEN..=MAX_LEN).contains(&len) {
        return Err(Error::Validation(format!(
            "Developer ID must be between {MIN_LEN} and {MAX_LEN} characters, got {len}"
        )));
    }

    let pattern = Regex::new(DEVELOPER_ID_PATTERN)?;
    if !pattern.is_match(trimmed) {
        return Err(Error::Validation(format!(
            "invalid Developer ID format: '{trimmed}' (expected 'Name' or 'Name (TEAMID)')"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name_is_valid() {
        assert!(validate_developer_id("John Doe").is_ok());
        assert_eq!(
            SigningIdentity::parse("John Doe").unwrap().authority(),
            "Developer ID Application: John Doe"
        );
    }

    #[test]
    fn test_team_id_suffix() {
        assert!(validate_developer_id("Acme, Inc. (ABCDE12345)").is_ok());
        assert!(validate_developer_id("Acme (abcde12345)").is_err());
        assert!(validate_developer_id("Acme (ABC)").is_err());
    }

    #[test]
    fn test_empty_and_control_characters_rejected() {
        assert!(SigningIdentity::parse("").unwrap_err().is_validation());
        assert!(SigningIdentity::parse("   ").unwrap_err().is_validation());
        assert!(SigningIdentity::parse("John\u{7}Doe").unwrap_err().is_validation());
        assert!(SigningIdentity::parse("John\nDoe").unwrap_err().is_validation());
    }

    #[test]
    fn test_length_bounds() {
        assert!(validate_developer_id("J").is_err());
        assert!(validate_developer_id(&"a".repeat(101)).is_err());
        assert!(validate_developer_id(&"a".repeat(100)).is_ok());
    }

    #[test]
    fn test_must_start_with_letter() {
        assert!(validate_developer_id("1Password").is_err());
        assert!(validate_developer_id("O'Brien-Smith").is_ok());
    }

    #[test]
    fn test_prefixed_identity_is_normalized() {
        let identity =
            SigningIdentity::parse("Developer ID Application: John Doe (ABCDE12345)").unwrap();
        assert_eq!(
            identity,
            SigningIdentity::DeveloperId("John Doe (ABCDE12345)".into())
        );
    }

    #[test]
    fn test_resolve_precedence() {
        assert_eq!(SigningIdentity::resolve(None, None).unwrap(), SigningIdentity::AdHoc);
        assert_eq!(
            SigningIdentity::resolve(Some("-"), Some("John Doe")).unwrap(),
            SigningIdentity::AdHoc
        );
        assert_eq!(
            SigningIdentity::resolve(None, Some("John Doe")).unwrap(),
            SigningIdentity::DeveloperId("John Doe".into())
        );
    }
}
