//! Basic-auth credential hashes accepted by the reverse proxy.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ValidationError;

/// Length of the salt and digest that follow `$2b$NN$`.
const BCRYPT_BODY_LEN: usize = 53;

/// A bcrypt hash in modular crypt form, `$2a$`, `$2b$` or `$2y$` followed by
/// a two-digit cost and 53 characters of bcrypt base64.
///
/// The proxy fragment embeds the hash verbatim, so only this shape is ever
/// written; whitespace, braces and comment markers cannot reach the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CredentialHash(String);

impl CredentialHash {
    /// Validate `hash`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` for a blank value and
    /// `ValidationError::InvalidCredential` when it is not a bcrypt hash.
    pub fn new(hash: impl Into<String>) -> Result<Self, ValidationError> {
        let value = hash.into();
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: String::from("credential_hash"),
            });
        }
        if !is_bcrypt(&value) {
            return Err(ValidationError::InvalidCredential {
                reason: String::from(
                    "expected a bcrypt hash such as '$2b$12$' followed by 53 characters of [./A-Za-z0-9]",
                ),
            });
        }
        Ok(Self(value))
    }

    /// Return the hash.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_bcrypt(value: &str) -> bool {
    let Some(rest) = value.strip_prefix("$2") else {
        return false;
    };
    let mut parts = rest.splitn(3, '$');
    let variant = parts.next();
    let cost = parts.next().unwrap_or_default();
    let body = parts.next().unwrap_or_default();
    matches!(variant, Some("a" | "b" | "y"))
        && cost.len() == 2
        && cost.bytes().all(|byte| byte.is_ascii_digit())
        && body.len() == BCRYPT_BODY_LEN
        && body
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'/'))
}

impl fmt::Display for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CredentialHash {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const HASH: &str = "$2b$12$nr213f0pJnQuCAdLnRTMeODqoniH1YH.Aqp6x2a9Wam01FtLdCB7O";

    #[rstest]
    #[case(HASH)]
    #[case("$2a$10$nr213f0pJnQuCAdLnRTMeODqoniH1YH.Aqp6x2a9Wam01FtLdCB7O")]
    #[case("$2y$04$././././././././././././././././././././././././././.")]
    fn bcrypt_hashes_are_accepted(#[case] raw: &str) {
        let hash = CredentialHash::new(raw).expect("hash should be valid");
        assert_eq!(hash.as_str(), raw);
    }

    #[rstest]
    #[case::newline_and_braces("x\n    }\n}\nevil.example {\n    reverse_proxy 10.0.0.1:22")]
    #[case::inner_space("has space")]
    #[case::trailing_brace(
        "$2b$12$nr213f0pJnQuCAdLnRTMeODqoniH1YH.Aqp6x2a9Wam01FtLdCB7}"
    )]
    #[case::comment_marker("$2b$12$nr213f0pJnQuCAdLnRTMeODqoniH1YH.Aqp6x2a9Wam01Ft#dCB7O")]
    #[case::unknown_variant("$2x$12$nr213f0pJnQuCAdLnRTMeODqoniH1YH.Aqp6x2a9Wam01FtLdCB7O")]
    #[case::short_body("$2b$12$hash")]
    #[case::three_digit_cost("$2b$123$r213f0pJnQuCAdLnRTMeODqoniH1YH.Aqp6x2a9Wam01FtLdCB7O")]
    #[case::appended_line(
        "$2b$12$nr213f0pJnQuCAdLnRTMeODqoniH1YH.Aqp6x2a9Wam01FtLdCB7O\nevil {"
    )]
    fn non_bcrypt_values_are_rejected(#[case] raw: &str) {
        assert!(matches!(
            CredentialHash::new(raw),
            Err(ValidationError::InvalidCredential { .. })
        ));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn blank_hash_is_missing(#[case] raw: &str) {
        assert!(matches!(
            CredentialHash::new(raw),
            Err(ValidationError::MissingField { field }) if field == "credential_hash"
        ));
    }

    #[rstest]
    fn parsing_trims_surrounding_whitespace() {
        let hash: CredentialHash = format!("  {HASH}\n").parse().expect("should parse");
        assert_eq!(hash.as_str(), HASH);
    }
}
