//! Container image references written into the tenant `.env` file.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ValidationError;

/// Registry references are capped at 255 characters by the engine.
const MAX_IMAGE_LEN: usize = 255;

/// A container image reference such as `registry:5000/team/app:1.2@sha256:...`.
///
/// Only ASCII alphanumerics and `.`, `_`, `-`, `/`, `:`, `@` are accepted,
/// so a reference always stays on its own `IMAGE=` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    /// Validate `image`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` for a blank reference and
    /// `ValidationError::InvalidImage` when a character or length rule fails.
    pub fn new(image: impl Into<String>) -> Result<Self, ValidationError> {
        let value = image.into();
        let reject = |reason: &str| ValidationError::InvalidImage {
            image: value.escape_debug().to_string(),
            reason: reason.to_owned(),
        };

        let Some(first) = value.chars().next() else {
            return Err(ValidationError::MissingField {
                field: String::from("image"),
            });
        };
        if value.chars().any(char::is_control) {
            return Err(reject("contains a control character"));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(reject("contains whitespace"));
        }
        if !first.is_ascii_alphanumeric() {
            return Err(reject("must start with a letter or digit"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | ':' | '@'))
        {
            return Err(reject(
                "allowed characters are letters, digits, '.', '_', '-', '/', ':', '@'",
            ));
        }
        if value.len() > MAX_IMAGE_LEN {
            return Err(reject("longer than 255 characters"));
        }
        Ok(Self(value))
    }

    /// Return the reference.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ImageRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}
