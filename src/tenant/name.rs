//! Tenant name and external port validation.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ValidationError;

/// Linux limits interface names to 15 bytes.
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Prefix of every tenant bridge interface.
pub const BRIDGE_PREFIX: &str = "br-";

/// Longest name the character rules accept before the bridge bound applies.
const MAX_NAME_LEN: usize = 63;

/// A validated tenant identifier.
///
/// The first character is ASCII alphanumeric, the rest are ASCII
/// alphanumerics or `_`, `.`, `-`, and `br-<name>` fits in a Linux interface
/// name, which caps the name at 12 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TenantName(String);

impl TenantName {
    /// Validate `name`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingField` for an empty name and
    /// `ValidationError::InvalidName` when a character or length rule fails.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let value = name.into();
        let reject = |reason: &str| ValidationError::InvalidName {
            name: value.clone(),
            reason: reason.to_owned(),
        };

        let mut chars = value.chars();
        let Some(first) = chars.next() else {
            return Err(ValidationError::MissingField {
                field: String::from("name"),
            });
        };
        if !first.is_ascii_alphanumeric() {
            return Err(reject("must start with a letter or digit"));
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
            return Err(reject("allowed characters are letters, digits, '_', '.', '-'"));
        }
        if value.len() > MAX_NAME_LEN {
            return Err(reject("longer than 63 characters"));
        }
        if BRIDGE_PREFIX.len() + value.len() > MAX_INTERFACE_NAME_LEN {
            return Err(reject("too long for a bridge interface name"));
        }
        Ok(Self(value))
    }

    /// Return the name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The host bridge interface backing this tenant's network.
    #[must_use]
    pub fn bridge_name(&self) -> String {
        format!("{BRIDGE_PREFIX}{}", self.0)
    }
}

impl fmt::Display for TenantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TenantName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A host port in `1..=65535`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ExternalPort(u16);

impl ExternalPort {
    /// Validate a numeric port.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidPort` for zero or values above 65535.
    pub fn new(port: i64) -> Result<Self, ValidationError> {
        u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .map(Self)
            .ok_or_else(|| ValidationError::InvalidPort {
                value: port.to_string(),
                reason: String::from("must be between 1 and 65535"),
            })
    }

    /// Return the port number.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl FromStr for ExternalPort {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = s
            .trim()
            .parse::<i64>()
            .map_err(|_| ValidationError::InvalidPort {
                value: s.to_owned(),
                reason: String::from("must be an integer"),
            })?;
        Self::new(parsed)
    }
}

impl fmt::Display for ExternalPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
