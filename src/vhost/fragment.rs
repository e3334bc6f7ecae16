//! The reverse-proxy fragment model and its two on-disk revisions.
//!
//! A fragment routes one tenant site to its container and guards it with
//! basic auth. The legacy revision has no marker line and no bypass rules;
//! the current revision starts with a marker comment and may exempt paths
//! from authentication:
//!
//! ```text
//! # podhost:fragment rev=2
//! alpha.local.hikka.host {
//!     @bypass path /health
//!     handle @bypass {
//!         reverse_proxy 192.168.3.101:8080
//!     }
//!     handle {
//!         # podhost:auth
//!         basicauth {
//!             alpha $2b$12$...
//!         }
//!         reverse_proxy 192.168.3.101:8080
//!     }
//! }
//! ```

use serde::Serialize;

use crate::error::FragmentParseError;
use crate::tenant::CredentialHash;

/// Marker prefix on the first line of current-revision fragments.
const REVISION_MARKER: &str = "# podhost:fragment rev=";

/// Marker line preceding the authentication block.
const AUTH_MARKER: &str = "# podhost:auth";

const BYPASS_MATCHER: &str = "@bypass path";

/// Fragment template revisions, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Revision {
    /// Unmarked fragments written before revisions were tracked.
    Legacy,
    /// The marked template with optional bypass rules.
    Current,
}

impl Revision {
    const fn number(self) -> u32 {
        match self {
            Self::Legacy => 1,
            Self::Current => 2,
        }
    }

    const fn from_number(number: u32) -> Option<Self> {
        match number {
            1 => Some(Self::Legacy),
            2 => Some(Self::Current),
            _ => None,
        }
    }
}

/// The user and password hash of the auth block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Basic-auth user name.
    pub user: String,
    /// Password hash; never a plaintext password.
    pub hash: CredentialHash,
}

/// A parsed or freshly built fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Template revision the fragment is rendered in.
    pub revision: Revision,
    /// Site address, `<tenant>.<server>.<domain>`.
    pub site: String,
    /// Upstream `host:port`.
    pub upstream: String,
    /// Paths served without authentication.
    pub bypass_paths: Vec<String>,
    /// The basic-auth credential.
    pub credential: Credential,
}

impl Fragment {
    /// Render the fragment in its own revision.
    #[must_use]
    pub fn render(&self) -> String {
        match self.revision {
            Revision::Legacy => self.render_legacy(),
            Revision::Current => self.render_current(),
        }
    }

    fn render_legacy(&self) -> String {
        format!(
            "\n{site} {{\n    reverse_proxy {upstream}\n    basicauth {{\n        {user} {hash}\n    }}\n}}\n",
            site = self.site,
            upstream = self.upstream,
            user = self.credential.user,
            hash = self.credential.hash,
        )
    }

    fn render_current(&self) -> String {
        let mut lines = vec![
            format!("{REVISION_MARKER}{}", Revision::Current.number()),
            format!("{} {{", self.site),
        ];
        if self.bypass_paths.is_empty() {
            self.push_auth(&mut lines, "    ");
            lines.push(format!("    reverse_proxy {}", self.upstream));
        } else {
            lines.push(format!("    {BYPASS_MATCHER} {}", self.bypass_paths.join(" ")));
            lines.push(String::from("    handle @bypass {"));
            lines.push(format!("        reverse_proxy {}", self.upstream));
            lines.push(String::from("    }"));
            lines.push(String::from("    handle {"));
            self.push_auth(&mut lines, "        ");
            lines.push(format!("        reverse_proxy {}", self.upstream));
            lines.push(String::from("    }"));
        }
        lines.push(String::from("}"));
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    fn push_auth(&self, lines: &mut Vec<String>, indent: &str) {
        lines.push(format!("{indent}{AUTH_MARKER}"));
        lines.push(format!("{indent}basicauth {{"));
        lines.push(format!(
            "{indent}    {} {}",
            self.credential.user, self.credential.hash
        ));
        lines.push(format!("{indent}}}"));
    }

    /// Parse either revision.
    ///
    /// # Errors
    ///
    /// Returns the first structural element that could not be found, or
    /// `FragmentParseError::InvalidHash` when the stored hash is not bcrypt.
    pub fn parse(text: &str) -> Result<Self, FragmentParseError> {
        let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
        let mut revision = Revision::Legacy;
        let mut site = None;
        let mut upstream = None;
        let mut bypass_paths = Vec::new();
        let mut credential = None;

        while let Some(line) = lines.next() {
            if line.starts_with('#') {
                if let Some(number) = line.strip_prefix(REVISION_MARKER) {
                    revision = number
                        .trim()
                        .parse()
                        .ok()
                        .and_then(Revision::from_number)
                        .ok_or_else(|| FragmentParseError::UnsupportedRevision {
                            value: number.trim().to_owned(),
                        })?;
                }
            } else if site.is_none() {
                site = Some(parse_site(line)?);
            } else if let Some(paths) = line.strip_prefix(BYPASS_MATCHER) {
                bypass_paths = paths.split_whitespace().map(str::to_owned).collect();
            } else if let Some(target) = line.strip_prefix("reverse_proxy ") {
                if upstream.is_none() {
                    upstream = Some(target.trim().to_owned());
                }
            } else if line.starts_with("basicauth") {
                let entry = lines.next().ok_or(FragmentParseError::EmptyAuth)?;
                credential = Some(parse_credential(entry)?);
            }
        }

        Ok(Self {
            revision,
            site: site.ok_or(FragmentParseError::MissingSite)?,
            upstream: upstream.ok_or(FragmentParseError::MissingUpstream)?,
            bypass_paths,
            credential: credential.ok_or(FragmentParseError::MissingAuth)?,
        })
    }
}

fn parse_site(line: &str) -> Result<String, FragmentParseError> {
    line.strip_suffix('{')
        .map(str::trim)
        .filter(|site| !site.is_empty() && !site.contains(char::is_whitespace))
        .map(str::to_owned)
        .ok_or_else(|| FragmentParseError::InvalidSite {
            line: line.to_owned(),
        })
}

fn parse_credential(line: &str) -> Result<Credential, FragmentParseError> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(user), Some(hash), None) if user != "}" => Ok(Credential {
            user: user.to_owned(),
            hash: CredentialHash::new(hash).map_err(|_| FragmentParseError::InvalidHash {
                user: user.to_owned(),
            })?,
        }),
        _ => Err(FragmentParseError::InvalidCredentialLine {
            line: line.to_owned(),
        }),
    }
}
