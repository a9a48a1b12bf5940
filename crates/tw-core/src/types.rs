//! Core domain types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Canonical tunnel identifier.
///
/// Always the 36-character lowercase hyphenated UUID form
/// (`8-4-4-4-12`). Any other spelling of a UUID is rejected so that file
/// names and registry rows compare byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TunnelId(String);

impl TunnelId {
    /// Length of the canonical hyphenated form
    pub const LEN: usize = 36;

    /// Parse a tunnel id, accepting only the canonical lowercase shape
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != Self::LEN {
            return None;
        }
        if s.chars().any(|c| c.is_ascii_uppercase()) {
            return None;
        }
        let hyphens_ok = s
            .char_indices()
            .all(|(i, c)| matches!(i, 8 | 13 | 18 | 23) == (c == '-'));
        if !hyphens_ok {
            return None;
        }
        uuid::Uuid::try_parse(s).ok().map(|_| Self(s.to_string()))
    }

    /// Parse a credential file name of the form `<uuid>.json`
    pub fn from_credential_file_name(name: &str) -> Option<Self> {
        name.strip_suffix(CREDENTIAL_EXTENSION)
            .and_then(|stem| stem.strip_suffix('.'))
            .and_then(Self::parse)
    }

    /// The credential file name for this tunnel (`<uuid>.json`)
    pub fn credential_file_name(&self) -> String {
        format!("{}.{}", self.0, CREDENTIAL_EXTENSION)
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Extension of per-tunnel credential files
pub const CREDENTIAL_EXTENSION: &str = "json";

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TunnelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("not a canonical tunnel id: {s}"))
    }
}

impl TryFrom<String> for TunnelId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TunnelId> for String {
    fn from(id: TunnelId) -> Self {
        id.0
    }
}

/// One row of the tunnel registry, before cross-referencing local state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRecord {
    pub id: TunnelId,
    pub name: String,
}

/// A registry tunnel cross-referenced against local credential files
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunnelInfo {
    /// Tunnel identifier
    pub id: TunnelId,
    /// Human label; not unique
    pub name: String,
    /// Whether `<id>.json` is present in the credentials directory
    pub has_credentials: bool,
    /// Path of that credentials file, when present
    pub credentials_path: Option<PathBuf>,
}

/// Local credential files and origin certificate presence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialState {
    /// Whether the account-level origin certificate exists
    pub origin_cert_present: bool,
    /// Tunnel ids with a credential file in the credentials directory
    pub credential_ids: BTreeSet<TunnelId>,
    /// `.json` files in the credentials directory whose stem is not a tunnel id
    pub stray_files: Vec<String>,
    /// Credential files still sitting in the project root
    pub staged_files: Vec<PathBuf>,
}

impl CredentialState {
    /// Whether a credential file is present for the given tunnel
    pub fn has(&self, id: &TunnelId) -> bool {
        self.credential_ids.contains(id)
    }
}

/// Values currently written into the routing configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigState {
    /// Whether the routing config file exists at all
    pub exists: bool,
    /// Value of the `tunnel:` scalar
    pub tunnel_id: Option<String>,
    /// Value of the `credentials-file:` scalar
    pub credentials_file: Option<String>,
}

/// Per-hostname resolution state
pub type DnsState = BTreeMap<String, bool>;

/// Running container names and whether the expected pair is up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerState {
    /// Both the backend and the tunnel daemon containers are running
    pub running: bool,
    /// Every running container name reported by the runtime
    pub names: BTreeSet<String>,
}

impl ContainerState {
    /// Build the state from the runtime's name list
    pub fn from_names<I, S>(names: I, expected: &[&str]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        let running = expected.iter().all(|n| names.contains(*n));
        Self { running, names }
    }
}
