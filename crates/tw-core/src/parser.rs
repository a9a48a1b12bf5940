//! Tunnel registry output parsers
//!
//! The registry probe never interprets CLI output itself; it asks a
//! [`TunnelListParser`] for the list arguments and hands the captured
//! stdout back to the same parser. Supporting a new output format of the
//! tunnel tool means adding a parser, not touching the planner.
//!
//! ## Input contracts
//!
//! `text/v1` (`tunnel list`): line oriented. A data row starts with a
//! canonical tunnel id, followed by whitespace and the tunnel name; any
//! further columns (creation time, connections) are ignored. Lines whose
//! first token is not a canonical id (banners, the `ID NAME ...` header,
//! blank lines) are skipped.
//!
//! `json/v1` (`tunnel list --output json`): a JSON array of objects with
//! at least `id` and `name`. Entries whose id is not canonical are skipped.

use serde::{Deserialize, Serialize};

use crate::types::{TunnelId, TunnelRecord};

/// Output format selector used in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFormat {
    #[default]
    Text,
    Json,
}

impl ListFormat {
    /// The parser adapter for this format
    pub fn parser(self) -> Box<dyn TunnelListParser> {
        match self {
            ListFormat::Text => Box::new(TextListParserV1),
            ListFormat::Json => Box::new(JsonListParserV1),
        }
    }
}

/// A versioned adapter over one output format of `tunnel list`
pub trait TunnelListParser: Send + Sync {
    /// Format tag, e.g. `text/v1`
    fn version(&self) -> &'static str;

    /// Arguments after the tool name that produce this format
    fn list_args(&self) -> Vec<String>;

    /// Parse captured stdout into registry rows
    fn parse(&self, stdout: &str) -> Vec<TunnelRecord>;
}

/// Whitespace table produced by the default `tunnel list`
#[derive(Debug, Clone, Copy, Default)]
pub struct TextListParserV1;

impl TunnelListParser for TextListParserV1 {
    fn version(&self) -> &'static str {
        "text/v1"
    }

    fn list_args(&self) -> Vec<String> {
        vec!["tunnel".to_string(), "list".to_string()]
    }

    fn parse(&self, stdout: &str) -> Vec<TunnelRecord> {
        stdout
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let id = TunnelId::parse(fields.next()?)?;
                let name = fields.next()?.to_string();
                Some(TunnelRecord { id, name })
            })
            .collect()
    }
}

/// JSON array produced by `tunnel list --output json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonListParserV1;

#[derive(Debug, Deserialize)]
struct JsonTunnel {
    id: String,
    name: String,
}

impl TunnelListParser for JsonListParserV1 {
    fn version(&self) -> &'static str {
        "json/v1"
    }

    fn list_args(&self) -> Vec<String> {
        ["tunnel", "list", "--output", "json"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn parse(&self, stdout: &str) -> Vec<TunnelRecord> {
        let rows: Vec<JsonTunnel> = match serde_json::from_str(stdout.trim()) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable tunnel list JSON");
                return Vec::new();
            }
        };

        rows.into_iter()
            .filter_map(|row| {
                Some(TunnelRecord {
                    id: TunnelId::parse(&row.id)?,
                    name: row.name,
                })
            })
            .collect()
    }
}

/// Extract the id of a freshly created tunnel from `tunnel create` output.
///
/// Picks the first whitespace-delimited token that is a canonical id,
/// after stripping trailing punctuation.
pub fn parse_created_id(output: &str) -> Option<TunnelId> {
    output
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '-'))
        .find_map(TunnelId::parse)
}

/// Extract the credentials path from a `... written to <path>` line
pub fn parse_credentials_path(output: &str) -> Option<std::path::PathBuf> {
    output.lines().find_map(|line| {
        let (_, rest) = line.split_once("written to ")?;
        let path = rest.split_whitespace().next()?.trim_end_matches('.');
        Some(std::path::PathBuf::from(path))
    })
}
