//! Routing configuration file access
//!
//! The routing config is YAML owned by the operator. Only two top-level
//! scalars are touched, `tunnel:` and `credentials-file:`, and only by
//! replacing their values in place: indentation, comments, ingress rules
//! and line endings are preserved byte-for-byte. The file is never
//! regenerated, so a config lacking either key is an error.

use std::fs;
use std::io;
use std::path::Path;

use tw_core::error::ProbeError;
use tw_core::types::ConfigState;

const TUNNEL_KEY: &str = "tunnel";
const CREDENTIALS_KEY: &str = "credentials-file";

/// Read the current `tunnel:` and `credentials-file:` values
pub fn read_routing_config(path: &Path) -> Result<ConfigState, ProbeError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ConfigState::default()),
        Err(e) => {
            return Err(ProbeError::Unreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    };

    Ok(ConfigState {
        exists: true,
        tunnel_id: find_scalar(&content, TUNNEL_KEY),
        credentials_file: find_scalar(&content, CREDENTIALS_KEY),
    })
}

/// Whether the rewrite changed anything on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    Updated,
    Unchanged,
}

/// Substitute the two scalars in place
pub fn rewrite_routing_config(
    path: &Path,
    tunnel_id: &str,
    credentials_file: &str,
) -> io::Result<RewriteOutcome> {
    let content = fs::read_to_string(path)?;

    let mut seen_tunnel = false;
    let mut seen_credentials = false;
    let mut output = String::with_capacity(content.len() + 64);

    for line in content.split_inclusive('\n') {
        let replacement = if key_of(line) == Some(TUNNEL_KEY) {
            seen_tunnel = true;
            Some(tunnel_id)
        } else if key_of(line) == Some(CREDENTIALS_KEY) {
            seen_credentials = true;
            Some(credentials_file)
        } else {
            None
        };

        match replacement {
            Some(value) => output.push_str(&replace_value(line, value)),
            None => output.push_str(line),
        }
    }

    for (seen, key) in [(seen_tunnel, TUNNEL_KEY), (seen_credentials, CREDENTIALS_KEY)] {
        if !seen {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} has no top-level `{}:` entry", path.display(), key),
            ));
        }
    }

    if output == content {
        return Ok(RewriteOutcome::Unchanged);
    }

    // Write beside the original, then rename over it
    let tmp = path.with_extension("yml.tw-tmp");
    fs::write(&tmp, &output)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    Ok(RewriteOutcome::Updated)
}

/// The key of a top-level `key: value` line
fn key_of(line: &str) -> Option<&str> {
    if line.starts_with(|c: char| c.is_whitespace() || c == '#' || c == '-') {
        return None;
    }
    let (key, _) = line.split_once(':')?;
    Some(key.trim_end())
}

fn find_scalar(content: &str, key: &str) -> Option<String> {
    content
        .lines()
        .find(|line| key_of(line) == Some(key))
        .and_then(|line| line.split_once(':'))
        .map(|(_, rest)| unquote(strip_comment(rest).trim()).to_string())
        .filter(|value| !value.is_empty())
}

/// Rebuild `key: value` keeping any trailing comment and the line ending
fn replace_value(line: &str, value: &str) -> String {
    let (body, ending) = match line.strip_suffix("\r\n") {
        Some(body) => (body, "\r\n"),
        None => match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        },
    };

    let (key, rest) = body.split_once(':').unwrap_or((body, ""));
    let comment = rest
        .find(" #")
        .map(|idx| &rest[idx..])
        .unwrap_or_default();

    format!("{}: {}{}{}", key.trim_end(), value, comment, ending)
}

fn strip_comment(value: &str) -> &str {
    match value.find(" #") {
        Some(idx) => &value[..idx],
        None => value,
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
