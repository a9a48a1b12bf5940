//! Active tunnel pointer file
//!
//! A small JSON file recording which tunnel the last successful deploy
//! used. It is read once per run and handed to the planner as an explicit
//! input; nothing consults it implicitly.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::time::current_time_secs;
use crate::types::TunnelId;

/// Contents of the pointer file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePointer {
    /// Tunnel in use after the last deploy
    pub tunnel_id: TunnelId,
    /// Tunnel name at the time of writing
    #[serde(default)]
    pub tunnel_name: String,
    /// Unix seconds
    #[serde(default)]
    pub updated_at: u64,
}

impl ActivePointer {
    /// Create a pointer stamped with the current time
    pub fn new(tunnel_id: TunnelId, tunnel_name: impl Into<String>) -> Self {
        Self {
            tunnel_id,
            tunnel_name: tunnel_name.into(),
            updated_at: current_time_secs(),
        }
    }
}

/// Read the pointer file
///
/// Returns `Ok(None)` if the file doesn't exist, or an error if it is
/// malformed.
pub fn read_pointer(path: &Path) -> io::Result<Option<ActivePointer>> {
    match fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write the pointer file
///
/// Creates parent directories if they don't exist.
pub fn write_pointer(path: &Path, pointer: &ActivePointer) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(pointer)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, json + "\n")
}
