//! Credential file probe

use std::path::{Path, PathBuf};

use tw_core::config::PathsConfig;
use tw_core::types::{CredentialState, CREDENTIAL_EXTENSION};
use tw_core::TunnelId;

/// Inspect the origin certificate, the credentials directory and the
/// project root. A missing directory simply yields no files; the probe
/// never creates anything.
pub async fn probe_credentials(paths: &PathsConfig) -> CredentialState {
    let origin_cert_present = tokio::fs::try_exists(paths.origin_cert_path())
        .await
        .unwrap_or(false);

    let mut state = CredentialState {
        origin_cert_present,
        ..CredentialState::default()
    };

    for name in json_file_names(&paths.credentials_dir_path()).await {
        match TunnelId::from_credential_file_name(&name) {
            Some(id) => {
                state.credential_ids.insert(id);
            }
            None => state.stray_files.push(name),
        }
    }

    let project_dir = &paths.project_dir;
    state.staged_files = json_file_names(project_dir)
        .await
        .into_iter()
        .filter(|name| TunnelId::from_credential_file_name(name).is_some())
        .map(|name| project_dir.join(name))
        .collect();

    state.stray_files.sort();
    state.staged_files.sort();
    state
}

/// Names of regular `*.json` files directly inside `dir`
async fn json_file_names(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot list {:?}: {}", dir, e);
            return names;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        let path: PathBuf = entry.path();
        let is_json = path
            .extension()
            .map(|ext| ext == CREDENTIAL_EXTENSION)
            .unwrap_or(false);
        if is_file && is_json {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }

    names
}
