//! Snapshot fixtures shared by unit tests

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tw_core::config::DeployConfig;
use tw_core::types::{ConfigState, ContainerState, CredentialState, TunnelInfo};
use tw_core::{CommandResult, CommandRunner, CommandSpec, TunnelId};

use crate::probe::ProbeSnapshot;

pub const A: &str = "6ff42ae2-765d-4adf-8112-31c55c1551ef";
pub const B: &str = "0a1b2c3d-0000-4000-8000-123456789abc";

pub fn id(s: &str) -> TunnelId {
    TunnelId::parse(s).unwrap()
}

pub fn config() -> DeployConfig {
    let mut config = DeployConfig::default();
    config.paths.project_dir = PathBuf::from("/srv/site");
    config
}

pub fn tunnel(s: &str, name: &str, creds: bool) -> TunnelInfo {
    TunnelInfo {
        id: id(s),
        name: name.to_string(),
        has_credentials: creds,
        credentials_path: None,
    }
}

/// Nothing exists yet except the operator's routing config
pub fn clean_slate() -> ProbeSnapshot {
    ProbeSnapshot {
        config: ConfigState {
            exists: true,
            tunnel_id: Some("<tunnel-id>".to_string()),
            credentials_file: None,
        },
        ..ProbeSnapshot::default()
    }
}

/// Tunnel `A` fully reconciled
pub fn deployed(config: &DeployConfig) -> ProbeSnapshot {
    ProbeSnapshot {
        credentials: CredentialState {
            origin_cert_present: true,
            credential_ids: [id(A)].into_iter().collect(),
            ..CredentialState::default()
        },
        tunnels: vec![tunnel(A, &config.tunnel.name, true)],
        config: ConfigState {
            exists: true,
            tunnel_id: Some(A.to_string()),
            credentials_file: Some(config.credentials_file_value(&id(A))),
        },
        dns: config
            .tunnel
            .hostnames
            .iter()
            .map(|h| (h.clone(), true))
            .collect(),
        containers: ContainerState::from_names(
            config.containers.expected(),
            &config.containers.expected(),
        ),
        ..ProbeSnapshot::default()
    }
}

/// Command runner answering by argument prefix; unmatched commands succeed
#[derive(Default)]
pub struct Scripted {
    responses: Vec<(String, CommandResult)>,
    calls: Mutex<Vec<String>>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands whose joined args start with `prefix`
    pub fn on(mut self, prefix: &str, result: CommandResult) -> Self {
        self.responses.push((prefix.to_string(), result));
        self
    }

    /// Joined args of every command run so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for Scripted {
    async fn run(&self, spec: &CommandSpec) -> CommandResult {
        let line = spec.args.join(" ");
        self.calls.lock().unwrap().push(line.clone());
        self.responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| CommandResult::ok(""))
    }
}
