//! Read-only state probes
//!
//! Four independent queries (credentials, tunnel registry, DNS, running
//! containers) plus two local reads (routing config, active pointer).
//! None of them mutates anything and none waits on another: they are
//! joined concurrently and only cross-referenced once all have returned.

mod containers;
mod credentials;
mod dns;
mod registry;

pub use containers::probe_containers;
pub use credentials::probe_credentials;
pub use dns::{probe_dns, DnsLookup, DnsResolver, DohResolver};
pub use registry::{cross_reference, probe_registry};

use std::collections::BTreeSet;

use tw_core::config::DeployConfig;
use tw_core::error::ProbeError;
use tw_core::pointer::read_pointer;
use tw_core::types::{ConfigState, ContainerState, CredentialState, DnsState, TunnelInfo};
use tw_core::{CommandRunner, TunnelId};

use crate::routing::read_routing_config;

/// Everything the planner and the diagnostics reporter look at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeSnapshot {
    pub credentials: CredentialState,
    /// Registry rows cross-referenced against `credentials`
    pub tunnels: Vec<TunnelInfo>,
    /// Set when the registry could not be listed
    pub registry_error: Option<ProbeError>,
    pub config: ConfigState,
    pub dns: DnsState,
    pub containers: ContainerState,
    /// Tunnel id recorded by the last successful deploy
    pub pointer: Option<TunnelId>,
    /// Non-fatal probe problems
    pub warnings: Vec<String>,
}

impl ProbeSnapshot {
    /// Registry tunnels carrying the given name
    pub fn tunnels_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a TunnelInfo> + 'a {
        self.tunnels.iter().filter(move |t| t.name == name)
    }

    /// Hostnames that do not resolve yet, in configuration order
    pub fn unresolved<'a>(&'a self, hostnames: &'a [String]) -> impl Iterator<Item = &'a String> + 'a {
        hostnames
            .iter()
            .filter(move |h| !self.dns.get(h.as_str()).copied().unwrap_or(false))
    }
}

/// Run every probe concurrently and assemble a snapshot
pub async fn gather(
    config: &DeployConfig,
    runner: &dyn CommandRunner,
    resolver: &dyn DnsResolver,
) -> ProbeSnapshot {
    let parser = config.tunnel.list_format.parser();

    let (credentials, registry, dns, containers) = tokio::join!(
        probe_credentials(&config.paths),
        probe_registry(runner, &config.tunnel.tool, parser.as_ref(), config.timeouts.list),
        probe_dns(resolver, &config.tunnel.hostnames),
        probe_containers(runner, &config.containers, config.timeouts.probe),
    );

    let mut warnings = Vec::new();

    let (tunnels, registry_error) = match registry {
        Ok(records) => (cross_reference(records, &credentials, &config.paths), None),
        Err(e) => {
            tracing::debug!(error = %e, "Registry probe failed");
            (Vec::new(), Some(e))
        }
    };

    let containers = match containers {
        Ok(state) => state,
        Err(e) => {
            warnings.push(e.to_string());
            ContainerState::default()
        }
    };

    let config_state = match read_routing_config(&config.paths.routing_config_path()) {
        Ok(state) => state,
        Err(e) => {
            warnings.push(e.to_string());
            ConfigState::default()
        }
    };

    let pointer = match read_pointer(&config.paths.pointer_file_path()) {
        Ok(pointer) => pointer.map(|p| p.tunnel_id),
        Err(e) => {
            warnings.push(format!("Ignoring unreadable active-tunnel pointer: {}", e));
            None
        }
    };

    ProbeSnapshot {
        credentials,
        tunnels,
        registry_error,
        config: config_state,
        dns,
        containers,
        pointer,
        warnings,
    }
}

/// Ids from a tunnel list, for log lines and messages
pub fn id_list<'a>(ids: impl IntoIterator<Item = &'a TunnelId>) -> String {
    ids.into_iter()
        .map(TunnelId::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(", ")
}
