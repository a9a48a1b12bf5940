//! Deployment configuration
//!
//! Describes the desired end state (tunnel name and hostnames), where the
//! local artifacts live, how to reach the external tools, and the local
//! timeout of every bounded operation.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::endpoint::EndpointConfig;
use super::serde_utils::duration;
use crate::error::ConfigError;
use crate::parser::ListFormat;
use crate::types::TunnelId;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub tunnel: TunnelConfig,
    pub paths: PathsConfig,
    pub containers: ContainersConfig,
    pub dns: DnsConfig,
    pub timeouts: TimeoutsConfig,
    pub settle: SettleConfig,
    /// Endpoints to verify; derived from the hostnames when empty
    pub endpoints: Vec<EndpointConfig>,
}

impl DeployConfig {
    /// Check the invariants the pipeline relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tunnel.name.trim().is_empty() {
            return Err(ConfigError::MissingField("tunnel.name".to_string()));
        }
        if self.tunnel.hostnames.is_empty() {
            return Err(ConfigError::MissingField("tunnel.hostnames".to_string()));
        }
        if let Some(bad) = self.tunnel.hostnames.iter().find(|h| h.contains('/') || h.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("not a hostname: {:?}", bad)));
        }
        if self.containers.backend == self.containers.daemon {
            return Err(ConfigError::Invalid(
                "containers.backend and containers.daemon must differ".to_string(),
            ));
        }
        // NaN fails both comparisons, so test for the valid range
        if !(self.settle.multiplier.is_finite() && self.settle.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(
                "settle.multiplier must be a finite number >= 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.settle.jitter) {
            return Err(ConfigError::Invalid("settle.jitter must be within [0, 1]".to_string()));
        }
        for endpoint in &self.endpoints {
            endpoint.validate()?;
        }
        Ok(())
    }

    /// Endpoints to verify, falling back to one per hostname
    pub fn effective_endpoints(&self) -> Vec<EndpointConfig> {
        if !self.endpoints.is_empty() {
            return self.endpoints.clone();
        }
        self.tunnel
            .hostnames
            .iter()
            .map(|host| EndpointConfig::for_hostname(host))
            .collect()
    }

    /// The `credentials-file:` value the routing config should carry
    pub fn credentials_file_value(&self, id: &TunnelId) -> String {
        let mount = self.paths.credentials_mount.trim_end_matches('/');
        format!("{}/{}", mount, id.credential_file_name())
    }
}

/// Desired tunnel identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelConfig {
    /// Tunnel name in the registry
    pub name: String,
    /// Public hostnames routed through the tunnel
    pub hostnames: Vec<String>,
    /// Tunnel CLI executable
    pub tool: String,
    /// Output format requested from `tunnel list`
    pub list_format: ListFormat,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            name: "tunnel-example".to_string(),
            hostnames: vec![
                "app.example.com".to_string(),
                "health.example.com".to_string(),
            ],
            tool: "cloudflared".to_string(),
            list_format: ListFormat::Text,
        }
    }
}

/// Filesystem layout
///
/// Relative paths are resolved against `project_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Repository root; freshly created credential files may land here
    pub project_dir: PathBuf,
    /// Account-level origin certificate
    pub origin_cert: PathBuf,
    /// Canonical directory holding `<uuid>.json` credential files
    pub credentials_dir: PathBuf,
    /// YAML routing configuration with `tunnel:` and `credentials-file:`
    pub routing_config: PathBuf,
    /// JSON pointer recording the active tunnel
    pub pointer_file: PathBuf,
    /// Directory the daemon container sees the credentials under
    pub credentials_mount: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            origin_cert: dirs::home_dir()
                .unwrap_or_default()
                .join(".cloudflared")
                .join("cert.pem"),
            credentials_dir: PathBuf::from("cloudflared").join("credentials"),
            routing_config: PathBuf::from("cloudflared").join("config.yml"),
            pointer_file: PathBuf::from(".tunwright").join("active-tunnel.json"),
            credentials_mount: "/etc/cloudflared/credentials".to_string(),
        }
    }
}

impl PathsConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        self.project_dir.join(path)
    }

    pub fn origin_cert_path(&self) -> PathBuf {
        self.resolve(&self.origin_cert)
    }

    pub fn credentials_dir_path(&self) -> PathBuf {
        self.resolve(&self.credentials_dir)
    }

    pub fn routing_config_path(&self) -> PathBuf {
        self.resolve(&self.routing_config)
    }

    pub fn pointer_file_path(&self) -> PathBuf {
        self.resolve(&self.pointer_file)
    }

    /// Canonical location of a tunnel's credential file
    pub fn credential_path(&self, id: &TunnelId) -> PathBuf {
        self.credentials_dir_path().join(id.credential_file_name())
    }
}

/// Container runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainersConfig {
    /// Container runtime executable
    pub runtime: String,
    /// Arguments selecting the compose front-end, e.g. `["compose"]`
    pub compose_args: Vec<String>,
    /// Backend web service container name
    pub backend: String,
    /// Tunnel daemon container name
    pub daemon: String,
}

impl Default for ContainersConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
            compose_args: vec!["compose".to_string()],
            backend: "tunnel-example-app".to_string(),
            daemon: "tunnel-example-cloudflared".to_string(),
        }
    }
}

impl ContainersConfig {
    /// Compose invocation args followed by `extra`
    pub fn compose<I, S>(&self, extra: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compose_args
            .iter()
            .cloned()
            .chain(extra.into_iter().map(Into::into))
            .collect()
    }

    /// Both container names the deployment needs running
    pub fn expected(&self) -> [&str; 2] {
        [self.backend.as_str(), self.daemon.as_str()]
    }
}

/// DNS-over-HTTPS resolver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// JSON DoH endpoint
    pub resolver_url: String,
    /// Record type to query
    pub record_type: String,
    /// Per-query timeout
    #[serde(with = "duration")]
    pub timeout: Duration,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            resolver_url: "https://cloudflare-dns.com/dns-query".to_string(),
            record_type: "A".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Local timeouts for bounded operations; authentication has none
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    #[serde(with = "duration")]
    pub list: Duration,
    #[serde(with = "duration")]
    pub create: Duration,
    #[serde(with = "duration")]
    pub route: Duration,
    #[serde(with = "duration")]
    pub build: Duration,
    #[serde(with = "duration")]
    pub start: Duration,
    /// Container runtime queries
    #[serde(with = "duration")]
    pub probe: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            list: Duration::from_secs(30),
            create: Duration::from_secs(60),
            route: Duration::from_secs(30),
            build: Duration::from_secs(600),
            start: Duration::from_secs(120),
            probe: Duration::from_secs(15),
        }
    }
}

/// Readiness polling before verification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    /// Initial delay
    #[serde(with = "duration")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,

    /// Hard deadline for the whole wait
    #[serde(with = "duration")]
    pub deadline: Duration,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(2),
            max: Duration::from_secs(15),
            multiplier: 2.0,
            jitter: 0.25,
            deadline: Duration::from_secs(120),
        }
    }
}
