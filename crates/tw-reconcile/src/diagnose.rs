//! Diagnostics reporter
//!
//! Runs the planner's decision rules in report-only mode: every deviation
//! becomes an [`Issue`] with a paired recommendation, and the set of issue
//! categories found selects copy-pasteable quick-fix commands.

use std::path::Path;

use serde::Serialize;

use tw_core::config::DeployConfig;
use tw_core::types::{DnsState, TunnelInfo};
use tw_core::TunnelId;

use crate::planner::{assess, TunnelRef, TunnelResolution};
use crate::probe::ProbeSnapshot;

/// Issue category; drives the quick-fix list
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingOriginCert,
    TunnelMissing,
    DuplicateTunnelName,
    NoCredentials,
    MultipleCredentials,
    CredentialsForOtherTunnel,
    UnrelocatedCredential,
    RoutingConfigMissing,
    ConfigMismatch,
    DnsMissing,
    ContainersDown,
}

impl IssueKind {
    /// Only an operator can resolve these
    pub fn is_ambiguity(&self) -> bool {
        matches!(
            self,
            IssueKind::DuplicateTunnelName
                | IssueKind::NoCredentials
                | IssueKind::MultipleCredentials
                | IssueKind::CredentialsForOtherTunnel
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
    pub recommendation: String,
}

impl Issue {
    pub fn new(kind: IssueKind, message: impl Into<String>, recommendation: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            recommendation: recommendation.into(),
        }
    }
}

/// Outcome of a diagnose run
///
/// Carries the observed state next to the findings so `--json` consumers
/// see what the issues were derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticResult {
    pub tunnels: Vec<TunnelInfo>,
    /// `tunnel:` value in the routing config
    pub config_tunnel_id: Option<String>,
    /// Pointer if it names a present credential, else the single credential file
    pub active_tunnel_id: Option<TunnelId>,
    pub dns_records: DnsState,
    pub containers_running: bool,
    pub issues: Vec<Issue>,
    /// Observations that do not affect the exit status
    pub warnings: Vec<String>,
    pub quick_fixes: Vec<String>,
}

impl DiagnosticResult {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn recommendations(&self) -> impl Iterator<Item = &str> {
        self.issues.iter().map(|i| i.recommendation.as_str())
    }

    /// Non-zero iff any issue was recorded
    pub fn exit_code(&self) -> i32 {
        if self.issues.is_empty() {
            0
        } else {
            1
        }
    }
}

/// Report what is wrong with the deployment described by `snapshot`
pub fn diagnose(snapshot: &ProbeSnapshot, config: &DeployConfig) -> DiagnosticResult {
    let assessment = assess(snapshot, config);
    let tool = &config.tunnel.tool;
    let name = &config.tunnel.name;

    let mut issues = Vec::new();
    let mut fixes = Vec::new();

    // A staged copy of a credential already in place is never moved
    for staged in snapshot.credentials.staged_files.iter().filter(|p| !is_stale_copy(snapshot, p)) {
        issues.push(Issue::new(
            IssueKind::UnrelocatedCredential,
            format!("Credential file {} is outside the credentials directory", staged.display()),
            format!(
                "Move it into {} (deploy does this automatically)",
                config.paths.credentials_dir.display()
            ),
        ));
    }

    if !snapshot.credentials.origin_cert_present {
        issues.push(Issue::new(
            IssueKind::MissingOriginCert,
            format!(
                "Origin certificate not found at {}",
                config.paths.origin_cert_path().display()
            ),
            format!("Authenticate with `{} tunnel login`", tool),
        ));
    }

    // A failed listing says nothing about whether the tunnel exists
    if assessment.tunnel == TunnelResolution::Missing && snapshot.registry_error.is_none() {
        issues.push(Issue::new(
            IssueKind::TunnelMissing,
            format!("No tunnel named '{}' exists", name),
            format!("Create it with `{} tunnel create {}`", tool, name),
        ));
    }

    issues.extend(assessment.ambiguities(config));

    if !snapshot.config.exists {
        issues.push(Issue::new(
            IssueKind::RoutingConfigMissing,
            format!(
                "Routing config not found at {}",
                config.paths.routing_config_path().display()
            ),
            "Restore the routing config from version control; it is never generated",
        ));
    } else if let Some(TunnelRef::Existing(id)) = assessment.config_target() {
        let expected_creds = config.credentials_file_value(&id);
        let tunnel_ok = snapshot.config.tunnel_id.as_deref() == Some(id.as_str());
        let creds_ok = snapshot.config.credentials_file.as_deref() == Some(expected_creds.as_str());
        if !(tunnel_ok && creds_ok) {
            let message = if tunnel_ok {
                format!(
                    "Config credentials-file is {}, expected {}",
                    snapshot.config.credentials_file.as_deref().unwrap_or("unset"),
                    expected_creds
                )
            } else {
                format!(
                    "Config tunnel id ({}) doesn't match credentialed tunnel {}",
                    snapshot.config.tunnel_id.as_deref().unwrap_or("unset"),
                    id
                )
            };
            issues.push(Issue::new(
                IssueKind::ConfigMismatch,
                message,
                format!("Point the config at tunnel {}", id),
            ));
            fixes.push(format!("tunwright update-config --tunnel-id {}", id));
        }
    }

    let route_target = match assessment.route_target() {
        Some(TunnelRef::Existing(id)) => id.to_string(),
        _ => name.clone(),
    };
    for hostname in snapshot.unresolved(&config.tunnel.hostnames) {
        let command = format!("{} tunnel route dns {} {}", tool, route_target, hostname);
        issues.push(Issue::new(
            IssueKind::DnsMissing,
            format!("{} does not resolve", hostname),
            format!("Route it with `{}`", command),
        ));
        fixes.push(command);
    }

    if !snapshot.containers.running {
        let missing: Vec<&str> = config
            .containers
            .expected()
            .into_iter()
            .filter(|n| !snapshot.containers.names.contains(*n))
            .collect();
        let command = format!(
            "{} {}",
            config.containers.runtime,
            config.containers.compose(["up", "-d"]).join(" ")
        );
        issues.push(Issue::new(
            IssueKind::ContainersDown,
            format!("Containers not running: {}", missing.join(", ")),
            format!("Start them with `{}`", command),
        ));
        fixes.push(command);
    }

    let mut quick_fixes = Vec::new();
    let has = |kind: IssueKind| issues.iter().any(|i| i.kind == kind);
    if has(IssueKind::MissingOriginCert) {
        quick_fixes.push(format!("{} tunnel login", tool));
    }
    if has(IssueKind::TunnelMissing) {
        quick_fixes.push(format!("{} tunnel create {}", tool, name));
    }
    quick_fixes.extend(fixes);
    if has(IssueKind::UnrelocatedCredential) {
        quick_fixes.push("tunwright deploy".to_string());
    }

    DiagnosticResult {
        tunnels: snapshot.tunnels.clone(),
        config_tunnel_id: snapshot.config.tunnel_id.clone(),
        active_tunnel_id: assessment.active_tunnel,
        dns_records: snapshot.dns.clone(),
        containers_running: snapshot.containers.running,
        warnings: collect_warnings(snapshot),
        issues,
        quick_fixes,
    }
}

/// Staged file whose tunnel already has credentials in the credentials directory
fn is_stale_copy(snapshot: &ProbeSnapshot, staged: &Path) -> bool {
    staged
        .file_name()
        .and_then(|n| TunnelId::from_credential_file_name(&n.to_string_lossy()))
        .map(|id| snapshot.credentials.has(&id))
        .unwrap_or(false)
}

fn collect_warnings(snapshot: &ProbeSnapshot) -> Vec<String> {
    let mut warnings = Vec::new();

    for stray in &snapshot.credentials.stray_files {
        warnings.push(format!(
            "Unrecognized file in credentials directory: {} (not <tunnel-id>.json)",
            stray
        ));
    }

    for staged in &snapshot.credentials.staged_files {
        if is_stale_copy(snapshot, staged) {
            warnings.push(format!(
                "Stale copy of {} in the project root; the credentials directory already has it, remove it",
                staged.display()
            ));
        }
    }

    match &snapshot.registry_error {
        Some(e) => warnings.push(e.to_string()),
        None => {
            if let Some(pointer) = &snapshot.pointer {
                if !snapshot.tunnels.iter().any(|t| &t.id == pointer) {
                    warnings.push(format!(
                        "Active-tunnel pointer names {}, which is not in the registry",
                        pointer
                    ));
                }
            }
        }
    }

    warnings.extend(snapshot.warnings.iter().cloned());
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{clean_slate, config, deployed, id, tunnel, A, B};
    use tw_core::error::ProbeError;

    fn kinds(result: &DiagnosticResult) -> Vec<IssueKind> {
        result.issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn test_clean_slate_reports_five_issues() {
        let result = diagnose(&clean_slate(), &config());

        assert_eq!(
            kinds(&result),
            vec![
                IssueKind::MissingOriginCert,
                IssueKind::TunnelMissing,
                IssueKind::DnsMissing,
                IssueKind::DnsMissing,
                IssueKind::ContainersDown,
            ]
        );
        assert_eq!(result.recommendations().count(), 5);
        assert_eq!(result.exit_code(), 1);
        assert_eq!(
            result.quick_fixes,
            vec![
                "cloudflared tunnel login",
                "cloudflared tunnel create tunnel-example",
                "cloudflared tunnel route dns tunnel-example app.example.com",
                "cloudflared tunnel route dns tunnel-example health.example.com",
                "docker compose up -d",
            ]
        );
    }

    #[test]
    fn test_fully_deployed_is_healthy() {
        let config = config();
        let result = diagnose(&deployed(&config), &config);

        assert!(result.is_healthy(), "{:?}", result.issues);
        assert!(result.warnings.is_empty());
        assert!(result.quick_fixes.is_empty());
        assert_eq!(result.exit_code(), 0);

        assert_eq!(result.active_tunnel_id, Some(id(A)));
        assert_eq!(result.config_tunnel_id.as_deref(), Some(A));
        assert_eq!(result.tunnels.len(), 1);
        assert!(result.containers_running);
        assert!(result.dns_records.values().all(|resolved| *resolved));
    }

    #[test]
    fn test_stale_staged_copy_is_only_a_warning() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.credentials.staged_files = vec![std::path::PathBuf::from(format!("/srv/site/{A}.json"))];

        let result = diagnose(&snapshot, &config);

        assert!(crate::planner::plan(&snapshot, &config).is_converged());
        assert!(result.is_healthy(), "{:?}", result.issues);
        assert_eq!(result.exit_code(), 0);
        assert!(result.quick_fixes.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("Stale copy"));
        assert!(result.warnings[0].contains(A));
    }

    #[test]
    fn test_staged_credential_for_new_tunnel_is_an_issue() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.credentials.credential_ids.clear();
        snapshot.credentials.staged_files = vec![std::path::PathBuf::from(format!("/srv/site/{A}.json"))];

        let result = diagnose(&snapshot, &config);

        assert_eq!(kinds(&result), vec![IssueKind::UnrelocatedCredential]);
        assert_eq!(result.quick_fixes, vec!["tunwright deploy"]);
    }

    #[test]
    fn test_config_drift_names_credentialed_tunnel() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.config.tunnel_id = Some(B.to_string());

        let result = diagnose(&snapshot, &config);

        assert_eq!(kinds(&result), vec![IssueKind::ConfigMismatch]);
        assert!(result.issues[0].message.contains("doesn't match"));
        assert!(result.issues[0].recommendation.contains(A));
        assert_eq!(
            result.quick_fixes,
            vec![format!("tunwright update-config --tunnel-id {A}")]
        );
    }

    #[test]
    fn test_dns_fix_uses_tunnel_id_when_known() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.dns.insert("app.example.com".to_string(), false);

        let result = diagnose(&snapshot, &config);
        assert_eq!(
            result.quick_fixes,
            vec![format!("cloudflared tunnel route dns {A} app.example.com")]
        );
    }

    #[test]
    fn test_containers_down_names_missing_container() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.containers.running = false;
        snapshot.containers.names.remove("tunnel-example-cloudflared");

        let result = diagnose(&snapshot, &config);
        assert_eq!(kinds(&result), vec![IssueKind::ContainersDown]);
        assert!(result.issues[0].message.ends_with("tunnel-example-cloudflared"));
    }

    #[test]
    fn test_duplicates_are_ambiguity() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.tunnels.push(tunnel(B, &config.tunnel.name, false));

        let result = diagnose(&snapshot, &config);
        assert_eq!(kinds(&result), vec![IssueKind::DuplicateTunnelName]);
        assert!(result.issues[0].kind.is_ambiguity());
        assert!(result.issues[0].message.contains(A));
        assert!(result.issues[0].message.contains(B));
    }

    #[test]
    fn test_missing_routing_config() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.config = Default::default();

        let result = diagnose(&snapshot, &config);
        assert_eq!(kinds(&result), vec![IssueKind::RoutingConfigMissing]);
    }

    #[test]
    fn test_warnings_do_not_change_exit_code() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.credentials.stray_files.push("notes.json".to_string());
        snapshot.pointer = Some(id(B));

        let result = diagnose(&snapshot, &config);
        assert_eq!(result.exit_code(), 0);
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings[0].contains("notes.json"));
        assert!(result.warnings[1].contains(B));
    }

    #[test]
    fn test_registry_outage_is_a_warning() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.tunnels.clear();
        snapshot.registry_error = Some(ProbeError::RegistryUnavailable("network down".into()));

        let result = diagnose(&snapshot, &config);
        assert!(result.is_healthy(), "{:?}", result.issues);
        assert!(result.warnings[0].contains("network down"));
    }
}
