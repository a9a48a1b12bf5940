//! Reconciliation planner
//!
//! A pure function of the probe snapshot and the configuration. The same
//! [`assess`] step feeds both the planner and the diagnostics reporter, so
//! the two can never disagree about what is wrong.
//!
//! Rules, in order:
//! 1. credential files left in the project root are relocated into the
//!    credentials directory, one-to-one by name, never over an existing file
//! 2. no origin certificate → authenticate
//! 3. no tunnel with the expected name → create it; one → carry its id;
//!    several → ambiguity, nothing tunnel-dependent is attempted
//! 4. exactly one registry tunnel must hold local credentials
//! 5. routing config must name that tunnel and its credentials file
//! 6. every hostname must resolve, otherwise route it
//! 7. both containers must be running, otherwise build and start them

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use tw_core::config::DeployConfig;
use tw_core::types::TunnelInfo;
use tw_core::TunnelId;

use crate::diagnose::{Issue, IssueKind};
use crate::probe::{id_list, ProbeSnapshot};

/// Which tunnel a tunnel-dependent action targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelRef {
    /// A tunnel already in the registry
    Existing(TunnelId),
    /// The tunnel produced by the create action earlier in the same plan
    Created,
}

impl fmt::Display for TunnelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelRef::Existing(id) => write!(f, "{}", id),
            TunnelRef::Created => write!(f, "<new tunnel>"),
        }
    }
}

/// One reconciliation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    RelocateCredential { source: PathBuf, destination: PathBuf },
    Authenticate,
    CreateTunnel { name: String },
    RewriteConfig { tunnel: TunnelRef },
    RouteDns { tunnel: TunnelRef, hostname: String },
    BuildAndStart { recreate: bool },
}

impl Action {
    /// Short label used in reports
    pub fn label(&self) -> String {
        match self {
            Action::RelocateCredential { source, .. } => format!(
                "relocate {}",
                source.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
            ),
            Action::Authenticate => "authenticate".to_string(),
            Action::CreateTunnel { name } => format!("create tunnel {}", name),
            Action::RewriteConfig { tunnel } => format!("rewrite config → {}", tunnel),
            Action::RouteDns { hostname, .. } => format!("route dns {}", hostname),
            Action::BuildAndStart { recreate: true } => "build + restart containers".to_string(),
            Action::BuildAndStart { recreate: false } => "build + start containers".to_string(),
        }
    }
}

/// Whether a step has to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Required,
    AlreadySatisfied,
    /// State only an operator can resolve; execution stops here
    SkippedDueToAmbiguity,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Required => write!(f, "required"),
            Disposition::AlreadySatisfied => write!(f, "satisfied"),
            Disposition::SkippedDueToAmbiguity => write!(f, "skipped (ambiguous)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub action: Action,
    pub disposition: Disposition,
    pub reason: String,
}

impl PlannedAction {
    fn new(action: Action, disposition: Disposition, reason: impl Into<String>) -> Self {
        Self {
            action,
            disposition,
            reason: reason.into(),
        }
    }
}

/// Ordered steps plus the ambiguities that block automation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub actions: Vec<PlannedAction>,
    pub issues: Vec<Issue>,
    /// Tunnel the plan converges on, unless ambiguous
    pub tunnel: Option<TunnelRef>,
}

impl ReconciliationPlan {
    /// Steps that will actually run
    pub fn required(&self) -> impl Iterator<Item = &PlannedAction> {
        self.actions
            .iter()
            .filter(|a| a.disposition == Disposition::Required)
    }

    /// Nothing to do and nothing blocking
    pub fn is_converged(&self) -> bool {
        self.issues.is_empty()
            && self
                .actions
                .iter()
                .all(|a| a.disposition == Disposition::AlreadySatisfied)
    }
}

/// How rule 3 resolved the expected tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelResolution {
    /// No tunnel with the name; one will be created
    Missing,
    /// Exactly one tunnel with the name
    Unique(TunnelInfo),
    /// Registry unavailable, tunnel taken from local state
    FromLocal(TunnelId),
    /// Several tunnels share the name
    Duplicate(Vec<TunnelId>),
}

/// How rule 4 resolved the credentialed tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialResolution {
    /// The tunnel to be created will own the only credentials
    Pending,
    /// Exactly one credentialed tunnel, and it is the expected one
    Unique(TunnelId),
    /// The expected tunnel exists but nothing local authenticates it
    Missing,
    /// More than one registry tunnel has local credentials
    Multiple(Vec<TunnelId>),
    /// The only credentials belong to a different tunnel
    OtherTunnel(TunnelId),
    /// Rule 3 was ambiguous, so rule 4 was not evaluated
    Unresolved,
}

/// Output of the shared decision rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub tunnel: TunnelResolution,
    pub credentials: CredentialResolution,
    /// Credential ids present once staged files are relocated
    pub effective_credentials: BTreeSet<TunnelId>,
    /// Pointer if it names a present credential, else the single credential file
    pub active_tunnel: Option<TunnelId>,
}

impl Assessment {
    /// The tunnel whose id the routing config must carry, if unambiguous
    pub fn config_target(&self) -> Option<TunnelRef> {
        match (&self.tunnel, &self.credentials) {
            (TunnelResolution::Missing, CredentialResolution::Pending) => Some(TunnelRef::Created),
            (_, CredentialResolution::Unique(id)) => Some(TunnelRef::Existing(id.clone())),
            _ => None,
        }
    }

    /// The tunnel DNS routes must point at, if unambiguous
    pub fn route_target(&self) -> Option<TunnelRef> {
        match &self.tunnel {
            TunnelResolution::Missing => Some(TunnelRef::Created),
            TunnelResolution::Unique(info) => Some(TunnelRef::Existing(info.id.clone())),
            TunnelResolution::FromLocal(id) => Some(TunnelRef::Existing(id.clone())),
            TunnelResolution::Duplicate(_) => None,
        }
    }

    /// Ambiguities raised by rules 3 and 4
    pub fn ambiguities(&self, config: &DeployConfig) -> Vec<Issue> {
        let name = &config.tunnel.name;
        let mut issues = Vec::new();

        if let TunnelResolution::Duplicate(ids) = &self.tunnel {
            issues.push(Issue::new(
                IssueKind::DuplicateTunnelName,
                format!(
                    "Multiple tunnels with same name '{}': {}",
                    name,
                    id_list(ids)
                ),
                format!(
                    "Delete the extra tunnels with `{} tunnel delete <id>` so exactly one '{}' remains",
                    config.tunnel.tool, name
                ),
            ));
        }

        match &self.credentials {
            CredentialResolution::Missing => issues.push(Issue::new(
                IssueKind::NoCredentials,
                format!("No tunnel has credentials in {}", config.paths.credentials_dir.display()),
                format!(
                    "Recover the credentials file for '{}' into {} or delete and recreate the tunnel",
                    name,
                    config.paths.credentials_dir.display()
                ),
            )),
            CredentialResolution::Multiple(ids) => {
                let hint = match &self.active_tunnel {
                    Some(active) => format!(" (the active pointer names {})", active),
                    None => String::new(),
                };
                issues.push(Issue::new(
                    IssueKind::MultipleCredentials,
                    format!("Multiple tunnels have credentials: {}", id_list(ids)),
                    format!(
                        "Keep only the credentials file of the tunnel in use{} and move the others out of {}",
                        hint,
                        config.paths.credentials_dir.display()
                    ),
                ));
            }
            CredentialResolution::OtherTunnel(id) => issues.push(Issue::new(
                IssueKind::CredentialsForOtherTunnel,
                format!("Local credentials belong to tunnel {}, not to '{}'", id, name),
                format!(
                    "Recover the credentials file for '{}' or rename tunnel {} in the configuration",
                    name, id
                ),
            )),
            _ => {}
        }

        issues
    }
}

/// The tunnel the deployment is running on, as far as local state tells.
///
/// The pointer wins if it names a present credential file; otherwise a
/// single credential file decides. Anything else is unresolved.
pub fn resolve_active(pointer: Option<&TunnelId>, credentials: &BTreeSet<TunnelId>) -> Option<TunnelId> {
    match pointer {
        Some(id) if credentials.contains(id) => Some(id.clone()),
        _ if credentials.len() == 1 => credentials.iter().next().cloned(),
        _ => None,
    }
}

/// Apply rules 1, 3 and 4 to a snapshot
pub fn assess(snapshot: &ProbeSnapshot, config: &DeployConfig) -> Assessment {
    let mut effective_credentials = snapshot.credentials.credential_ids.clone();
    effective_credentials.extend(
        snapshot
            .credentials
            .staged_files
            .iter()
            .filter_map(|p| p.file_name())
            .filter_map(|n| TunnelId::from_credential_file_name(&n.to_string_lossy())),
    );

    let active_tunnel = resolve_active(snapshot.pointer.as_ref(), &effective_credentials);

    let named: Vec<&TunnelInfo> = snapshot.tunnels_named(&config.tunnel.name).collect();
    let tunnel = match named.as_slice() {
        [] => match (&snapshot.registry_error, &active_tunnel) {
            (Some(_), Some(id)) => TunnelResolution::FromLocal(id.clone()),
            _ => TunnelResolution::Missing,
        },
        [only] => TunnelResolution::Unique((*only).clone()),
        many => TunnelResolution::Duplicate(many.iter().map(|t| t.id.clone()).collect()),
    };

    let credentialed: Vec<TunnelId> = snapshot
        .tunnels
        .iter()
        .filter(|t| effective_credentials.contains(&t.id))
        .map(|t| t.id.clone())
        .collect();

    let credentials = match &tunnel {
        TunnelResolution::Missing => CredentialResolution::Pending,
        TunnelResolution::Duplicate(_) => CredentialResolution::Unresolved,
        TunnelResolution::FromLocal(id) => CredentialResolution::Unique(id.clone()),
        TunnelResolution::Unique(info) => match credentialed.as_slice() {
            [] => CredentialResolution::Missing,
            [only] if *only == info.id => CredentialResolution::Unique(only.clone()),
            [only] => CredentialResolution::OtherTunnel(only.clone()),
            many => CredentialResolution::Multiple(many.to_vec()),
        },
    };

    Assessment {
        tunnel,
        credentials,
        effective_credentials,
        active_tunnel,
    }
}

/// Compute the reconciliation plan
pub fn plan(snapshot: &ProbeSnapshot, config: &DeployConfig) -> ReconciliationPlan {
    use Disposition::*;

    let assessment = assess(snapshot, config);
    let mut actions = Vec::new();

    // Rule 1
    for source in &snapshot.credentials.staged_files {
        let Some(file_name) = source.file_name() else {
            continue;
        };
        let destination = config.paths.credentials_dir_path().join(file_name);
        let already = TunnelId::from_credential_file_name(&file_name.to_string_lossy())
            .map(|id| snapshot.credentials.has(&id))
            .unwrap_or(false);
        let (disposition, reason) = if already {
            (AlreadySatisfied, "destination already exists; never overwritten")
        } else {
            (Required, "credential file not yet in the credentials directory")
        };
        actions.push(PlannedAction::new(
            Action::RelocateCredential {
                source: source.clone(),
                destination,
            },
            disposition,
            reason,
        ));
    }

    // Rule 2
    actions.push(if snapshot.credentials.origin_cert_present {
        PlannedAction::new(Action::Authenticate, AlreadySatisfied, "origin certificate present")
    } else {
        PlannedAction::new(Action::Authenticate, Required, "origin certificate missing")
    });

    // Rule 3
    let create = Action::CreateTunnel {
        name: config.tunnel.name.clone(),
    };
    actions.push(match &assessment.tunnel {
        TunnelResolution::Missing => PlannedAction::new(create, Required, "no tunnel with this name"),
        TunnelResolution::Unique(info) => {
            PlannedAction::new(create, AlreadySatisfied, format!("exists as {}", info.id))
        }
        TunnelResolution::FromLocal(id) => PlannedAction::new(
            create,
            AlreadySatisfied,
            format!("registry unavailable; using local tunnel {}", id),
        ),
        TunnelResolution::Duplicate(ids) => PlannedAction::new(
            create,
            SkippedDueToAmbiguity,
            format!("{} tunnels share this name", ids.len()),
        ),
    });

    // Rules 4 and 5
    let config_target = assessment.config_target();
    let rewrite = match &config_target {
        Some(TunnelRef::Created) => PlannedAction::new(
            Action::RewriteConfig {
                tunnel: TunnelRef::Created,
            },
            Required,
            "config must name the new tunnel",
        ),
        Some(TunnelRef::Existing(id)) => {
            let expected_creds = config.credentials_file_value(id);
            let matches = snapshot.config.tunnel_id.as_deref() == Some(id.as_str())
                && snapshot.config.credentials_file.as_deref() == Some(expected_creds.as_str());
            if matches {
                PlannedAction::new(
                    Action::RewriteConfig {
                        tunnel: TunnelRef::Existing(id.clone()),
                    },
                    AlreadySatisfied,
                    "config names the credentialed tunnel",
                )
            } else {
                PlannedAction::new(
                    Action::RewriteConfig {
                        tunnel: TunnelRef::Existing(id.clone()),
                    },
                    Required,
                    format!(
                        "config names {}",
                        snapshot.config.tunnel_id.as_deref().unwrap_or("nothing")
                    ),
                )
            }
        }
        None => PlannedAction::new(
            Action::RewriteConfig {
                tunnel: TunnelRef::Created,
            },
            SkippedDueToAmbiguity,
            "no unique credentialed tunnel",
        ),
    };
    let rewrite_required = rewrite.disposition == Required;
    actions.push(rewrite);

    // Rule 6
    let route_target = assessment.route_target();
    for hostname in &config.tunnel.hostnames {
        let resolved = snapshot.dns.get(hostname).copied().unwrap_or(false);
        let planned = match &route_target {
            Some(tunnel) => {
                let action = Action::RouteDns {
                    tunnel: tunnel.clone(),
                    hostname: hostname.clone(),
                };
                if resolved {
                    PlannedAction::new(action, AlreadySatisfied, "hostname resolves")
                } else {
                    PlannedAction::new(action, Required, "hostname does not resolve")
                }
            }
            None => PlannedAction::new(
                Action::RouteDns {
                    tunnel: TunnelRef::Created,
                    hostname: hostname.clone(),
                },
                SkippedDueToAmbiguity,
                "tunnel is ambiguous",
            ),
        };
        actions.push(planned);
    }

    // Rule 7
    let running = snapshot.containers.running;
    actions.push(match (running, rewrite_required) {
        (false, _) => PlannedAction::new(
            Action::BuildAndStart { recreate: false },
            Required,
            "containers not running",
        ),
        (true, true) => PlannedAction::new(
            Action::BuildAndStart { recreate: true },
            Required,
            "routing config changes; daemon must restart",
        ),
        (true, false) => PlannedAction::new(
            Action::BuildAndStart { recreate: false },
            AlreadySatisfied,
            "both containers running",
        ),
    });

    ReconciliationPlan {
        actions,
        issues: assessment.ambiguities(config),
        tunnel: route_target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{clean_slate, config, deployed, id, tunnel, A, B};
    use std::path::Path;

    fn required_kinds(plan: &ReconciliationPlan) -> Vec<String> {
        plan.required().map(|a| a.action.label()).collect()
    }

    #[test]
    fn test_clean_slate_plan() {
        let config = config();
        let plan = plan(&clean_slate(), &config);

        assert!(plan.issues.is_empty());
        let required: Vec<&Action> = plan.required().map(|a| &a.action).collect();
        assert_eq!(
            required,
            vec![
                &Action::Authenticate,
                &Action::CreateTunnel {
                    name: config.tunnel.name.clone()
                },
                &Action::RewriteConfig {
                    tunnel: TunnelRef::Created
                },
                &Action::RouteDns {
                    tunnel: TunnelRef::Created,
                    hostname: "app.example.com".to_string()
                },
                &Action::RouteDns {
                    tunnel: TunnelRef::Created,
                    hostname: "health.example.com".to_string()
                },
                &Action::BuildAndStart { recreate: false },
            ]
        );
    }

    #[test]
    fn test_fully_deployed_is_converged() {
        let config = config();
        let plan = plan(&deployed(&config), &config);

        assert!(plan.is_converged(), "{:?}", required_kinds(&plan));
        assert_eq!(plan.required().count(), 0);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.dns.insert("health.example.com".to_string(), false);
        snapshot.config.tunnel_id = Some(B.to_string());

        assert_eq!(plan(&snapshot, &config), plan(&snapshot, &config));
    }

    #[test]
    fn test_duplicate_names_are_never_resolved() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.tunnels.push(tunnel(B, &config.tunnel.name, false));

        let plan = plan(&snapshot, &config);

        assert_eq!(plan.issues.len(), 1);
        assert_eq!(plan.issues[0].kind, IssueKind::DuplicateTunnelName);
        for planned in &plan.actions {
            match &planned.action {
                Action::CreateTunnel { .. } | Action::RewriteConfig { .. } | Action::RouteDns { .. } => {
                    assert_eq!(planned.disposition, Disposition::SkippedDueToAmbiguity);
                }
                _ => {}
            }
            // Neither duplicate is ever selected as the target
            if let Action::RouteDns { tunnel, .. } | Action::RewriteConfig { tunnel } = &planned.action {
                assert_eq!(tunnel, &TunnelRef::Created);
            }
        }
    }

    #[test]
    fn test_multiple_credentialed_tunnels_block_config() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.tunnels.push(tunnel(B, "other", true));
        snapshot.credentials.credential_ids.insert(id(B));

        let plan = plan(&snapshot, &config);

        assert_eq!(plan.issues.len(), 1);
        assert_eq!(plan.issues[0].kind, IssueKind::MultipleCredentials);
        let rewrite = plan
            .actions
            .iter()
            .find(|a| matches!(a.action, Action::RewriteConfig { .. }))
            .unwrap();
        assert_eq!(rewrite.disposition, Disposition::SkippedDueToAmbiguity);
    }

    #[test]
    fn test_no_credentials_is_an_issue() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.credentials.credential_ids.clear();
        snapshot.tunnels[0].has_credentials = false;

        let plan = plan(&snapshot, &config);
        assert_eq!(plan.issues[0].kind, IssueKind::NoCredentials);
    }

    #[test]
    fn test_config_drift_requires_rewrite_and_restart() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.config.tunnel_id = Some(B.to_string());

        let plan = plan(&snapshot, &config);

        assert!(plan.issues.is_empty());
        assert_eq!(
            required_kinds(&plan),
            vec![format!("rewrite config → {}", A), "build + restart containers".to_string()]
        );
    }

    #[test]
    fn test_staged_file_is_relocated_and_counts_as_credentials() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.credentials.credential_ids.clear();
        snapshot.credentials.staged_files = vec![Path::new("/srv/site").join(format!("{A}.json"))];

        let plan = plan(&snapshot, &config);

        assert!(plan.issues.is_empty());
        let first = &plan.actions[0];
        assert_eq!(first.disposition, Disposition::Required);
        assert_eq!(
            first.action,
            Action::RelocateCredential {
                source: PathBuf::from(format!("/srv/site/{A}.json")),
                destination: PathBuf::from(format!("/srv/site/cloudflared/credentials/{A}.json")),
            }
        );
    }

    #[test]
    fn test_staged_file_never_overwrites() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.credentials.staged_files = vec![PathBuf::from(format!("/srv/site/{A}.json"))];

        let plan = plan(&snapshot, &config);
        assert_eq!(plan.actions[0].disposition, Disposition::AlreadySatisfied);
    }

    #[test]
    fn test_registry_outage_uses_pointer() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.tunnels.clear();
        snapshot.registry_error = Some(tw_core::error::ProbeError::RegistryUnavailable("offline".into()));
        snapshot.pointer = Some(id(A));

        let plan = plan(&snapshot, &config);

        assert!(plan.is_converged(), "{:?}", required_kinds(&plan));
    }

    #[test]
    fn test_pointer_to_missing_credentials_is_ignored() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.pointer = Some(id(B));

        let assessment = assess(&snapshot, &config);
        assert_eq!(assessment.active_tunnel, Some(id(A)));
    }
}
