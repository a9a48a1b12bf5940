//! Action executor
//!
//! Applies a [`ReconciliationPlan`] strictly in order. Later steps consume
//! the tunnel id produced by earlier ones, so nothing runs in parallel.
//!
//! Failure classes:
//! - authenticate, create, config rewrite, build/start: fatal, the run stops
//!   and the causing command's stderr is kept verbatim
//! - credential relocation: warning
//! - DNS routing: "already exists" is tolerated, anything else is a warning
//! - an action skipped for ambiguity stops the run without guessing

mod relocate;

pub use relocate::{relocate_credential, Relocation};

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tw_core::config::DeployConfig;
use tw_core::error::ActionError;
use tw_core::parser::{parse_created_id, parse_credentials_path};
use tw_core::pointer::{write_pointer, ActivePointer};
use tw_core::{CommandRunner, CommandSpec, TunnelId};

use crate::events::{EventSink, Mark, PipelineEvent};
use crate::planner::{Action, Disposition, ReconciliationPlan, TunnelRef};
use crate::probe::{id_list, probe_registry};
use crate::routing::{rewrite_routing_config, RewriteOutcome};

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    AlreadySatisfied,
    /// The command failed but the desired state is already met
    Tolerated(String),
    /// Failed without stopping the run
    Warning(String),
    /// Not attempted
    Skipped(String),
    /// Failed and stopped the run; carries the causing stderr
    Fatal(String),
}

impl ActionOutcome {
    pub fn mark(&self) -> Mark {
        match self {
            ActionOutcome::Applied | ActionOutcome::AlreadySatisfied | ActionOutcome::Tolerated(_) => {
                Mark::Ok
            }
            ActionOutcome::Warning(_) => Mark::Warn,
            ActionOutcome::Skipped(_) => Mark::Skip,
            ActionOutcome::Fatal(_) => Mark::Fail,
        }
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutcome::Applied => write!(f, "applied"),
            ActionOutcome::AlreadySatisfied => write!(f, "already satisfied"),
            ActionOutcome::Tolerated(why) => write!(f, "tolerated: {}", why),
            ActionOutcome::Warning(why) => write!(f, "warning: {}", why),
            ActionOutcome::Skipped(why) => write!(f, "skipped: {}", why),
            ActionOutcome::Fatal(stderr) => write!(f, "failed: {}", stderr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub action: Action,
    pub outcome: ActionOutcome,
    pub elapsed: Duration,
}

impl StepReport {
    pub fn label(&self) -> String {
        self.action.label()
    }
}

/// Everything the executor did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub steps: Vec<StepReport>,
    /// Tunnel the deployment now runs on
    pub tunnel_id: Option<TunnelId>,
    /// Why the run stopped early
    pub halted: Option<ActionError>,
    /// Non-step problems, e.g. the pointer file could not be written
    pub warnings: Vec<String>,
}

impl ExecutionReport {
    /// No fatal failure and no ambiguity stop
    pub fn succeeded(&self) -> bool {
        self.halted.is_none()
    }

    pub fn applied(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == ActionOutcome::Applied)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, ActionOutcome::Warning(_)))
            .count()
    }
}

/// Why a step stopped the run
enum Stop {
    Fatal(String),
    Ambiguous(String),
}

type StepResult = Result<ActionOutcome, Stop>;

/// Applies plans against the real system through a [`CommandRunner`]
pub struct ActionExecutor<'a> {
    config: &'a DeployConfig,
    runner: &'a dyn CommandRunner,
    sink: &'a dyn EventSink,
}

impl<'a> ActionExecutor<'a> {
    pub fn new(config: &'a DeployConfig, runner: &'a dyn CommandRunner, sink: &'a dyn EventSink) -> Self {
        Self {
            config,
            runner,
            sink,
        }
    }

    /// Apply every step of `plan` in order
    pub async fn execute(&self, plan: &ReconciliationPlan) -> ExecutionReport {
        let mut report = ExecutionReport {
            tunnel_id: match &plan.tunnel {
                Some(TunnelRef::Existing(id)) => Some(id.clone()),
                _ => None,
            },
            ..ExecutionReport::default()
        };

        for planned in &plan.actions {
            let started = Instant::now();
            let label = planned.action.label();

            let result = match planned.disposition {
                Disposition::AlreadySatisfied => Ok(ActionOutcome::AlreadySatisfied),
                Disposition::SkippedDueToAmbiguity => {
                    let detail = if plan.issues.is_empty() {
                        planned.reason.clone()
                    } else {
                        plan.issues
                            .iter()
                            .map(|i| i.message.as_str())
                            .collect::<Vec<_>>()
                            .join("; ")
                    };
                    Err(Stop::Ambiguous(detail))
                }
                Disposition::Required => self.apply(&planned.action, &mut report.tunnel_id).await,
            };

            let (outcome, halt) = match result {
                Ok(outcome) => (outcome, None),
                Err(Stop::Fatal(stderr)) => {
                    tracing::error!(action = %label, "{}", stderr);
                    (
                        ActionOutcome::Fatal(stderr.clone()),
                        Some(ActionError::Fatal {
                            action: label,
                            stderr,
                        }),
                    )
                }
                Err(Stop::Ambiguous(detail)) => {
                    tracing::warn!(action = %label, "Stopping on ambiguous state: {}", detail);
                    (
                        ActionOutcome::Skipped("ambiguous state".to_string()),
                        Some(ActionError::Ambiguous(detail)),
                    )
                }
            };

            if let ActionOutcome::Warning(why) = &outcome {
                tracing::warn!(action = %planned.action.label(), "{}", why);
            }

            let step = StepReport {
                action: planned.action.clone(),
                outcome,
                elapsed: started.elapsed(),
            };
            self.sink.emit(PipelineEvent::Step(step.clone()));
            report.steps.push(step);

            if halt.is_some() {
                report.halted = halt;
                return report;
            }
        }

        if let Some(id) = &report.tunnel_id {
            let pointer = ActivePointer::new(id.clone(), self.config.tunnel.name.clone());
            if let Err(e) = write_pointer(&self.config.paths.pointer_file_path(), &pointer) {
                report
                    .warnings
                    .push(format!("Could not record active tunnel: {}", e));
            }
        }

        report
    }

    async fn apply(&self, action: &Action, tunnel: &mut Option<TunnelId>) -> StepResult {
        match action {
            Action::RelocateCredential {
                source,
                destination,
            } => Ok(self.relocate(source, destination).await),
            Action::Authenticate => self.authenticate().await,
            Action::CreateTunnel { name } => {
                let (id, outcome) = self.create_tunnel(name).await?;
                *tunnel = Some(id);
                Ok(outcome)
            }
            Action::RewriteConfig { tunnel: target } => {
                let id = resolve(target, tunnel)?;
                self.rewrite_config(&id).await
            }
            Action::RouteDns {
                tunnel: target,
                hostname,
            } => {
                let id = resolve(target, tunnel)?;
                Ok(self.route_dns(&id, hostname).await)
            }
            Action::BuildAndStart { recreate } => self.build_and_start(*recreate).await,
        }
    }

    async fn relocate(&self, source: &Path, destination: &Path) -> ActionOutcome {
        match relocate_credential(source, destination).await {
            Ok(Relocation::Moved) => ActionOutcome::Applied,
            Ok(Relocation::DestinationExists) => {
                ActionOutcome::Warning(format!("{} already exists; left in place", destination.display()))
            }
            Ok(Relocation::InPlace) => ActionOutcome::AlreadySatisfied,
            Err(e) => ActionOutcome::Warning(format!("could not move {}: {}", source.display(), e)),
        }
    }

    async fn authenticate(&self) -> StepResult {
        let spec = CommandSpec::new(&self.config.tunnel.tool, ["tunnel", "login"]).interactive();
        let result = self.runner.run(&spec).await;
        if result.success {
            Ok(ActionOutcome::Applied)
        } else {
            Err(Stop::Fatal(result.stderr.trim().to_string()))
        }
    }

    async fn list_named(&self, name: &str) -> Option<Vec<TunnelId>> {
        let parser = self.config.tunnel.list_format.parser();
        let records = probe_registry(
            self.runner,
            &self.config.tunnel.tool,
            parser.as_ref(),
            self.config.timeouts.list,
        )
        .await
        .ok()?;

        Some(
            records
                .into_iter()
                .filter(|r| r.name == name)
                .map(|r| r.id)
                .collect(),
        )
    }

    async fn create_tunnel(&self, name: &str) -> Result<(TunnelId, ActionOutcome), Stop> {
        // A previous run may have created it after our probe
        if let Some(existing) = self.list_named(name).await {
            match existing.as_slice() {
                [] => {}
                [only] => {
                    tracing::info!(tunnel = %only, "Tunnel already exists");
                    return Ok((only.clone(), ActionOutcome::AlreadySatisfied));
                }
                many => {
                    return Err(Stop::Ambiguous(format!(
                        "Multiple tunnels with same name '{}': {}",
                        name,
                        id_list(many)
                    )))
                }
            }
        }

        let spec = CommandSpec::new(&self.config.tunnel.tool, ["tunnel", "create", name])
            .timeout(self.config.timeouts.create);
        let result = self.runner.run(&spec).await;
        if !result.success {
            return Err(Stop::Fatal(result.stderr.trim().to_string()));
        }

        let output = format!("{}\n{}", result.stdout, result.stderr);
        let id = match parse_created_id(&output) {
            Some(id) => id,
            None => match self.list_named(name).await.as_deref() {
                Some([only]) => only.clone(),
                _ => {
                    return Err(Stop::Fatal(format!(
                        "could not determine the id of tunnel '{}' from: {}",
                        name,
                        output.trim()
                    )))
                }
            },
        };
        tracing::info!(tunnel = %id, "Created tunnel");

        if let Some(written) = parse_credentials_path(&output) {
            let destination = self.config.paths.credential_path(&id);
            match relocate_credential(&written, &destination).await {
                Ok(Relocation::DestinationExists) => tracing::warn!(
                    path = %destination.display(),
                    "Credentials file already present; new one left at {}",
                    written.display()
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    error = %e,
                    "Could not move credentials from {}",
                    written.display()
                ),
            }
        }

        Ok((id, ActionOutcome::Applied))
    }

    async fn rewrite_config(&self, id: &TunnelId) -> StepResult {
        let credentials: PathBuf = self.config.paths.credential_path(id);
        let present = tokio::fs::try_exists(&credentials).await.unwrap_or(false);
        if !present {
            return Err(Stop::Fatal(format!(
                "no credentials for tunnel {} at {}",
                id,
                credentials.display()
            )));
        }

        let path = self.config.paths.routing_config_path();
        match rewrite_routing_config(&path, id.as_str(), &self.config.credentials_file_value(id)) {
            Ok(RewriteOutcome::Updated) => Ok(ActionOutcome::Applied),
            Ok(RewriteOutcome::Unchanged) => Ok(ActionOutcome::AlreadySatisfied),
            Err(e) => Err(Stop::Fatal(format!("{}: {}", path.display(), e))),
        }
    }

    async fn route_dns(&self, id: &TunnelId, hostname: &str) -> ActionOutcome {
        let spec = CommandSpec::new(
            &self.config.tunnel.tool,
            ["tunnel", "route", "dns", id.as_str(), hostname],
        )
        .allow_failure()
        .timeout(self.config.timeouts.route);

        let result = self.runner.run(&spec).await;
        if result.success {
            ActionOutcome::Applied
        } else if result.mentions("already exists") {
            // Record content is not compared against the tunnel
            ActionOutcome::Tolerated("record already exists".to_string())
        } else {
            ActionOutcome::Warning(result.stderr.trim().to_string())
        }
    }

    async fn build_and_start(&self, recreate: bool) -> StepResult {
        let containers = &self.config.containers;

        let build = CommandSpec::new(&containers.runtime, containers.compose(["build"]))
            .timeout(self.config.timeouts.build);
        let result = self.runner.run(&build).await;
        if !result.success {
            return Err(Stop::Fatal(result.stderr.trim().to_string()));
        }

        let mut up = vec!["up", "-d"];
        if recreate {
            up.push("--force-recreate");
        }
        let start = CommandSpec::new(&containers.runtime, containers.compose(up))
            .timeout(self.config.timeouts.start);
        let result = self.runner.run(&start).await;
        if !result.success {
            return Err(Stop::Fatal(result.stderr.trim().to_string()));
        }

        Ok(ActionOutcome::Applied)
    }
}

fn resolve(target: &TunnelRef, created: &Option<TunnelId>) -> Result<TunnelId, Stop> {
    match target {
        TunnelRef::Existing(id) => Ok(id.clone()),
        TunnelRef::Created => created.clone().ok_or_else(|| {
            Stop::Fatal(ActionError::MissingTunnelId("a step after tunnel creation".into()).to_string())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan;
    use crate::test_support::{clean_slate, config, deployed, id, tunnel, Scripted, A, B};
    use std::fs;
    use tempfile::{tempdir, TempDir};
    use tw_core::CommandResult;

    const ROUTING: &str = "tunnel: <tunnel-id>\ncredentials-file: /etc/cloudflared/credentials/<tunnel-id>.json\n";

    fn workspace() -> (TempDir, DeployConfig) {
        let dir = tempdir().unwrap();
        let mut config = config();
        config.paths.project_dir = dir.path().to_path_buf();
        fs::create_dir_all(dir.path().join("cloudflared")).unwrap();
        fs::write(dir.path().join("cloudflared/config.yml"), ROUTING).unwrap();
        (dir, config)
    }

    fn outcome_of<'r>(report: &'r ExecutionReport, prefix: &str) -> &'r ActionOutcome {
        &report
            .steps
            .iter()
            .find(|s| s.label().starts_with(prefix))
            .unwrap()
            .outcome
    }

    #[tokio::test]
    async fn test_dns_already_exists_is_tolerated() {
        let (_dir, config) = workspace();
        let mut snapshot = deployed(&config);
        snapshot.dns.insert("app.example.com".to_string(), false);
        let runner = Scripted::new().on(
            "tunnel route dns",
            CommandResult::failed("Failed to add route: code: 1003, reason: An A, AAAA, or CNAME record with that host already exists."),
        );

        let plan = plan(&snapshot, &config);
        let report = ActionExecutor::new(&config, &runner, &()).execute(&plan).await;

        assert!(report.succeeded());
        assert!(matches!(outcome_of(&report, "route dns"), ActionOutcome::Tolerated(_)));
        assert_eq!(runner.calls(), vec![format!("tunnel route dns {A} app.example.com")]);
    }

    #[tokio::test]
    async fn test_dns_failure_is_a_warning() {
        let (_dir, config) = workspace();
        let mut snapshot = deployed(&config);
        snapshot.dns.insert("app.example.com".to_string(), false);
        snapshot.containers.running = false;
        let runner = Scripted::new().on("tunnel route dns", CommandResult::failed("network unreachable"));

        let plan = plan(&snapshot, &config);
        let report = ActionExecutor::new(&config, &runner, &()).execute(&plan).await;

        assert!(report.succeeded());
        assert_eq!(
            outcome_of(&report, "route dns"),
            &ActionOutcome::Warning("network unreachable".to_string())
        );
        assert_eq!(outcome_of(&report, "build"), &ActionOutcome::Applied);
        assert_eq!(report.warning_count(), 1);
    }

    #[tokio::test]
    async fn test_build_failure_is_fatal_with_stderr() {
        let (_dir, config) = workspace();
        let mut snapshot = deployed(&config);
        snapshot.containers.running = false;
        let runner = Scripted::new().on("compose build", CommandResult::failed("no such file: Dockerfile\n"));

        let plan = plan(&snapshot, &config);
        let report = ActionExecutor::new(&config, &runner, &()).execute(&plan).await;

        assert!(!report.succeeded());
        assert_eq!(
            report.halted,
            Some(ActionError::Fatal {
                action: "build + start containers".to_string(),
                stderr: "no such file: Dockerfile".to_string(),
            })
        );
        // `up -d` never ran
        assert_eq!(runner.calls(), vec!["compose build".to_string()]);
    }

    #[tokio::test]
    async fn test_authenticate_failure_stops_everything() {
        let config = config();
        let runner = Scripted::new().on("tunnel login", CommandResult::failed("login aborted"));

        let plan = plan(&clean_slate(), &config);
        let report = ActionExecutor::new(&config, &runner, &()).execute(&plan).await;

        assert!(matches!(report.halted, Some(ActionError::Fatal { .. })));
        assert_eq!(report.steps.len(), 1);
        assert_eq!(runner.calls(), vec!["tunnel login".to_string()]);
    }

    #[tokio::test]
    async fn test_rewrite_without_credentials_is_fatal() {
        let (_dir, config) = workspace();
        let mut snapshot = deployed(&config);
        snapshot.config.tunnel_id = Some(B.to_string());

        let plan = plan(&snapshot, &config);
        let report = ActionExecutor::new(&config, &Scripted::new(), &()).execute(&plan).await;

        match &report.halted {
            Some(ActionError::Fatal { stderr, .. }) => {
                assert!(stderr.starts_with(&format!("no credentials for tunnel {A}")))
            }
            other => panic!("expected fatal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_tunnel_feeds_id_forward() {
        let (dir, config) = workspace();
        let written = dir.path().join(format!("{A}.json"));
        fs::write(&written, "{}").unwrap();

        let mut snapshot = clean_slate();
        snapshot.credentials.origin_cert_present = true;
        let created = format!(
            "Tunnel credentials written to {}. Keep this file secret.\nCreated tunnel tunnel-example with id {A}\n",
            written.display()
        );
        let runner = Scripted::new()
            .on("tunnel list", CommandResult::ok(""))
            .on("tunnel create", CommandResult::ok(created));

        let plan = plan(&snapshot, &config);
        let report = ActionExecutor::new(&config, &runner, &()).execute(&plan).await;

        assert!(report.succeeded(), "{:?}", report.halted);
        assert_eq!(report.tunnel_id, Some(id(A)));
        assert!(config.paths.credential_path(&id(A)).exists());
        assert!(!written.exists());

        let routing = fs::read_to_string(config.paths.routing_config_path()).unwrap();
        assert_eq!(
            routing,
            format!("tunnel: {A}\ncredentials-file: /etc/cloudflared/credentials/{A}.json\n")
        );

        let calls = runner.calls();
        assert!(calls.contains(&format!("tunnel route dns {A} app.example.com")));
        assert!(calls.contains(&format!("tunnel route dns {A} health.example.com")));
        assert_eq!(calls.last().unwrap(), "compose up -d");

        let pointer = tw_core::pointer::read_pointer(&config.paths.pointer_file_path())
            .unwrap()
            .unwrap();
        assert_eq!(pointer.tunnel_id, id(A));
    }

    #[tokio::test]
    async fn test_create_reuses_tunnel_found_on_relist() {
        let (_dir, config) = workspace();
        fs::create_dir_all(config.paths.credentials_dir_path()).unwrap();
        fs::write(config.paths.credential_path(&id(A)), "{}").unwrap();

        let mut snapshot = clean_slate();
        snapshot.credentials.origin_cert_present = true;
        let runner = Scripted::new().on(
            "tunnel list",
            CommandResult::ok(format!("ID NAME CREATED\n{A} tunnel-example 2024-03-01T10:00:00Z\n")),
        );

        let plan = plan(&snapshot, &config);
        let report = ActionExecutor::new(&config, &runner, &()).execute(&plan).await;

        assert!(report.succeeded(), "{:?}", report.halted);
        assert_eq!(outcome_of(&report, "create"), &ActionOutcome::AlreadySatisfied);
        assert!(!runner.calls().iter().any(|c| c.starts_with("tunnel create")));
    }

    #[tokio::test]
    async fn test_ambiguity_stops_before_tunnel_steps() {
        let config = config();
        let mut snapshot = deployed(&config);
        snapshot.tunnels.push(tunnel(B, &config.tunnel.name, false));
        snapshot.containers.running = false;
        let runner = Scripted::new();

        let plan = plan(&snapshot, &config);
        let report = ActionExecutor::new(&config, &runner, &()).execute(&plan).await;

        assert!(matches!(report.halted, Some(ActionError::Ambiguous(_))));
        assert_eq!(outcome_of(&report, "create"), &ActionOutcome::Skipped("ambiguous state".to_string()));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_converged_plan_runs_nothing() {
        let (_dir, config) = workspace();
        let runner = Scripted::new();

        let plan = plan(&deployed(&config), &config);
        let report = ActionExecutor::new(&config, &runner, &()).execute(&plan).await;

        assert!(report.succeeded());
        assert!(runner.calls().is_empty());
        assert!(report
            .steps
            .iter()
            .all(|s| s.outcome == ActionOutcome::AlreadySatisfied));
    }
}
