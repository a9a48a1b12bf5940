//! Pipeline orchestration
//!
//! Wires probes, planner, executor, settle loop and verifier together.
//! `deploy` is a single linear run: nothing it writes is read concurrently.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use tw_core::config::DeployConfig;
use tw_core::error::{ActionError, TwError};
use tw_core::pointer::read_pointer;
use tw_core::{CommandRunner, SystemRunner, TunnelId};

use crate::diagnose::{diagnose, DiagnosticResult};
use crate::events::{EventSink, Mark, PipelineEvent};
use crate::executor::{ActionExecutor, ExecutionReport};
use crate::planner::{plan, resolve_active, ReconciliationPlan};
use crate::probe::{self, probe_containers, probe_credentials, probe_dns, DnsResolver, DohResolver, ProbeSnapshot};
use crate::routing::{rewrite_routing_config, RewriteOutcome};
use crate::settle::{wait_until, SettleOutcome};
use crate::verify::{VerificationReport, Verifier};

/// Everything a deploy run produced
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub plan: ReconciliationPlan,
    pub execution: ExecutionReport,
    /// `None` when execution stopped early
    pub settle: Option<SettleOutcome>,
    /// `None` when execution stopped early or the run was cancelled
    pub verification: Option<VerificationReport>,
}

impl DeployReport {
    pub fn verified(&self) -> bool {
        self.verification.as_ref().map(|v| v.passed()).unwrap_or(false)
    }

    /// 0 only if every action succeeded and verification passed
    pub fn exit_code(&self) -> i32 {
        if self.execution.succeeded() && self.verified() {
            0
        } else {
            1
        }
    }
}

/// The reconciliation engine
#[derive(Clone)]
pub struct Engine {
    config: Arc<DeployConfig>,
    runner: Arc<dyn CommandRunner>,
    resolver: Arc<dyn DnsResolver>,
    verifier: Verifier,
}

impl Engine {
    pub fn new(
        config: DeployConfig,
        runner: Arc<dyn CommandRunner>,
        resolver: Arc<dyn DnsResolver>,
        verifier: Verifier,
    ) -> Self {
        Self {
            config: Arc::new(config),
            runner,
            resolver,
            verifier,
        }
    }

    /// Engine talking to the local system and the public resolver
    pub fn system(config: DeployConfig) -> Result<Self, reqwest::Error> {
        let resolver = DohResolver::new(&config.dns)?;
        let verifier = Verifier::new()?;
        Ok(Self::new(
            config,
            Arc::new(SystemRunner::new()),
            Arc::new(resolver),
            verifier,
        ))
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Run all probes concurrently
    pub async fn snapshot(&self) -> ProbeSnapshot {
        probe::gather(&self.config, self.runner.as_ref(), self.resolver.as_ref()).await
    }

    /// Probe and plan without applying anything
    pub async fn plan(&self) -> (ProbeSnapshot, ReconciliationPlan) {
        let snapshot = self.snapshot().await;
        let plan = plan(&snapshot, &self.config);
        (snapshot, plan)
    }

    /// Probe and report issues
    pub async fn diagnose(&self) -> (ProbeSnapshot, DiagnosticResult) {
        let snapshot = self.snapshot().await;
        let result = diagnose(&snapshot, &self.config);
        (snapshot, result)
    }

    /// Check every configured endpoint once
    pub async fn verify(&self) -> VerificationReport {
        self.verifier.verify(&self.config.effective_endpoints()).await
    }

    /// Probe, plan, apply, settle, verify
    pub async fn deploy(&self, sink: &dyn EventSink, cancel: &CancellationToken) -> DeployReport {
        let snapshot = self.snapshot().await;
        for event in probe_events(&snapshot, &self.config) {
            sink.emit(event);
        }

        let plan = plan(&snapshot, &self.config);
        tracing::info!(
            required = plan.required().count(),
            total = plan.actions.len(),
            "Plan computed"
        );

        let execution = ActionExecutor::new(&self.config, self.runner.as_ref(), sink)
            .execute(&plan)
            .await;

        if !execution.succeeded() {
            return DeployReport {
                plan,
                execution,
                settle: None,
                verification: None,
            };
        }

        let settle = wait_until(&self.config.settle, cancel, || async move { self.ready().await }).await;
        sink.emit(PipelineEvent::Settle(settle));

        let verification = match settle {
            SettleOutcome::Cancelled { .. } => None,
            SettleOutcome::TimedOut { .. } => {
                tracing::warn!("Deployment did not settle before the deadline; verifying anyway");
                Some(self.verify_with(sink).await)
            }
            SettleOutcome::Ready { .. } => Some(self.verify_with(sink).await),
        };

        DeployReport {
            plan,
            execution,
            settle: Some(settle),
            verification,
        }
    }

    async fn verify_with(&self, sink: &dyn EventSink) -> VerificationReport {
        let report = self.verify().await;
        for endpoint in &report.endpoints {
            sink.emit(PipelineEvent::Endpoint(endpoint.clone()));
        }
        report
    }

    /// Containers up and every hostname resolving
    async fn ready(&self) -> bool {
        let (containers, dns) = tokio::join!(
            probe_containers(self.runner.as_ref(), &self.config.containers, self.config.timeouts.probe),
            probe_dns(self.resolver.as_ref(), &self.config.tunnel.hostnames),
        );
        let running = containers.map(|c| c.running).unwrap_or(false);
        running && dns.values().all(|resolved| *resolved)
    }

    /// Point the routing config at `tunnel_id`, or at the active tunnel
    pub async fn update_config(&self, tunnel_id: Option<TunnelId>) -> Result<(TunnelId, RewriteOutcome), TwError> {
        let paths = &self.config.paths;
        let id = match tunnel_id {
            Some(id) => id,
            None => {
                let credentials = probe_credentials(paths).await;
                let pointer = read_pointer(&paths.pointer_file_path())
                    .ok()
                    .flatten()
                    .map(|p| p.tunnel_id);
                resolve_active(pointer.as_ref(), &credentials.credential_ids)
                    .ok_or_else(|| ActionError::MissingTunnelId("update-config".to_string()))?
            }
        };

        let credentials = paths.credential_path(&id);
        if !tokio::fs::try_exists(&credentials).await? {
            return Err(ActionError::Fatal {
                action: "update config".to_string(),
                stderr: format!("no credentials for tunnel {} at {}", id, credentials.display()),
            }
            .into());
        }

        let outcome = rewrite_routing_config(
            &paths.routing_config_path(),
            id.as_str(),
            &self.config.credentials_file_value(&id),
        )?;
        tracing::info!(tunnel = %id, ?outcome, "Routing config updated");
        Ok((id, outcome))
    }
}

/// One summary line per probe
pub fn probe_events(snapshot: &ProbeSnapshot, config: &DeployConfig) -> Vec<PipelineEvent> {
    let credentials = &snapshot.credentials;
    let cred_mark = if credentials.origin_cert_present && !credentials.credential_ids.is_empty() {
        Mark::Ok
    } else {
        Mark::Warn
    };
    let cred_detail = format!(
        "origin cert {}, {} credential file(s), {} staged",
        if credentials.origin_cert_present { "present" } else { "missing" },
        credentials.credential_ids.len(),
        credentials.staged_files.len()
    );

    let (registry_mark, registry_detail) = match &snapshot.registry_error {
        Some(e) => (Mark::Warn, e.to_string()),
        None => {
            let named = snapshot.tunnels_named(&config.tunnel.name).count();
            let mark = if named == 1 { Mark::Ok } else { Mark::Warn };
            (
                mark,
                format!("{} tunnel(s), {} named '{}'", snapshot.tunnels.len(), named, config.tunnel.name),
            )
        }
    };

    let unresolved: Vec<&String> = snapshot.unresolved(&config.tunnel.hostnames).collect();
    let (dns_mark, dns_detail) = if unresolved.is_empty() {
        (Mark::Ok, format!("{} hostname(s) resolve", config.tunnel.hostnames.len()))
    } else {
        (
            Mark::Warn,
            format!(
                "not resolving: {}",
                unresolved.iter().map(|h| h.as_str()).collect::<Vec<_>>().join(", ")
            ),
        )
    };

    let (container_mark, container_detail) = if snapshot.containers.running {
        (Mark::Ok, "both containers running".to_string())
    } else {
        (Mark::Warn, "containers not running".to_string())
    };

    let config_detail = match (snapshot.config.exists, &snapshot.config.tunnel_id) {
        (false, _) => "missing".to_string(),
        (true, Some(id)) => format!("tunnel: {}", id),
        (true, None) => "no tunnel set".to_string(),
    };
    let config_mark = if snapshot.config.exists { Mark::Ok } else { Mark::Warn };

    vec![
        PipelineEvent::Probe { name: "credentials", mark: cred_mark, detail: cred_detail },
        PipelineEvent::Probe { name: "registry", mark: registry_mark, detail: registry_detail },
        PipelineEvent::Probe { name: "dns", mark: dns_mark, detail: dns_detail },
        PipelineEvent::Probe { name: "containers", mark: container_mark, detail: container_detail },
        PipelineEvent::Probe { name: "routing config", mark: config_mark, detail: config_detail },
    ]
}
