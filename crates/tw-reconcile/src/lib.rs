//! tw-reconcile: Reconciliation engine for tunwright
//!
//! Discovers the actual state of the tunnel deployment, plans the minimal
//! set of idempotent actions, applies them in order, and verifies the
//! public endpoints afterwards.
//!
//! Control flow:
//! - `diagnose`: probes → shared decision rules → issues and recommendations
//! - `deploy`: probes → planner → executor → settle → verification

pub mod backoff;
pub mod diagnose;
pub mod engine;
pub mod events;
pub mod executor;
pub mod planner;
pub mod probe;
pub mod routing;
pub mod settle;
pub mod verify;

#[cfg(test)]
mod test_support;

pub use diagnose::{DiagnosticResult, Issue, IssueKind};
pub use engine::{probe_events, DeployReport, Engine};
pub use events::{EventSink, Mark, PipelineEvent};
pub use executor::{ActionExecutor, ActionOutcome, ExecutionReport, StepReport};
pub use planner::{Action, Disposition, PlannedAction, ReconciliationPlan, TunnelRef};
pub use probe::{DnsResolver, DohResolver, ProbeSnapshot};
pub use settle::SettleOutcome;
pub use verify::{EndpointOutcome, EndpointReport, VerificationReport, Verifier};
