//! Progress events emitted while a deploy runs
//!
//! The engine reports one event per probe, action, settle wait and
//! endpoint check. Front-ends decide how to render them.

use crate::executor::StepReport;
use crate::settle::SettleOutcome;
use crate::verify::EndpointReport;

/// Per-line status marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Ok,
    Warn,
    Fail,
    Skip,
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Probe {
        name: &'static str,
        mark: Mark,
        detail: String,
    },
    Step(StepReport),
    Settle(SettleOutcome),
    Endpoint(EndpointReport),
}

/// Receives pipeline events as they happen
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Discard everything
impl EventSink for () {
    fn emit(&self, _event: PipelineEvent) {}
}
