//! Output formatting utilities for the CLI
//!
//! Tables for tunnels, plans, executed steps and endpoint checks, the
//! colored status-line helpers, and a [`TerminalSink`] that renders
//! pipeline progress as it happens.

use std::sync::atomic::{AtomicBool, Ordering};

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use tw_core::time::format_elapsed;
use tw_core::TunnelInfo;
use tw_reconcile::{
    EventSink, Mark, PipelineEvent, ReconciliationPlan, SettleOutcome, StepReport,
    VerificationReport,
};

/// Format the registry tunnels as an ASCII table
///
/// # Arguments
/// * `tunnels` - Registry rows cross-referenced with local credentials
///
/// # Returns
/// A formatted string suitable for terminal output, or "No tunnels registered"
/// if the list is empty.
pub fn format_tunnels(tunnels: &[TunnelInfo]) -> String {
    if tunnels.is_empty() {
        return "No tunnels registered".to_string();
    }

    #[derive(Tabled)]
    struct TunnelRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "CREDENTIALS")]
        credentials: String,
    }

    let rows: Vec<TunnelRow> = tunnels
        .iter()
        .map(|t| TunnelRow {
            id: t.id.to_string(),
            name: t.name.clone(),
            credentials: if t.has_credentials { "present" } else { "-" }.to_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format a reconciliation plan as an ASCII table
///
/// One row per step in execution order, with its disposition and the
/// reason the planner gave.
pub fn format_plan(plan: &ReconciliationPlan) -> String {
    if plan.actions.is_empty() {
        return "Nothing planned".to_string();
    }

    #[derive(Tabled)]
    struct PlanRow {
        #[tabled(rename = "#")]
        step: usize,
        #[tabled(rename = "ACTION")]
        action: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "REASON")]
        reason: String,
    }

    let rows: Vec<PlanRow> = plan
        .actions
        .iter()
        .enumerate()
        .map(|(i, a)| PlanRow {
            step: i + 1,
            action: a.action.label(),
            status: a.disposition.to_string(),
            reason: a.reason.clone(),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(110))
        .to_string()
}

/// Format executed steps as an ASCII table
pub fn format_steps(steps: &[StepReport]) -> String {
    if steps.is_empty() {
        return "No actions executed".to_string();
    }

    #[derive(Tabled)]
    struct StepRow {
        #[tabled(rename = "ACTION")]
        action: String,
        #[tabled(rename = "OUTCOME")]
        outcome: String,
        #[tabled(rename = "TIME")]
        time: String,
    }

    let rows: Vec<StepRow> = steps
        .iter()
        .map(|s| StepRow {
            action: s.label(),
            outcome: truncate(&s.outcome.to_string(), 60),
            time: format_elapsed(s.elapsed),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format endpoint checks as an ASCII table
///
/// # Arguments
/// * `report` - Result of one verification pass
///
/// # Returns
/// A formatted string, or "No endpoints checked" when nothing was configured.
pub fn format_verification(report: &VerificationReport) -> String {
    if report.endpoints.is_empty() {
        return "No endpoints checked".to_string();
    }

    #[derive(Tabled)]
    struct EndpointRow {
        #[tabled(rename = "ENDPOINT")]
        name: String,
        #[tabled(rename = "URL")]
        url: String,
        #[tabled(rename = "RESULT")]
        result: String,
        #[tabled(rename = "TIME")]
        time: String,
    }

    let rows: Vec<EndpointRow> = report
        .endpoints
        .iter()
        .map(|e| EndpointRow {
            name: e.name.clone(),
            url: e.url.clone(),
            result: e.outcome.to_string(),
            time: format_elapsed(e.elapsed),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Render a settle outcome as one line
pub fn describe_settle(outcome: &SettleOutcome) -> (Mark, String) {
    match outcome {
        SettleOutcome::Ready { attempts, elapsed } => (
            Mark::Ok,
            format!("Ready after {} check(s) in {}", attempts, format_elapsed(*elapsed)),
        ),
        SettleOutcome::TimedOut { attempts, elapsed } => (
            Mark::Warn,
            format!(
                "Not ready after {} check(s) in {}; verifying anyway",
                attempts,
                format_elapsed(*elapsed)
            ),
        ),
        SettleOutcome::Cancelled { attempts, .. } => (
            Mark::Fail,
            format!("Cancelled after {} check(s); verification skipped", attempts),
        ),
    }
}

/// Truncate a string to a maximum number of characters with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

static QUIET: AtomicBool = AtomicBool::new(false);

/// Silence every status line except errors (`--quiet`)
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed)
}

/// Print a success message in green with a checkmark prefix
///
/// Outputs to stdout with green coloring for positive feedback to the user.
pub fn print_success(msg: &str) {
    if is_quiet() {
        return;
    }
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr with red coloring for error feedback to the user.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
///
/// Outputs to stderr with yellow coloring for cautionary feedback to the user.
pub fn print_warning(msg: &str) {
    if is_quiet() {
        return;
    }
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
///
/// Outputs to stdout with cyan coloring for informational feedback to the user.
pub fn print_info(msg: &str) {
    if is_quiet() {
        return;
    }
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a skipped step in grey with a hollow bullet prefix
pub fn print_skip(msg: &str) {
    if is_quiet() {
        return;
    }
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::DarkGrey),
        Print("○ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a line with the helper matching `mark`
pub fn print_mark(mark: Mark, msg: &str) {
    match mark {
        Mark::Ok => print_success(msg),
        Mark::Warn => print_warning(msg),
        Mark::Fail => print_error(msg),
        Mark::Skip => print_skip(msg),
    }
}

/// Renders deploy progress line by line
pub struct TerminalSink;

impl EventSink for TerminalSink {
    fn emit(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::Probe { name, mark, detail } => {
                print_mark(mark, &format!("{}: {}", name, detail));
            }
            PipelineEvent::Step(step) => {
                print_mark(
                    step.outcome.mark(),
                    &format!("{} ({}, {})", step.label(), step.outcome, format_elapsed(step.elapsed)),
                );
            }
            PipelineEvent::Settle(outcome) => {
                let (mark, line) = describe_settle(&outcome);
                print_mark(mark, &line);
            }
            PipelineEvent::Endpoint(endpoint) => {
                let mark = if endpoint.outcome.is_success() {
                    Mark::Ok
                } else {
                    Mark::Fail
                };
                print_mark(mark, &format!("{} {}: {}", endpoint.name, endpoint.url, endpoint.outcome));
            }
        }
    }
}
