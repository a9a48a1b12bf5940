//! Deploy command implementation

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::output::{format_steps, print_error, print_info, print_success, print_warning, TerminalSink};
use tw_reconcile::{DeployReport, Engine};

/// Execute the deploy command
///
/// Returns the process exit code: 0 only when every action succeeded and
/// every endpoint verified.
pub async fn deploy_command(engine: &Engine, cancel: &CancellationToken) -> Result<i32> {
    let config = engine.config();
    print_info(&format!(
        "Deploying tunnel '{}' for {}",
        config.tunnel.name,
        config.tunnel.hostnames.join(", ")
    ));

    let report = engine.deploy(&TerminalSink, cancel).await;
    print_summary(&report);

    Ok(report.exit_code())
}

fn print_summary(report: &DeployReport) {
    println!();
    println!("{}", format_steps(&report.execution.steps));

    for issue in &report.plan.issues {
        print_error(&issue.message);
        println!("  → {}", issue.recommendation);
    }
    for warning in &report.execution.warnings {
        print_warning(warning);
    }

    if let Some(halted) = &report.execution.halted {
        print_error(&format!("Deploy stopped: {}", halted));
        return;
    }

    let applied = report.execution.applied();
    let warnings = report.execution.warning_count();
    match (applied, warnings) {
        (0, 0) => print_success("Actions: nothing to change"),
        (n, 0) => print_success(&format!("Actions: {} applied", n)),
        (n, w) => print_warning(&format!("Actions: {} applied, {} with warnings", n, w)),
    }

    match &report.verification {
        Some(v) if v.passed() => {
            let tunnel = report
                .execution
                .tunnel_id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            print_success(&format!("Verified {} endpoint(s) on tunnel {}", v.endpoints.len(), tunnel));
        }
        Some(v) => {
            print_error(&format!(
                "Verification failed for {} of {} endpoint(s)",
                v.failures().count(),
                v.endpoints.len()
            ));
        }
        None => print_error("Verification did not run"),
    }
}
