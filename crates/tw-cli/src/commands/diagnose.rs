//! Diagnose command implementation

use anyhow::{Context, Result};

use crate::output::{format_tunnels, print_error, print_info, print_success, print_warning, TerminalSink};
use tw_reconcile::{probe_events, Engine, EventSink};

/// Execute the diagnose command
///
/// With `json`, prints the machine-readable result instead of the report.
pub async fn diagnose_command(engine: &Engine, json: bool) -> Result<i32> {
    let (snapshot, result) = engine.diagnose().await;

    if json {
        let rendered =
            serde_json::to_string_pretty(&result).context("Failed to serialize diagnosis")?;
        println!("{}", rendered);
        return Ok(result.exit_code());
    }

    for event in probe_events(&snapshot, engine.config()) {
        TerminalSink.emit(event);
    }
    println!();

    println!("Registered Tunnels:");
    println!("{}", format_tunnels(&snapshot.tunnels));
    println!();

    for warning in &result.warnings {
        print_warning(warning);
    }

    if result.is_healthy() {
        print_success("No issues found");
        return Ok(result.exit_code());
    }

    for issue in &result.issues {
        print_error(&issue.message);
        println!("  → {}", issue.recommendation);
    }

    if !result.quick_fixes.is_empty() {
        println!();
        print_info("Quick fixes:");
        for fix in &result.quick_fixes {
            println!("  {}", fix);
        }
    }

    Ok(result.exit_code())
}
