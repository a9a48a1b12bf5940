//! Verify command implementation

use anyhow::{Context, Result};

use crate::output::{format_verification, print_error, print_success};
use tw_reconcile::Engine;

/// Execute the verify command: check every endpoint once
pub async fn verify_command(engine: &Engine, json: bool) -> Result<i32> {
    let report = engine.verify().await;
    let code = if report.passed() { 0 } else { 1 };

    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("Failed to serialize verification")?;
        println!("{}", rendered);
        return Ok(code);
    }

    println!("{}", format_verification(&report));
    if report.passed() {
        print_success("All endpoints verified");
    } else {
        print_error(&format!(
            "{} of {} endpoint(s) failed",
            report.failures().count(),
            report.endpoints.len()
        ));
    }

    Ok(code)
}
