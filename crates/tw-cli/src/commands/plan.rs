//! Plan command implementation

use anyhow::Result;

use crate::output::{format_plan, print_error, print_info, print_success};
use tw_reconcile::Engine;

/// Execute the plan command: probe and print what deploy would do
pub async fn plan_command(engine: &Engine) -> Result<i32> {
    let (_, plan) = engine.plan().await;

    println!("{}", format_plan(&plan));

    for issue in &plan.issues {
        print_error(&issue.message);
        println!("  → {}", issue.recommendation);
    }

    if plan.is_converged() {
        print_success("Already converged; deploy would change nothing");
    } else if plan.issues.is_empty() {
        print_info(&format!("{} action(s) would run", plan.required().count()));
    }

    Ok(if plan.issues.is_empty() { 0 } else { 1 })
}
