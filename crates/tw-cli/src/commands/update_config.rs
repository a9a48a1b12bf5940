//! Update-config command implementation

use anyhow::{Context, Result};

use crate::output::{print_info, print_success};
use tw_core::TunnelId;
use tw_reconcile::routing::RewriteOutcome;
use tw_reconcile::Engine;

/// Point the routing config at `tunnel_id`, or at the active tunnel
pub async fn update_config_command(engine: &Engine, tunnel_id: Option<TunnelId>) -> Result<()> {
    let path = engine.config().paths.routing_config_path();
    let (id, outcome) = engine
        .update_config(tunnel_id)
        .await
        .with_context(|| format!("Failed to update {}", path.display()))?;

    match outcome {
        RewriteOutcome::Updated => {
            print_success(&format!("Routing config now points at tunnel {}", id));
            print_info("Restart the containers to pick it up: tunwright deploy");
        }
        RewriteOutcome::Unchanged => {
            print_success(&format!("Routing config already points at tunnel {}", id));
        }
    }
    Ok(())
}
