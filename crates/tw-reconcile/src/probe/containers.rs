//! Running container probe

use std::time::Duration;

use tw_core::config::ContainersConfig;
use tw_core::error::ProbeError;
use tw_core::types::ContainerState;
use tw_core::{CommandRunner, CommandSpec};

/// List running container names and check both expected ones are present.
///
/// Exact set membership: unrelated containers are tolerated and a
/// container that is starting or restarting does not count.
pub async fn probe_containers(
    runner: &dyn CommandRunner,
    config: &ContainersConfig,
    timeout: Duration,
) -> Result<ContainerState, ProbeError> {
    let spec = CommandSpec::new(&config.runtime, ["ps", "--format", "{{.Names}}"])
        .allow_failure()
        .suppress_output()
        .timeout(timeout);

    let result = runner.run(&spec).await;
    if !result.success {
        return Err(ProbeError::RuntimeUnavailable(result.stderr.trim().to_string()));
    }

    let names = result
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty());

    Ok(ContainerState::from_names(names, &config.expected()))
}
