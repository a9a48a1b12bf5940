//! Tunnel registry probe

use std::time::Duration;

use tw_core::config::PathsConfig;
use tw_core::error::ProbeError;
use tw_core::parser::TunnelListParser;
use tw_core::types::{CredentialState, TunnelInfo, TunnelRecord};
use tw_core::{CommandRunner, CommandSpec};

/// List the registry through the tunnel CLI.
///
/// Output interpretation is entirely delegated to `parser`.
pub async fn probe_registry(
    runner: &dyn CommandRunner,
    tool: &str,
    parser: &dyn TunnelListParser,
    timeout: Duration,
) -> Result<Vec<TunnelRecord>, ProbeError> {
    let spec = CommandSpec::new(tool, parser.list_args())
        .allow_failure()
        .suppress_output()
        .timeout(timeout);

    let result = runner.run(&spec).await;
    if !result.success {
        return Err(ProbeError::RegistryUnavailable(result.stderr.trim().to_string()));
    }

    let records = parser.parse(&result.stdout);
    tracing::debug!(
        parser = parser.version(),
        tunnels = records.len(),
        "Parsed tunnel registry"
    );
    Ok(records)
}

/// Attach local credential presence to each registry row
pub fn cross_reference(
    records: Vec<TunnelRecord>,
    credentials: &CredentialState,
    paths: &PathsConfig,
) -> Vec<TunnelInfo> {
    records
        .into_iter()
        .map(|record| {
            let has_credentials = credentials.has(&record.id);
            let credentials_path = has_credentials.then(|| paths.credential_path(&record.id));
            TunnelInfo {
                id: record.id,
                name: record.name,
                has_credentials,
                credentials_path,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tw_core::parser::TextListParserV1;
    use tw_core::{CommandResult, TunnelId};

    struct Fixed(CommandResult);

    #[async_trait]
    impl CommandRunner for Fixed {
        async fn run(&self, _spec: &CommandSpec) -> CommandResult {
            self.0.clone()
        }
    }

    const A: &str = "6ff42ae2-765d-4adf-8112-31c55c1551ef";
    const B: &str = "0a1b2c3d-0000-4000-8000-123456789abc";

    #[tokio::test]
    async fn test_registry_failure_is_probe_error() {
        let runner = Fixed(CommandResult::failed("Cannot determine default origin certificate path"));
        let err = probe_registry(&runner, "cloudflared", &TextListParserV1, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::RegistryUnavailable(msg) if msg.contains("origin certificate")));
    }

    #[tokio::test]
    async fn test_cross_reference_marks_credentials() {
        let runner = Fixed(CommandResult::ok(format!(
            "ID NAME CREATED\n{A} site 2024-01-01T00:00:00Z\n{B} site 2024-01-02T00:00:00Z\n"
        )));
        let records = probe_registry(&runner, "cloudflared", &TextListParserV1, Duration::from_secs(1))
            .await
            .unwrap();

        let mut creds = CredentialState::default();
        creds.credential_ids.insert(TunnelId::parse(A).unwrap());
        let paths = PathsConfig::default();

        let tunnels = cross_reference(records, &creds, &paths);
        assert_eq!(tunnels.len(), 2);
        assert!(tunnels[0].has_credentials);
        assert_eq!(
            tunnels[0].credentials_path,
            Some(paths.credential_path(&tunnels[0].id))
        );
        assert!(!tunnels[1].has_credentials);
        assert!(tunnels[1].credentials_path.is_none());
    }
}
