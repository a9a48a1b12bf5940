//! Public DNS probe over DNS-over-HTTPS
//!
//! Uses the JSON flavour of DoH (`application/dns-json`). The resolver is
//! independent of the tunnel registry, so a hostname may be routed in the
//! registry but not yet visible here.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;

use tw_core::config::DnsConfig;
use tw_core::types::DnsState;

/// Result of one resolver query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsLookup {
    /// Resolver status code (`0` = NOERROR); `None` when the query failed
    pub status: Option<u32>,
    /// Answer record data
    pub answers: Vec<String>,
}

impl DnsLookup {
    /// A hostname counts as resolved when the query succeeded with at least one answer
    pub fn resolved(&self) -> bool {
        self.status == Some(0) && !self.answers.is_empty()
    }
}

/// Abstraction over a public resolver
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// Query one hostname. Errors are folded into an unresolved lookup.
    async fn lookup(&self, hostname: &str) -> DnsLookup;
}

/// Resolve every hostname concurrently
pub async fn probe_dns(resolver: &dyn DnsResolver, hostnames: &[String]) -> DnsState {
    let lookups = join_all(hostnames.iter().map(|host| resolver.lookup(host))).await;

    hostnames
        .iter()
        .cloned()
        .zip(lookups.into_iter().map(|l| l.resolved()))
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DohResponse {
    status: u32,
    #[serde(default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    data: String,
}

/// JSON DoH client built on `reqwest`
#[derive(Debug, Clone)]
pub struct DohResolver {
    client: reqwest::Client,
    url: String,
    record_type: String,
    timeout: Duration,
}

impl DohResolver {
    /// Create a resolver from configuration
    pub fn new(config: &DnsConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tunwright/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: config.resolver_url.clone(),
            record_type: config.record_type.clone(),
            timeout: config.timeout,
        })
    }

    async fn query(&self, hostname: &str) -> Result<DohResponse, reqwest::Error> {
        self.client
            .get(&self.url)
            .query(&[("name", hostname), ("type", self.record_type.as_str())])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await?
            .error_for_status()?
            .json::<DohResponse>()
            .await
    }
}

#[async_trait]
impl DnsResolver for DohResolver {
    async fn lookup(&self, hostname: &str) -> DnsLookup {
        match tokio::time::timeout(self.timeout, self.query(hostname)).await {
            Ok(Ok(response)) => DnsLookup {
                status: Some(response.status),
                answers: response.answer.into_iter().map(|a| a.data).collect(),
            },
            Ok(Err(e)) => {
                tracing::debug!(hostname, error = %e, "DNS query failed");
                DnsLookup::default()
            }
            Err(_) => {
                tracing::debug!(hostname, "DNS query timed out");
                DnsLookup::default()
            }
        }
    }
}
