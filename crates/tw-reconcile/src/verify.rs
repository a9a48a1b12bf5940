//! Verification engine
//!
//! One request per configured endpoint, all in flight together, each bounded
//! by its own timeout. There are no retries here; callers settle first.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;

use tw_core::config::EndpointConfig;

/// Classification of one endpoint check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EndpointOutcome {
    Success,
    WrongStatus { expected: u16, actual: u16 },
    MissingContent { expected: String },
    Timeout,
    DnsUnresolvable,
    ConnectionRefused,
    OtherError { message: String },
}

impl EndpointOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EndpointOutcome::Success)
    }
}

impl fmt::Display for EndpointOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointOutcome::Success => write!(f, "ok"),
            EndpointOutcome::WrongStatus { expected, actual } => {
                write!(f, "status {} (expected {})", actual, expected)
            }
            EndpointOutcome::MissingContent { expected } => write!(f, "missing {:?}", expected),
            EndpointOutcome::Timeout => write!(f, "timed out"),
            EndpointOutcome::DnsUnresolvable => write!(f, "hostname does not resolve"),
            EndpointOutcome::ConnectionRefused => write!(f, "connection refused"),
            EndpointOutcome::OtherError { message } => write!(f, "{}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointReport {
    pub name: String,
    pub url: String,
    pub outcome: EndpointOutcome,
    #[serde(skip)]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub endpoints: Vec<EndpointReport>,
}

impl VerificationReport {
    /// Verified only if every configured endpoint succeeded
    pub fn passed(&self) -> bool {
        !self.endpoints.is_empty() && self.endpoints.iter().all(|e| e.outcome.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &EndpointReport> {
        self.endpoints.iter().filter(|e| !e.outcome.is_success())
    }
}

/// HTTP checker for the public endpoints
#[derive(Debug, Clone)]
pub struct Verifier {
    client: reqwest::Client,
}

impl Verifier {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tunwright/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Use a preconfigured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Check every endpoint concurrently
    pub async fn verify(&self, endpoints: &[EndpointConfig]) -> VerificationReport {
        let endpoints = join_all(endpoints.iter().map(|e| self.check(e))).await;
        VerificationReport { endpoints }
    }

    /// Check one endpoint
    pub async fn check(&self, endpoint: &EndpointConfig) -> EndpointReport {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(endpoint.timeout, self.request(endpoint)).await {
            Ok(outcome) => outcome,
            Err(_) => EndpointOutcome::Timeout,
        };

        tracing::debug!(endpoint = %endpoint.name, url = %endpoint.url, %outcome, "Endpoint checked");

        EndpointReport {
            name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            outcome,
            elapsed: started.elapsed(),
        }
    }

    async fn request(&self, endpoint: &EndpointConfig) -> EndpointOutcome {
        let method = match reqwest::Method::from_bytes(endpoint.method.as_bytes()) {
            Ok(method) => method,
            Err(e) => {
                return EndpointOutcome::OtherError {
                    message: format!("invalid method {}: {}", endpoint.method, e),
                }
            }
        };

        let response = match self.client.request(method, &endpoint.url).send().await {
            Ok(response) => response,
            Err(e) => return classify_error(&e),
        };

        let actual = response.status().as_u16();
        if actual != endpoint.expected_status {
            return EndpointOutcome::WrongStatus {
                expected: endpoint.expected_status,
                actual,
            };
        }

        if let Some((name, value)) = endpoint.header_expectation() {
            let present = response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.contains(value))
                .unwrap_or(false);
            if !present {
                return EndpointOutcome::MissingContent {
                    expected: format!("{}: {}", name, value),
                };
            }
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return classify_error(&e),
        };

        match &endpoint.expect_body {
            Some(expected) if !body.contains(expected.as_str()) => EndpointOutcome::MissingContent {
                expected: expected.clone(),
            },
            _ => EndpointOutcome::Success,
        }
    }
}

/// Map a transport error onto an outcome by walking its source chain
fn classify_error(err: &reqwest::Error) -> EndpointOutcome {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = source {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::ConnectionRefused {
                return EndpointOutcome::ConnectionRefused;
            }
        }
        let text = e.to_string();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return EndpointOutcome::DnsUnresolvable;
        }
        source = e.source();
    }

    if err.is_timeout() {
        EndpointOutcome::Timeout
    } else {
        EndpointOutcome::OtherError {
            message: err.to_string(),
        }
    }
}
