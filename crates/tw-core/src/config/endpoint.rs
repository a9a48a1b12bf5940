//! Verification endpoint configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration;
use crate::error::ConfigError;

/// One public endpoint the deployment must answer correctly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Label used in reports
    pub name: String,
    /// HTTP method
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Status code that counts as success
    pub expected_status: u16,
    /// Substring the body must contain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expect_body: Option<String>,
    /// `Header-Name: value-substring` the response must carry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expect_header: Option<String>,
    /// Request timeout
    #[serde(with = "duration")]
    pub timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            method: "GET".to_string(),
            url: String::new(),
            expected_status: 200,
            expect_body: None,
            expect_header: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl EndpointConfig {
    /// Default check for a routed hostname.
    ///
    /// Hostnames starting with `health.` are answered by the backend's JSON
    /// health handler; every other hostname serves the static page.
    pub fn for_hostname(host: &str) -> Self {
        let expect = if host.starts_with("health.") {
            "healthy"
        } else {
            "Hello World"
        };
        Self {
            name: host.to_string(),
            url: format!("https://{}/", host),
            expect_body: Some(expect.to_string()),
            ..Self::default()
        }
    }

    /// Split `expect_header` into name and expected value substring
    pub fn header_expectation(&self) -> Option<(&str, &str)> {
        let raw = self.expect_header.as_deref()?;
        let (name, value) = raw.split_once(':')?;
        Some((name.trim(), value.trim()))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::MissingField(format!("endpoints[{}].url", self.name)));
        }
        if self.method.is_empty() || !self.method.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::Invalid(format!(
                "endpoint {:?}: method must be an upper-case HTTP verb",
                self.name
            )));
        }
        if self.expect_header.is_some() && self.header_expectation().is_none() {
            return Err(ConfigError::Invalid(format!(
                "endpoint {:?}: expect_header must look like `Name: value`",
                self.name
            )));
        }
        Ok(())
    }
}
