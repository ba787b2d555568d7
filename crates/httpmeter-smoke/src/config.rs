//! Smoke target list and retry policy (strict YAML).

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use httpmeter_core::error::{MeterError, Result};

/// One service to probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceTarget {
    pub name: String,
    pub url: String,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
}

impl ServiceTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            expected_status: default_expected_status(),
        }
    }

    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }
}

/// Fixed attempts x fixed delay. No backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Sleep between two failed attempts.
    pub delay: Duration,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmokeConfig {
    #[serde(default)]
    pub retry: RetrySection,
    pub services: Vec<ServiceTarget>,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            retry: RetrySection::default(),
            services: default_targets(),
        }
    }
}

impl SmokeConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|e| {
            MeterError::InvalidConfig(format!("read {} failed: {e}", path.display()))
        })?;
        Self::load_from_str(&s)
    }

    pub fn load_from_str(s: &str) -> Result<Self> {
        let cfg: SmokeConfig = serde_yaml::from_str(s)
            .map_err(|e| MeterError::InvalidConfig(format!("invalid yaml: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(MeterError::InvalidConfig("services must not be empty".into()));
        }
        if self.retry.attempts == 0 {
            return Err(MeterError::InvalidConfig("retry.attempts must be >= 1".into()));
        }
        if self.retry.timeout_ms == 0 {
            return Err(MeterError::InvalidConfig("retry.timeout_ms must be > 0".into()));
        }
        for svc in &self.services {
            if !(svc.url.starts_with("http://") || svc.url.starts_with("https://")) {
                return Err(MeterError::InvalidConfig(format!(
                    "service {} url must be http(s): {}",
                    svc.name, svc.url
                )));
            }
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry.attempts,
            delay: Duration::from_millis(self.retry.delay_ms),
            timeout: Duration::from_millis(self.retry.timeout_ms),
        }
    }
}

/// Local stack: backend API docs, frontend, Prometheus.
pub fn default_targets() -> Vec<ServiceTarget> {
    vec![
        ServiceTarget::new("Backend API", "http://localhost:8000/docs"),
        ServiceTarget::new("Frontend", "http://localhost:8501"),
        ServiceTarget::new("Prometheus", "http://localhost:9090"),
    ]
}

fn default_expected_status() -> u16 {
    200
}
fn default_attempts() -> u32 {
    3
}
fn default_delay_ms() -> u64 {
    2000
}
fn default_timeout_ms() -> u64 {
    5000
}
