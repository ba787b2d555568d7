use std::net::SocketAddr;

use serde::Deserialize;
use httpmeter_core::error::{MeterError, Result};
use httpmeter_core::metrics::DEFAULT_DURATION_BUCKETS;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub metrics: MetricsSection,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: 1,
            gateway: GatewaySection::default(),
            metrics: MetricsSection::default(),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MeterError::UnsupportedVersion(self.version));
        }
        self.gateway.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr().map(|_| ())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            MeterError::InvalidConfig(format!(
                "gateway.listen must be a valid SocketAddr ({}): {e}",
                self.listen
            ))
        })
    }
}

/// Paths served by the ops router besides the scrape endpoint.
const RESERVED_PATHS: [&str; 2] = ["/healthz", "/readyz"];

/// Which value goes into the `path` label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathLabel {
    /// The request's URL path, unnormalized. Every distinct dynamic segment
    /// becomes its own series.
    #[default]
    Raw,
    /// The route template the router matched (`/users/:id`), falling back to
    /// the raw path when nothing matched.
    MatchedRoute,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub path_label: PathLabel,

    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            path_label: PathLabel::default(),
            duration_buckets: default_duration_buckets(),
        }
    }
}

impl MetricsSection {
    pub fn validate(&self) -> Result<()> {
        if !self.endpoint.starts_with('/') {
            return Err(MeterError::InvalidConfig(
                "metrics.endpoint must start with '/'".into(),
            ));
        }
        if RESERVED_PATHS.contains(&self.endpoint.as_str()) {
            return Err(MeterError::InvalidConfig(format!(
                "metrics.endpoint collides with {}",
                self.endpoint
            )));
        }
        if self.duration_buckets.is_empty() {
            return Err(MeterError::InvalidConfig(
                "metrics.duration_buckets must not be empty".into(),
            ));
        }
        if self.duration_buckets.iter().any(|b| !b.is_finite() || *b < 0.0) {
            return Err(MeterError::InvalidConfig(
                "metrics.duration_buckets must be finite and non-negative".into(),
            ));
        }
        if self.duration_buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(MeterError::InvalidConfig(
                "metrics.duration_buckets must be strictly ascending".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_endpoint() -> String {
    "/metrics".into()
}
fn default_duration_buckets() -> Vec<f64> {
    DEFAULT_DURATION_BUCKETS.to_vec()
}
