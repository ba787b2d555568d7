//! Gateway config loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use httpmeter_core::error::{MeterError, Result};

pub use schema::{GatewayConfig, GatewaySection, MetricsSection, PathLabel};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<GatewayConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)
        .map_err(|e| MeterError::InvalidConfig(format!("read {} failed: {e}", path.display())))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| MeterError::InvalidConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
