//! The one network operation the smoke tool needs: GET a URL, return its
//! status code.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use httpmeter_core::error::{MeterError, Result};

/// The request never produced a response (connect failure, timeout, ...).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ProbeError(pub String);

#[async_trait]
pub trait Probe: Send + Sync {
    /// GET `url` and return the response status.
    async fn get(&self, url: &str, timeout: Duration) -> std::result::Result<u16, ProbeError>;
}

/// `reqwest`-backed probe.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| MeterError::Internal(format!("http client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn get(&self, url: &str, timeout: Duration) -> std::result::Result<u16, ProbeError> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ProbeError(e.to_string()))?;
        Ok(resp.status().as_u16())
    }
}
