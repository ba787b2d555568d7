//! Per-service check with fixed retries.

use serde::Serialize;

use crate::config::{RetryPolicy, ServiceTarget};
use crate::probe::Probe;

/// Outcome of checking one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub service: String,
    pub url: String,
    /// Status code, when any response arrived.
    pub status: Option<u16>,
    pub success: bool,
    /// Last transport error, when no response arrived.
    pub error: Option<String>,
}

/// Probe one service.
///
/// Only transport failures are retried. A response, whatever its status, ends
/// the check: it passes iff the status equals `expected_status`.
pub async fn check_service<P>(probe: &P, target: &ServiceTarget, policy: &RetryPolicy) -> CheckResult
where
    P: Probe + ?Sized,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match probe.get(&target.url, policy.timeout).await {
            Ok(status) => {
                let success = status == target.expected_status;
                tracing::debug!(service = %target.name, status, success, "service responded");
                return CheckResult {
                    service: target.name.clone(),
                    url: target.url.clone(),
                    status: Some(status),
                    success,
                    error: None,
                };
            }
            Err(e) if attempt >= attempts => {
                tracing::warn!(service = %target.name, attempts, error = %e, "service unreachable");
                return CheckResult {
                    service: target.name.clone(),
                    url: target.url.clone(),
                    status: None,
                    success: false,
                    error: Some(e.to_string()),
                };
            }
            Err(e) => {
                tracing::debug!(service = %target.name, attempt, error = %e, "retrying");
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

/// Check every target in order.
pub async fn run_smoke_tests<P>(
    probe: &P,
    targets: &[ServiceTarget],
    policy: &RetryPolicy,
) -> Vec<CheckResult>
where
    P: Probe + ?Sized,
{
    let mut results = Vec::with_capacity(targets.len());
    for target in targets {
        results.push(check_service(probe, target, policy).await);
    }
    results
}
