//! Smoke tests for a deployed stack.
//!
//! GETs a fixed list of service URLs, retrying connection failures a fixed
//! number of times with a fixed delay, and reports pass/fail per service.
//! The binary exits 0 only when every service answered with its expected
//! status.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod check;
pub mod config;
pub mod probe;
pub mod report;

pub use check::{check_service, run_smoke_tests, CheckResult};
pub use config::{RetryPolicy, ServiceTarget, SmokeConfig};
pub use probe::{HttpProbe, Probe, ProbeError};
pub use report::{exit_code, render_report, Summary};
