//! Request observation.
//!
//! The middleware records into the shared `MetricRegistry`; the `/metrics`
//! handler in `ops` renders it.

pub mod middleware;

pub use middleware::{ErrorKind, HttpMetrics, HttpMetricsLayer, TypeNameKind};
