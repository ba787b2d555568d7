//! httpmeter core: the metric registry, label tuples, and the error surface
//! shared by the gateway and the smoke tool.
//!
//! This crate carries no transport or runtime dependencies. The registry is a
//! plain value: construct it once at startup, wrap it in an `Arc`, and hand
//! clones of that handle to whoever records or renders.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Recording a sample
//! never fails; everything else surfaces as `MeterError`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod labels;
pub mod metrics;

pub use error::{ErrorCode, MeterError, Result};
pub use labels::Labels;
pub use metrics::{CounterId, GaugeId, HistogramId, HistogramSnapshot, MetricRegistry};
