//! httpmeter gateway library entry.
//!
//! Wires config, shared state, the request metrics middleware and the ops
//! endpoints into an axum router. Consumed by the binary (`main.rs`) and by
//! integration tests.

pub mod app_state;
pub mod config;
pub mod obs;
pub mod ops;
pub mod router;
