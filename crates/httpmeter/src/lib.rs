//! Top-level facade crate for httpmeter.
//!
//! Re-exports the registry, the gateway library and the smoke checks so users
//! can depend on a single crate.

pub mod core {
    pub use httpmeter_core::*;
}

pub mod gateway {
    pub use httpmeter_gateway::*;
}

pub mod smoke {
    pub use httpmeter_smoke::*;
}
