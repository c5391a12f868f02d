//! Top-level facade crate for wsRelay.
//!
//! Re-exports the core protocol types, the broker library, and the client
//! engine so users can depend on a single crate.

pub mod core {
    pub use wsrelay_core::*;
}

pub mod broker {
    pub use wsrelay_broker::*;
}

pub mod client {
    pub use wsrelay_client::*;
}
