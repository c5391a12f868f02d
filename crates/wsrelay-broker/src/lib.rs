//! wsRelay broker library entry.
//!
//! The broker accepts WebSocket upgrades keyed by `(groupName, id)` query
//! parameters and forwards every complete logical message to all *other*
//! sessions in the same group. It never looks inside payloads.
//!
//! Consumed by the binary (`main.rs`) and by integration tests.

pub mod config;
pub mod group;
pub mod router;
pub mod state;
pub mod transport;
