//! Transport layer: WebSocket upgrade and per-connection session loop.

pub mod ws;
