//! Axum router wiring (HTTP -> WS upgrade).
//!
//! A single `/ws` route accepts the upgrade; `id` and `groupName` query
//! parameters are required.

use axum::{routing::get, Router};

use crate::{state::AppState, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(transport::ws::ws_upgrade))
        .with_state(state)
}
