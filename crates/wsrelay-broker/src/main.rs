//! wsRelay broker binary.
//!
//! - WebSocket endpoint: /ws?id=...&groupName=...
//! - Forwards frames between all sessions sharing a group
//! - Config path from the first CLI argument, default `wsrelay.yaml`

use std::net::SocketAddr;

use tracing_subscriber::{fmt, EnvFilter};

use wsrelay_broker::{config, router, state::AppState};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "wsrelay.yaml".to_string());
    let cfg = config::load_from_file(&path).expect("config load failed");
    let listen: SocketAddr = cfg
        .broker
        .listen
        .parse()
        .expect("broker.listen must be a valid SocketAddr");

    let state = AppState::new(cfg);
    let app = router::build_router(state);

    tracing::info!(%listen, "wsrelay-broker starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .expect("failed to bind");

    axum::serve(listener, app).await.expect("server failed");
}
