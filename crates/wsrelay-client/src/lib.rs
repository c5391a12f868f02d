//! wsRelay client protocol engine.
//!
//! [`RelayClient`] owns one outbound WebSocket connection to a relay broker
//! and layers typed messaging on top of it: type-tag dispatch, correlated
//! request/reply with timeout, raw binary messages, and automatic reconnect
//! after a transport failure.
//!
//! ```no_run
//! use std::time::Duration;
//! use wsrelay_client::{ClientConfig, RelayClient};
//!
//! # #[derive(serde::Serialize, serde::Deserialize)]
//! # struct Greeting { text: String }
//! # async fn demo() -> wsrelay_core::Result<()> {
//! let client = RelayClient::new(ClientConfig::new("ws://localhost:8080/ws", "g1"));
//! client.on::<Greeting, _>("Greeting", |greeting, _reply| {
//!     println!("got: {}", greeting.text);
//! });
//! client.connect().await?;
//! client.send("Greeting", &Greeting { text: "hi".into() })?;
//! let answer: Option<bool> = client
//!     .send_and_await_reply("AreYouThere", &(), Duration::from_secs(2))
//!     .await?;
//! # let _ = answer;
//! # Ok(())
//! # }
//! ```

mod correlation;
mod dispatch;
mod engine;

pub use engine::{ClientConfig, RelayClient, ReplyToken};
