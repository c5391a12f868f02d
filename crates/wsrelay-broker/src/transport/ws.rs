//! WebSocket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS after validating `id`/`groupName` query parameters
//! - Register the session in its group (idempotent by `(group, id)`)
//! - One `select!` loop per connection: drain the session's outbound queue
//!   into the socket, and fan inbound logical messages out to the rest of
//!   the group
//! - On close or read error: remove the session, drop empty groups
//!
//! Payloads are never inspected here; frames are relayed verbatim.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use wsrelay_core::protocol::frame::{Fragment, LogicalMessage, Reassembler};
use wsrelay_core::RelayError;

use crate::group::RelayFrame;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub id: String,
    #[serde(rename = "groupName")]
    pub group_name: String,
}

pub async fn ws_upgrade(
    State(app): State<AppState>,
    ws: WebSocketUpgrade,
    query: Option<Query<WsQuery>>,
) -> Response {
    // Reject before upgrading: missing or empty route parameters get a
    // plain 400, no WebSocket handshake.
    let Some(Query(q)) = query else {
        tracing::debug!(error = %RelayError::MissingRouteParameters, "rejecting upgrade");
        return StatusCode::BAD_REQUEST.into_response();
    };
    if q.id.is_empty() || q.group_name.is_empty() {
        tracing::debug!(error = %RelayError::MissingRouteParameters, "rejecting upgrade");
        return StatusCode::BAD_REQUEST.into_response();
    }

    ws.on_upgrade(move |socket| run_session(app, q, socket))
}

async fn run_session(app: AppState, q: WsQuery, socket: WebSocket) {
    let (group, session) = app.registry().join(&q.group_name, &q.id);
    let mut drain = session.take_drain();
    let drain_owner = drain.is_some();
    tracing::info!(group = %q.group_name, session = %q.id, drain_owner, "session joined");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut reassembler = Reassembler::new(app.cfg().broker.max_message_bytes);

    loop {
        tokio::select! {
            frame = recv_outbound(&mut drain) => {
                let Some(frame) = frame else { break };
                if ws_tx.send(frame_to_message(frame)).await.is_err() {
                    break;
                }
            }

            incoming = ws_rx.next() => {
                let Some(incoming) = incoming else { break };
                let msg = match incoming {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::debug!(session = %q.id, error = %e, "read error, closing");
                        break;
                    }
                };
                match msg {
                    Message::Text(s) => {
                        if !relay(&group, &q.id, &mut reassembler, Fragment::text(s.into_bytes())) {
                            break;
                        }
                    }
                    Message::Binary(b) => {
                        if !relay(&group, &q.id, &mut reassembler, Fragment::binary(b)) {
                            break;
                        }
                    }
                    Message::Ping(payload) => {
                        let _ = ws_tx.send(Message::Pong(payload)).await;
                    }
                    Message::Pong(_) => {}
                    Message::Close(_) => break,
                }
            }
        }
    }

    // A non-owner connection piggybacks on a live session; only the drain
    // owner tears the registration down.
    if drain_owner {
        app.registry().leave(&q.group_name, &q.id);
        tracing::info!(group = %q.group_name, session = %q.id, "session left");
    }
    let _ = close(&mut ws_tx).await;
}

/// Poll the session's outbound queue, or park forever if another connection
/// owns the drain side.
async fn recv_outbound(drain: &mut Option<mpsc::Receiver<RelayFrame>>) -> Option<RelayFrame> {
    match drain {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Feed one physical frame; fan the completed message out to the group.
/// Returns false when the connection must close.
fn relay(
    group: &crate::group::Group,
    sender_id: &str,
    reassembler: &mut Reassembler,
    fragment: Fragment,
) -> bool {
    match reassembler.push(fragment) {
        Ok(Some(logical)) => {
            let frame = match logical {
                LogicalMessage::Text(s) => RelayFrame::Text(s),
                LogicalMessage::Binary(b) => RelayFrame::Binary(b),
            };
            group.fan_out(sender_id, &frame);
            true
        }
        Ok(None) => true,
        Err(RelayError::MalformedEnvelope(e)) => {
            // Invalid UTF-8 in a text message: drop the frame, keep the
            // connection.
            tracing::warn!(session = %sender_id, error = %e, "dropping undecodable text frame");
            true
        }
        Err(e) => {
            tracing::warn!(session = %sender_id, error = %e, "closing session");
            false
        }
    }
}

fn frame_to_message(frame: RelayFrame) -> Message {
    match frame {
        RelayFrame::Text(s) => Message::Text(s),
        RelayFrame::Binary(b) => Message::Binary(b.to_vec()),
    }
}

async fn close(ws_tx: &mut SplitSink<WebSocket, Message>) -> Result<(), axum::Error> {
    ws_tx.send(Message::Close(None)).await
}
