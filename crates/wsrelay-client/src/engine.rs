//! Client protocol engine: connection lifecycle, typed send, correlated
//! request/reply, and the receive loop.
//!
//! One engine owns one outbound connection. Handlers and pending
//! correlations live on the engine, not the socket: a reconnect replaces
//! only the socket (handlers persist, unresolved correlations simply time
//! out).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use wsrelay_core::protocol::envelope::{self, Outbound};
use wsrelay_core::protocol::frame::{Fragment, LogicalMessage, Reassembler};
use wsrelay_core::{RelayError, Result};

use crate::correlation::PendingReplies;
use crate::dispatch::HandlerRegistry;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Single-use handle for answering a received request.
///
/// Handed to a handler when the inbound envelope carried an `id`. Consumed
/// by [`RelayClient::reply_to`]; replying twice to the same request is
/// unrepresentable.
#[derive(Debug)]
pub struct ReplyToken {
    id: Uuid,
}

impl ReplyToken {
    pub(crate) fn new(id: Uuid) -> Self {
        Self { id }
    }

    /// The originating request id this token will echo as `replyId`.
    pub fn request_id(&self) -> Uuid {
        self.id
    }
}

/// Engine configuration. `session_id` defaults to a fresh UUID; keep it
/// stable across reconnects if reconnection correctness matters to you.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub session_id: String,
    pub group: String,
    /// Reassembly cap per logical message.
    pub max_message_bytes: usize,
    /// Bound of the outbound queue.
    pub queue_depth: usize,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session_id: Uuid::new_v4().to_string(),
            group: group.into(),
            max_message_bytes: 1024 * 1024,
            queue_depth: 256,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}?id={}&groupName={}",
            self.url, self.session_id, self.group
        )
    }
}

enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

struct Inner {
    cfg: ClientConfig,
    handlers: HandlerRegistry,
    pending: PendingReplies,
    /// Sender into the live connection's outbound queue; `None` while
    /// disconnected.
    out_tx: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
    disconnect_requested: AtomicBool,
    /// Wakes the receive loop for a graceful close. Out-of-band so a full
    /// outbound queue cannot swallow the close.
    shutdown: Notify,
}

/// Client protocol engine. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<Inner>,
}

impl RelayClient {
    pub fn new(cfg: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                cfg,
                handlers: HandlerRegistry::default(),
                pending: PendingReplies::default(),
                out_tx: Mutex::new(None),
                disconnect_requested: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
        }
    }

    /// Open the connection and start the receive loop.
    ///
    /// A failed attempt returns [`RelayError::Connect`] without retrying;
    /// whether to retry is the caller's decision. Calling this while a
    /// connection is already live is also a [`RelayError::Connect`]: one
    /// engine drives at most one socket.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Err(RelayError::Connect("already connected".into()));
        }
        self.inner
            .disconnect_requested
            .store(false, Ordering::SeqCst);
        Inner::connect_socket(Arc::clone(&self.inner)).await
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .out_tx
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Send a fire-and-forget typed message. No-op when not connected.
    pub fn send<T: Serialize>(&self, tag: &str, value: &T) -> Result<()> {
        let raw = to_raw(value)?;
        let text = Outbound::event(tag, &raw).encode()?;
        self.inner.queue(OutboundFrame::Text(text));
        Ok(())
    }

    /// Send raw bytes as a binary frame, bypassing the envelope codec.
    /// No-op when not connected.
    pub fn send_bytes(&self, bytes: impl Into<Vec<u8>>) {
        self.inner.queue(OutboundFrame::Binary(bytes.into()));
    }

    /// Send a request and suspend until a correlated reply arrives or
    /// `timeout` elapses.
    ///
    /// `Ok(None)` means the peer did not answer in time — a valid outcome,
    /// not an error. The correlation entry is removed on timeout, so a late
    /// reply has no observable effect.
    pub async fn send_and_await_reply<T, R>(
        &self,
        tag: &str,
        value: &T,
        timeout: Duration,
    ) -> Result<Option<R>>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let id = Uuid::new_v4();
        let raw = to_raw(value)?;
        let text = Outbound::request(id, tag, &raw).encode()?;

        let rx = self.inner.pending.register(id);
        self.inner.queue(OutboundFrame::Text(text));

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => {
                let value = serde_json::from_str(reply.get()).map_err(|e| {
                    RelayError::MalformedEnvelope(format!("reply decode failed: {e}"))
                })?;
                Ok(Some(value))
            }
            Ok(Err(_)) => {
                self.inner.pending.forget(id);
                Ok(None)
            }
            Err(_elapsed) => {
                self.inner.pending.forget(id);
                Ok(None)
            }
        }
    }

    /// Register a handler for `tag`. First registration wins, silently.
    ///
    /// The handler receives the decoded value and, when the sender expects
    /// an answer, a [`ReplyToken`] to pass to [`RelayClient::reply_to`].
    pub fn on<T, F>(&self, tag: &str, handler: F)
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T, Option<ReplyToken>) + Send + Sync + 'static,
    {
        let tag_owned = tag.to_string();
        self.inner.handlers.register_text(
            tag,
            Arc::new(move |raw: &RawValue, token| match serde_json::from_str::<T>(raw.get()) {
                Ok(value) => handler(value, token),
                Err(e) => {
                    tracing::warn!(tag = %tag_owned, error = %e, "payload decode failed, discarding")
                }
            }),
        );
    }

    /// Register the single binary handler. First registration wins.
    pub fn on_binary<F>(&self, handler: F)
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        self.inner.handlers.register_binary(Arc::new(handler));
    }

    /// Answer a received request. Consumes the token, so each request can be
    /// answered at most once.
    pub fn reply_to<T: Serialize>(&self, token: ReplyToken, tag: &str, value: &T) -> Result<()> {
        let raw = to_raw(value)?;
        let text = Outbound::reply(token.id, tag, &raw).encode()?;
        self.inner.queue(OutboundFrame::Text(text));
        Ok(())
    }

    /// Mark intent to stay disconnected, then close gracefully.
    ///
    /// The close is signalled out-of-band rather than through the outbound
    /// queue, so it goes through even when the queue is full. Best-effort;
    /// close errors are swallowed.
    pub fn disconnect(&self) {
        self.inner.disconnect_requested.store(true, Ordering::SeqCst);
        self.inner.shutdown.notify_one();
    }
}

impl Inner {
    async fn connect_socket(inner: Arc<Inner>) -> Result<()> {
        let (ws, out_rx) = Inner::dial(&inner).await?;
        tokio::spawn(Inner::supervise(inner, ws, out_rx));
        Ok(())
    }

    /// Open the socket and install a fresh outbound queue.
    async fn dial(inner: &Inner) -> Result<(WsStream, mpsc::Receiver<OutboundFrame>)> {
        let endpoint = inner.cfg.endpoint();
        let (ws, _response) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| RelayError::Connect(e.to_string()))?;
        tracing::debug!(group = %inner.cfg.group, session = %inner.cfg.session_id, "connected");

        let (out_tx, out_rx) = mpsc::channel(inner.cfg.queue_depth);
        if let Ok(mut slot) = inner.out_tx.lock() {
            *slot = Some(out_tx);
        }
        Ok((ws, out_rx))
    }

    /// Drives the receive loop and, after a transport failure the caller did
    /// not ask for, performs one immediate reconnect attempt. A failed
    /// attempt is terminal until the caller invokes `connect()` again.
    async fn supervise(
        inner: Arc<Inner>,
        mut ws: WsStream,
        mut out_rx: mpsc::Receiver<OutboundFrame>,
    ) {
        loop {
            Inner::run(&inner, ws, out_rx).await;

            if let Ok(mut slot) = inner.out_tx.lock() {
                *slot = None;
            }
            if inner.disconnect_requested.load(Ordering::SeqCst) {
                tracing::debug!("disconnect requested, receive loop terminating");
                return;
            }

            tracing::info!("connection lost, attempting reconnect");
            match Inner::dial(&inner).await {
                Ok((next_ws, next_rx)) => {
                    ws = next_ws;
                    out_rx = next_rx;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "reconnect failed, giving up");
                    return;
                }
            }
        }
    }

    /// Receive loop: drains the outbound queue and reassembles/dispatches
    /// inbound frames until the transport fails or the caller disconnects.
    async fn run(inner: &Inner, ws: WsStream, mut out_rx: mpsc::Receiver<OutboundFrame>) {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let mut reassembler = Reassembler::new(inner.cfg.max_message_bytes);

        loop {
            tokio::select! {
                maybe_out = out_rx.recv() => {
                    match maybe_out {
                        Some(OutboundFrame::Text(s)) => {
                            if ws_tx.send(Message::Text(s)).await.is_err() {
                                break;
                            }
                        }
                        Some(OutboundFrame::Binary(b)) => {
                            if ws_tx.send(Message::Binary(b)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                () = inner.shutdown.notified() => {
                    // A permit stored before this connection came up is
                    // stale once connect() has cleared the flag.
                    if inner.disconnect_requested.load(Ordering::SeqCst) {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }

                incoming = ws_rx.next() => {
                    let Some(incoming) = incoming else { break };
                    let msg = match incoming {
                        Ok(msg) => msg,
                        Err(e) => {
                            tracing::debug!(error = %e, "transport error");
                            break;
                        }
                    };
                    match msg {
                        Message::Text(s) => {
                            if !inner.handle_fragment(&mut reassembler, Fragment::text(s.into_bytes())) {
                                break;
                            }
                        }
                        Message::Binary(b) => {
                            if !inner.handle_fragment(&mut reassembler, Fragment::binary(b)) {
                                break;
                            }
                        }
                        Message::Ping(payload) => {
                            let _ = ws_tx.send(Message::Pong(payload)).await;
                        }
                        Message::Pong(_) => {}
                        Message::Frame(_) => {}
                        Message::Close(_) => break,
                    }
                }
            }
        }
    }

    /// Returns false when the connection must close.
    fn handle_fragment(&self, reassembler: &mut Reassembler, fragment: Fragment) -> bool {
        match reassembler.push(fragment) {
            Ok(Some(LogicalMessage::Text(text))) => {
                self.handle_text(&text);
                true
            }
            Ok(Some(LogicalMessage::Binary(data))) => {
                self.handlers.dispatch_binary(data);
                true
            }
            Ok(None) => true,
            Err(RelayError::MalformedEnvelope(e)) => {
                tracing::warn!(error = %e, "dropping undecodable text frame");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "fatal receive error");
                false
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let env = match envelope::decode(text) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed envelope");
                return;
            }
        };

        if let Some(reply_id) = env.reply_id {
            if !self.pending.resolve(reply_id, env.message) {
                tracing::debug!(%reply_id, "no pending request for reply, discarding");
            }
            return;
        }

        let token = env.id.map(ReplyToken::new);
        self.handlers.dispatch_text(&env.message_type, &env.message, token);
    }

    fn queue(&self, frame: OutboundFrame) {
        let tx = match self.out_tx.lock() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        match tx {
            Some(tx) => {
                if tx.try_send(frame).is_err() {
                    tracing::warn!("outbound queue full or closing, dropping frame");
                }
            }
            None => tracing::debug!("not connected, dropping outbound frame"),
        }
    }
}

fn to_raw<T: Serialize>(value: &T) -> Result<Box<RawValue>> {
    serde_json::value::to_raw_value(value)
        .map_err(|e| RelayError::Internal(format!("payload encode failed: {e}")))
}
