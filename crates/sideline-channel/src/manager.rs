use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use sideline_core::errors::ChannelError;
use sideline_core::events::{InboundEvent, OutboundCommand};
use sideline_core::ids::SessionId;
use sideline_core::session::ConnectionState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const OUTBOUND_QUEUE: usize = 64;

/// Configuration for the event-channel manager.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// WebSocket base URL, e.g. "ws://localhost:8000". The per-session path
    /// (`/ws/{session_id}`) is appended at dial time.
    pub endpoint: String,
    /// Fixed delay between reconnect attempts. No jitter or backoff.
    pub reconnect_delay: Duration,
    /// Reconnect attempts before the error turns terminal.
    pub max_reconnect_attempts: u32,
    /// Broadcast buffer for subscribers; laggards drop events.
    pub event_buffer: usize,
}

impl ChannelConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnect_delay: Duration::from_millis(3000),
            max_reconnect_attempts: 5,
            event_buffer: 256,
        }
    }
}

/// Everything a subscriber can observe from the channel, in one ordered
/// stream: lifecycle transitions, inbound detector events, and errors.
#[derive(Clone, Debug)]
pub enum ChannelEvent {
    State(ConnectionState),
    Inbound(InboundEvent),
    ConnectionError(ChannelError),
}

/// Owns the persistent duplex channel to the detector.
///
/// One logical connection at a time: `connect()` is a no-op unless the
/// channel is fully disconnected, so attempts never overlap. Abnormal
/// closures reconnect on a fixed delay up to a fixed bound; hitting the
/// bound is terminal until a manual `connect()`.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ChannelConfig,
    /// The session the next dial resolves against. Read at call time, never
    /// cached across session changes.
    binding: RwLock<Option<SessionId>>,
    lifecycle: Mutex<Lifecycle>,
    events_tx: broadcast::Sender<ChannelEvent>,
    state_tx: watch::Sender<ConnectionState>,
}

struct Lifecycle {
    state: ConnectionState,
    attempts: u32,
    /// Bumped by `connect()`/`disconnect()`; tasks carrying an older value
    /// are superseded and must not touch the lifecycle.
    generation: u64,
    closing: bool,
    last_error: Option<ChannelError>,
    outbound: Option<mpsc::Sender<Message>>,
    reconnect: Option<JoinHandle<()>>,
}

impl ChannelManager {
    pub fn new(config: ChannelConfig) -> Self {
        let (events_tx, _) = broadcast::channel(config.event_buffer);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                binding: RwLock::new(None),
                lifecycle: Mutex::new(Lifecycle {
                    state: ConnectionState::Disconnected,
                    attempts: 0,
                    generation: 0,
                    closing: false,
                    last_error: None,
                    outbound: None,
                    reconnect: None,
                }),
                events_tx,
                state_tx,
            }),
        }
    }

    /// Bind the session the channel dials. Takes effect on the next
    /// `connect()`; a live channel keeps serving the session it dialed until
    /// the caller tears it down.
    pub fn bind_session(&self, session: Option<SessionId>) {
        *self.inner.binding.write() = session;
    }

    pub fn session(&self) -> Option<SessionId> {
        self.inner.binding.read().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lifecycle.lock().state
    }

    /// Watch receiver mirroring [`ConnectionState`] transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to the ordered event stream. Events published before the
    /// call are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.events_tx.subscribe()
    }

    pub fn last_error(&self) -> Option<ChannelError> {
        self.inner.lifecycle.lock().last_error.clone()
    }

    /// Reconnect attempts consumed since the last successful open or manual
    /// `connect()`.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.lifecycle.lock().attempts
    }

    /// Establish the channel for the currently bound session.
    ///
    /// No-op while connecting or connected. A manual call resets the
    /// reconnect counter and clears any terminal error.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        let generation = {
            let mut lc = self.inner.lifecycle.lock();
            if lc.state != ConnectionState::Disconnected {
                debug!(state = ?lc.state, "connect ignored, channel not disconnected");
                return Ok(());
            }
            if let Some(timer) = lc.reconnect.take() {
                timer.abort();
            }
            lc.attempts = 0;
            lc.last_error = None;
            lc.closing = false;
            lc.generation += 1;
            set_state(&self.inner, &mut lc, ConnectionState::Connecting);
            lc.generation
        };

        dial(Arc::clone(&self.inner), generation).await
    }

    /// Request a normal closure. Cancels any pending reconnect timer.
    /// Idempotent, safe when already disconnected.
    pub fn disconnect(&self) {
        let mut lc = self.inner.lifecycle.lock();
        if let Some(timer) = lc.reconnect.take() {
            timer.abort();
        }
        lc.closing = true;
        lc.generation += 1;
        // Dropping the sender makes the socket task send a Close frame and
        // drain out on its own.
        lc.outbound = None;
        if lc.state != ConnectionState::Disconnected {
            set_state(&self.inner, &mut lc, ConnectionState::Disconnected);
            info!("channel disconnected");
        }
    }

    /// Serialize and transmit a command, only while connected.
    ///
    /// Offline commands fail immediately with no I/O and are never queued —
    /// callers that need delivery must retry after reconnecting.
    pub fn send(&self, command: &OutboundCommand) -> Result<(), ChannelError> {
        let tx = {
            let lc = self.inner.lifecycle.lock();
            if lc.state != ConnectionState::Connected {
                return Err(ChannelError::NotConnected);
            }
            lc.outbound.clone().ok_or(ChannelError::NotConnected)?
        };

        let text = serde_json::to_string(command)
            .map_err(|e| ChannelError::Transport(format!("serialize: {e}")))?;
        tx.try_send(Message::Text(text.into()))
            .map_err(|_| ChannelError::Transport("outbound queue unavailable".into()))
    }
}

fn set_state(inner: &Inner, lc: &mut Lifecycle, state: ConnectionState) {
    if lc.state == state {
        return;
    }
    lc.state = state;
    let _ = inner.state_tx.send_replace(state);
    let _ = inner.events_tx.send(ChannelEvent::State(state));
}

fn publish_error(inner: &Inner, error: ChannelError) {
    let _ = inner.events_tx.send(ChannelEvent::ConnectionError(error));
}

/// Resolve the endpoint and open the socket. Called by `connect()` and by
/// the reconnect timer; `generation` guards against superseded attempts.
async fn dial(inner: Arc<Inner>, generation: u64) -> Result<(), ChannelError> {
    let session = match inner.binding.read().clone() {
        Some(session) => session,
        None => {
            let mut lc = inner.lifecycle.lock();
            if lc.generation == generation {
                set_state(&inner, &mut lc, ConnectionState::Disconnected);
            }
            return Err(ChannelError::NoSession);
        }
    };

    let url = format!(
        "{}/ws/{}",
        inner.config.endpoint.trim_end_matches('/'),
        session
    );
    debug!(%url, "dialing event channel");

    match connect_async(&url).await {
        Ok((ws, _)) => {
            let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
            {
                let mut lc = inner.lifecycle.lock();
                if lc.generation != generation || lc.closing {
                    // Superseded while dialing; drop the socket quietly.
                    return Ok(());
                }
                lc.attempts = 0;
                lc.last_error = None;
                lc.outbound = Some(outbound_tx);
                set_state(&inner, &mut lc, ConnectionState::Connected);
            }
            info!(session = %session, "event channel connected");
            let _ = tokio::spawn(run_socket(Arc::clone(&inner), ws, outbound_rx, generation));
            Ok(())
        }
        Err(e) => {
            let error = ChannelError::Transport(e.to_string());
            warn!(%url, error = %e, "event channel dial failed");
            publish_error(&inner, error.clone());
            handle_socket_closed(&inner, generation, CloseKind::Abnormal(e.to_string()));
            Err(error)
        }
    }
}

enum CloseKind {
    Normal,
    Abnormal(String),
}

/// Pump the socket until it closes, forwarding outbound commands and
/// dispatching inbound frames in arrival order.
async fn run_socket(
    inner: Arc<Inner>,
    ws: WsStream,
    mut outbound_rx: mpsc::Receiver<Message>,
    generation: u64,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let close_kind = loop {
        tokio::select! {
            cmd = outbound_rx.recv() => match cmd {
                Some(msg) => {
                    if let Err(e) = ws_tx.send(msg).await {
                        break CloseKind::Abnormal(format!("write failed: {e}"));
                    }
                }
                None => {
                    // disconnect() dropped the sender: request normal closure.
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break CloseKind::Normal;
                }
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatch_frame(&inner, &text),
                Some(Ok(Message::Close(frame))) => {
                    let normal = frame
                        .as_ref()
                        .map(|f| f.code == CloseCode::Normal)
                        .unwrap_or(false);
                    if normal {
                        break CloseKind::Normal;
                    }
                    let reason = frame
                        .map(|f| format!("{:?}: {}", f.code, f.reason))
                        .unwrap_or_else(|| "no close frame".into());
                    break CloseKind::Abnormal(reason);
                }
                Some(Ok(_)) => {} // ping/pong/binary: nothing to dispatch
                Some(Err(e)) => {
                    // Surface the transport error; the close that follows is
                    // what consumes the reconnect attempt.
                    publish_error(&inner, ChannelError::Transport(e.to_string()));
                    break CloseKind::Abnormal(e.to_string());
                }
                None => break CloseKind::Abnormal("stream ended".into()),
            },
        }
    };

    handle_socket_closed(&inner, generation, close_kind);
}

/// Parse one inbound frame and publish it. Malformed frames and unknown
/// discriminants drop here without touching the connection.
fn dispatch_frame(inner: &Inner, text: &str) {
    match serde_json::from_str::<InboundEvent>(text) {
        Ok(event) => {
            debug!(event_type = event.event_type(), "inbound event");
            let _ = inner.events_tx.send(ChannelEvent::Inbound(event));
        }
        Err(e) => {
            warn!(error = %e, frame_len = text.len(), "dropping unparseable frame");
        }
    }
}

/// Apply close semantics: normal closures just settle to Disconnected;
/// abnormal ones consume a reconnect attempt or turn terminal at the bound.
fn handle_socket_closed(inner: &Arc<Inner>, generation: u64, kind: CloseKind) {
    let mut lc = inner.lifecycle.lock();
    if lc.generation != generation || lc.closing {
        return;
    }
    lc.outbound = None;

    match kind {
        CloseKind::Normal => {
            set_state(inner, &mut lc, ConnectionState::Disconnected);
            info!("event channel closed normally");
        }
        CloseKind::Abnormal(reason) => {
            if lc.attempts < inner.config.max_reconnect_attempts {
                lc.attempts += 1;
                set_state(inner, &mut lc, ConnectionState::Connecting);
                info!(
                    attempt = lc.attempts,
                    max = inner.config.max_reconnect_attempts,
                    delay_ms = inner.config.reconnect_delay.as_millis() as u64,
                    reason = %reason,
                    "scheduling reconnect"
                );
                let delay = inner.config.reconnect_delay;
                // Weak: a pending timer must not keep a dropped manager alive.
                let weak = Arc::downgrade(inner);
                lc.reconnect = Some(tokio::spawn(reconnect_after(weak, delay, generation)));
            } else {
                let error = ChannelError::RetriesExhausted { attempts: lc.attempts };
                warn!(attempts = lc.attempts, reason = %reason, "reconnect attempts exhausted");
                lc.last_error = Some(error.clone());
                set_state(inner, &mut lc, ConnectionState::Disconnected);
                let _ = inner
                    .events_tx
                    .send(ChannelEvent::ConnectionError(error));
            }
        }
    }
}

async fn reconnect_after(weak: Weak<Inner>, delay: Duration, generation: u64) {
    tokio::time::sleep(delay).await;

    let Some(inner) = weak.upgrade() else {
        return;
    };
    {
        let mut lc = inner.lifecycle.lock();
        if lc.generation != generation || lc.closing {
            return;
        }
        lc.reconnect = None;
    }
    // Failures re-enter handle_socket_closed and either reschedule or go
    // terminal; the returned error has no caller here.
    let _ = dial(inner, generation).await;
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(timer) = self.lifecycle.get_mut().reconnect.take() {
            timer.abort();
        }
    }
}
