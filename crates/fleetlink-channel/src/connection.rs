//! Connection lifecycle for the push channel.
//!
//! [`PushChannel`] owns the single logical socket. One worker task drives
//! I/O; everything else talks to it through channels. An unexpected close
//! enters a fixed-delay retry loop with a bounded attempt budget; an
//! explicit [`disconnect`](PushChannel::disconnect) is terminal and cancels
//! any pending retry.

use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use fleetlink_core::{ChannelConfig, ChannelError, CredentialProvider, Envelope};

use crate::queue::OutboundQueue;
use crate::router::MessageRouter;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Connection lifecycle states. Exactly one socket is active at a time;
/// transitions follow the channel's finite state machine only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// Status events emitted on the channel's broadcast stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Socket opened. `resumed` is true when this open followed a retry.
    Open { resumed: bool },
    /// Retry scheduled after an unexpected close.
    Reconnecting { attempt: u32 },
    /// Terminal: closed by an explicit disconnect.
    Closed,
    /// Terminal: the retry budget is exhausted.
    Lost,
}

/// Why the I/O loop ended.
enum IoExit {
    Requested,
    ConnectionLost,
}

struct ChannelShared {
    config: ChannelConfig,
    credentials: Arc<dyn CredentialProvider>,
    router: MessageRouter,
    queue: Mutex<OutboundQueue>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<ChannelEvent>,
    /// Live sender into the socket task; present only while connected.
    live_tx: Mutex<Option<mpsc::Sender<Envelope>>>,
    shutdown: CancellationToken,
}

impl ChannelShared {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: ChannelEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Open a socket to the configured endpoint, attaching the current
    /// credential as a bearer Authorization header.
    async fn dial(&self) -> Result<WsStream, ChannelError> {
        let mut request = self
            .config
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::Endpoint(e.to_string()))?;

        if let Some(token) = self.credentials.current_token().await {
            let header = format!("Bearer {}", token.expose_secret());
            let value = HeaderValue::from_str(&header)
                .map_err(|e| ChannelError::Endpoint(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (socket, _response) = connect_async(request).await.map_err(classify_ws_error)?;
        Ok(socket)
    }
}

fn classify_ws_error(err: tokio_tungstenite::tungstenite::Error) -> ChannelError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match &err {
        WsError::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            ChannelError::Refused(io.to_string())
        }
        _ => ChannelError::Handshake(err.to_string()),
    }
}

/// The channel's owner-facing handle. Explicitly constructed with its
/// dependencies injected; there is no process-wide instance.
pub struct PushChannel {
    shared: Arc<ChannelShared>,
    connect_lock: tokio::sync::Mutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PushChannel {
    pub fn new(
        config: ChannelConfig,
        credentials: Arc<dyn CredentialProvider>,
        router: MessageRouter,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(64);
        let queue = Mutex::new(OutboundQueue::new(config.outbound_queue_capacity));

        Self {
            shared: Arc::new(ChannelShared {
                config,
                credentials,
                router,
                queue,
                state_tx,
                events_tx,
                live_tx: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
            connect_lock: tokio::sync::Mutex::new(()),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to connection status events.
    pub fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events_tx.subscribe()
    }

    /// The router inbound frames are published on.
    pub fn router(&self) -> &MessageRouter {
        &self.shared.router
    }

    /// Envelopes currently buffered for a future flush.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Envelopes evicted from the outbound queue since construction.
    pub fn queue_dropped(&self) -> u64 {
        self.shared.queue.lock().dropped()
    }

    /// Hand an envelope to the transport: written directly while connected,
    /// buffered otherwise. Never surfaces transport errors to the caller.
    pub fn send(&self, envelope: Envelope) {
        if self.state() == ConnectionState::Connected {
            let live = self.shared.live_tx.lock().as_ref().cloned();
            if let Some(tx) = live {
                match tx.try_send(envelope) {
                    Ok(()) => return,
                    Err(mpsc::error::TrySendError::Full(envelope))
                    | Err(mpsc::error::TrySendError::Closed(envelope)) => {
                        self.shared.queue.lock().push(envelope);
                        return;
                    }
                }
            }
        }
        self.shared.queue.lock().push(envelope);
    }

    /// Establish the connection. Idempotent: while already connected this
    /// returns immediately, and concurrent callers during an open share the
    /// same outcome. Returns `Err` only for the initial handshake failure —
    /// retries after an unexpected close never reject anyone.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        let _guard = self.connect_lock.lock().await;
        let mut state_rx = self.shared.state_tx.subscribe();

        loop {
            let state = *state_rx.borrow_and_update();
            match state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Closed => return Err(ChannelError::Closed),
                ConnectionState::Disconnected => break,
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    if state_rx.changed().await.is_err() {
                        return Err(ChannelError::Closed);
                    }
                }
            }
        }

        self.shared.set_state(ConnectionState::Connecting);
        let socket = match self.shared.dial().await {
            Ok(socket) => socket,
            Err(err) => {
                tracing::warn!(error = %err, kind = err.error_kind(), "initial handshake failed");
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(err);
            }
        };

        let shared = Arc::clone(&self.shared);
        *self.worker.lock() = Some(tokio::spawn(run_channel(shared, socket)));

        // Resolve once the worker reports the session open.
        loop {
            let state = *state_rx.borrow_and_update();
            match state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Closed => return Err(ChannelError::Closed),
                _ => {
                    if state_rx.changed().await.is_err() {
                        return Err(ChannelError::Closed);
                    }
                }
            }
        }
    }

    /// Tear the channel down. Terminal: cancels any pending retry, closes
    /// the socket, and leaves the channel in `Closed`.
    pub async fn disconnect(&self) {
        self.shared.shutdown.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        finish_closed(&self.shared);
    }
}

/// Settle into the terminal `Closed` state exactly once.
fn finish_closed(shared: &ChannelShared) {
    if *shared.state_tx.borrow() != ConnectionState::Closed {
        shared.set_state(ConnectionState::Closed);
        shared.emit(ChannelEvent::Closed);
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

/// Worker: runs one socket session at a time, re-dialing after unexpected
/// closes until the attempt budget runs out.
async fn run_channel(shared: Arc<ChannelShared>, first_socket: WsStream) {
    let mut socket = first_socket;
    let mut resumed = false;

    // Disconnect may have raced the initial dial; settle without opening.
    if shared.shutdown.is_cancelled() {
        finish_closed(&shared);
        return;
    }

    loop {
        let exit = run_io(&shared, socket, resumed).await;

        match exit {
            IoExit::Requested => {
                finish_closed(&shared);
                tracing::info!("channel closed by request");
                return;
            }
            IoExit::ConnectionLost => {
                tracing::warn!(endpoint = %shared.config.endpoint, "connection lost");
                match reconnect(&shared).await {
                    Some(next) => {
                        socket = next;
                        resumed = true;
                    }
                    None => return,
                }
            }
        }
    }
}

/// Retry loop after an unexpected close. Returns the new socket, or `None`
/// once the channel has reached a terminal state (budget exhausted or
/// disconnect requested mid-wait).
async fn reconnect(shared: &Arc<ChannelShared>) -> Option<WsStream> {
    let mut attempt = 0u32;
    loop {
        if attempt >= shared.config.max_reconnect_attempts {
            shared.set_state(ConnectionState::Closed);
            shared.emit(ChannelEvent::Lost);
            tracing::error!(attempts = attempt, "retry budget exhausted, channel lost");
            return None;
        }
        attempt += 1;

        shared.set_state(ConnectionState::Reconnecting);
        shared.emit(ChannelEvent::Reconnecting { attempt });
        tracing::warn!(attempt, delay = ?shared.config.reconnect_delay, "reconnect scheduled");

        tokio::select! {
            () = shared.shutdown.cancelled() => {
                finish_closed(shared);
                return None;
            }
            () = tokio::time::sleep(shared.config.reconnect_delay) => {}
        }

        shared.set_state(ConnectionState::Connecting);
        let dialed = tokio::select! {
            () = shared.shutdown.cancelled() => {
                finish_closed(shared);
                return None;
            }
            dialed = shared.dial() => dialed,
        };
        match dialed {
            Ok(socket) => return Some(socket),
            Err(err) => {
                tracing::warn!(attempt, error = %err, kind = err.error_kind(), "reconnect failed");
            }
        }
    }
}

/// Drive one socket session: install the live sender, flush the queue, then
/// pump outbound and inbound traffic until the session ends.
async fn run_io(shared: &Arc<ChannelShared>, socket: WsStream, resumed: bool) -> IoExit {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (live_tx, mut live_rx) = mpsc::channel::<Envelope>(shared.config.send_buffer);

    *shared.live_tx.lock() = Some(live_tx);
    shared.set_state(ConnectionState::Connected);
    shared.emit(ChannelEvent::Open { resumed });
    tracing::info!(endpoint = %shared.config.endpoint, resumed, "channel open");

    let exit = pump(shared, &mut ws_tx, &mut ws_rx, &mut live_rx).await;

    // Anything accepted for live send but not yet written goes back to the
    // queue head, in order, so it survives the reconnect.
    *shared.live_tx.lock() = None;
    live_rx.close();
    let mut unsent = Vec::new();
    while let Ok(envelope) = live_rx.try_recv() {
        unsent.push(envelope);
    }
    if !unsent.is_empty() {
        let mut queue = shared.queue.lock();
        for envelope in unsent.into_iter().rev() {
            queue.requeue_front(envelope);
        }
    }

    exit
}

async fn pump(
    shared: &Arc<ChannelShared>,
    ws_tx: &mut WsSink,
    ws_rx: &mut WsSource,
    live_rx: &mut mpsc::Receiver<Envelope>,
) -> IoExit {
    // Flush envelopes queued while disconnected, oldest first. Abort on the
    // first failure; the unsent remainder stays queued in order.
    loop {
        let queued = shared.queue.lock().pop();
        let Some(envelope) = queued else { break };
        if let Err(err) = write_envelope(ws_tx, &envelope).await {
            tracing::warn!(error = %err, "flush aborted, re-queueing unsent envelope");
            shared.queue.lock().requeue_front(envelope);
            return IoExit::ConnectionLost;
        }
    }

    loop {
        tokio::select! {
            () = shared.shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                return IoExit::Requested;
            }
            outbound = live_rx.recv() => {
                let Some(envelope) = outbound else {
                    return IoExit::ConnectionLost;
                };
                if let Err(err) = write_envelope(ws_tx, &envelope).await {
                    tracing::warn!(error = %err, "send failed, re-queueing envelope");
                    shared.queue.lock().requeue_front(envelope);
                    return IoExit::ConnectionLost;
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(envelope) => shared.router.publish(&envelope),
                            Err(err) => {
                                // One bad frame must never interrupt the stream.
                                tracing::warn!(error = %err, len = text.len(), "dropping malformed frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return IoExit::ConnectionLost,
                    Some(Ok(_)) => {} // ping/pong answered by the library, binary ignored
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "socket error");
                        return IoExit::ConnectionLost;
                    }
                }
            }
        }
    }
}

async fn write_envelope(
    ws_tx: &mut WsSink,
    envelope: &Envelope,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let json = match serde_json::to_string(envelope) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(error = %err, "failed to encode envelope, skipping");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(json.into())).await
}
