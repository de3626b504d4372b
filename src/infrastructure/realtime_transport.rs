//! Reconnecting WebSocket client for the backend push channel.
//!
//! One supervisor task owns the socket: it connects, reads frames, classifies
//! them and dispatches events to subscribers inline, so subscribers observe
//! messages in exactly the order the backend sent them. When the connection
//! drops it waits a fixed delay and tries again, up to a fixed number of
//! attempts; the counter resets on every successful handshake. After the
//! budget is spent the supervisor exits and reports a terminal error. Only an
//! explicit [`RealtimeTransport::connect`] starts it again; calling it while
//! the supervisor waits out a reconnect delay cuts the wait short.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};

use crate::domain::stream_event::{ConnectionState, EventKind, StreamEvent};
use crate::infrastructure::config::{BackendSettings, TransportSettings};
use crate::infrastructure::stream_message::{Inbound, classify};
use crate::infrastructure::subscribers::{self, SubscriberRegistry, SubscriptionId};

/// Grace period for the supervisor to send its close frame on disconnect
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub connect_timeout: Duration,
}

impl TransportConfig {
    pub fn from_settings(backend: &BackendSettings, transport: &TransportSettings) -> Self {
        Self {
            url: backend.stream_url.clone(),
            reconnect_delay: Duration::from_millis(transport.reconnect_delay_ms),
            max_reconnect_attempts: transport.max_reconnect_attempts,
            connect_timeout: Duration::from_millis(transport.connect_timeout_ms),
        }
    }
}

struct Shared {
    config: TransportConfig,
    subscribers: SubscriberRegistry,
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    fn handle_text(&self, text: &str) {
        match classify(text) {
            Ok(Inbound::Event(event)) => {
                self.subscribers.dispatch(&event);
            }
            Ok(Inbound::Ping) => trace!("backend ping"),
            Ok(Inbound::Unknown(kind)) => debug!(%kind, "dropping message of unknown type"),
            Err(e) => warn!(error = %e, "dropping malformed message"),
        }
    }
}

struct Supervisor {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
    /// Ends a pending reconnect delay early
    wake: Arc<Notify>,
}

pub struct RealtimeTransport {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<Supervisor>>,
}

enum PumpExit {
    Stopped,
    Lost(String),
}

impl RealtimeTransport {
    pub fn new(config: TransportConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                subscribers: SubscriberRegistry::new(),
                state,
                attempts: AtomicU32::new(0),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Start connecting. No-op while a connection is up or being attempted.
    /// During a reconnect delay this retries at once with a fresh budget, and
    /// after reconnects were exhausted it starts over the same way.
    pub fn connect(&self) {
        let mut supervisor = self.supervisor.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = supervisor.as_ref().filter(|s| !s.handle.is_finished()) {
            if self.state() == ConnectionState::Disconnected {
                info!(
                    attempts = self.reconnect_attempts(),
                    "connect requested during reconnect delay, retrying now"
                );
                self.shared.attempts.store(0, Ordering::SeqCst);
                running.wake.notify_one();
            } else {
                debug!(state = %self.state(), "connect ignored, supervisor already running");
            }
            return;
        }

        self.shared.attempts.store(0, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connecting);
        let (stop, stop_rx) = watch::channel(false);
        let wake = Arc::new(Notify::new());
        let handle = tokio::spawn(supervise(Arc::clone(&self.shared), stop_rx, Arc::clone(&wake)));
        *supervisor = Some(Supervisor { handle, stop, wake });
    }

    /// Close the connection. Once this returns no handler will be invoked
    /// until the next `connect`.
    pub async fn disconnect(&self) {
        let supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(Supervisor { mut handle, stop, .. }) = supervisor {
            let _ = stop.send(true);
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                warn!("stream supervisor did not stop in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
            info!("stream disconnected");
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.shared.subscribers.register(kind, subscribers::handler(handler));
        debug!(?kind, handlers = self.shared.subscribers.count(kind), "subscribed");
        id
    }

    /// Returns false when `id` was not subscribed to `kind`
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let removed = self.shared.subscribers.unregister(kind, id);
        if removed {
            debug!(?kind, handlers = self.shared.subscribers.count(kind), "unsubscribed");
        }
        removed
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Reconnect attempts made since the last successful handshake
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

impl Drop for RealtimeTransport {
    fn drop(&mut self) {
        if let Some(supervisor) = self
            .supervisor
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = supervisor.stop.send(true);
        }
    }
}

/// Resolves once a stop was requested or the transport was dropped
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

async fn supervise(shared: Arc<Shared>, mut stop: watch::Receiver<bool>, wake: Arc<Notify>) {
    let config = &shared.config;

    loop {
        shared.set_state(ConnectionState::Connecting);
        debug!(url = %config.url, "opening stream");

        let handshake = tokio::select! {
            _ = stopped(&mut stop) => return,
            result = tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str())) => result,
        };

        match handshake {
            Ok(Ok((ws, _response))) => {
                shared.attempts.store(0, Ordering::SeqCst);
                shared.set_state(ConnectionState::Connected);
                info!(url = %config.url, "stream connected");
                shared.subscribers.dispatch(&StreamEvent::Connection {
                    connected: true,
                    message: None,
                });

                match pump(&shared, ws, &mut stop).await {
                    PumpExit::Stopped => return,
                    PumpExit::Lost(reason) => {
                        warn!(%reason, "stream lost");
                        shared.set_state(ConnectionState::Disconnected);
                        shared.subscribers.dispatch(&StreamEvent::Connection {
                            connected: false,
                            message: Some(reason),
                        });
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "stream connection failed");
                shared.set_state(ConnectionState::Disconnected);
            }
            Err(_) => {
                warn!(timeout_ms = config.connect_timeout.as_millis(), "stream handshake timed out");
                shared.set_state(ConnectionState::Disconnected);
            }
        }

        let attempts = shared.attempts.load(Ordering::SeqCst);
        if attempts >= config.max_reconnect_attempts {
            error!(attempts, "reconnect attempts exhausted, giving up");
            shared.subscribers.dispatch(&StreamEvent::Error(format!(
                "stream unavailable after {} reconnect attempts",
                attempts
            )));
            return;
        }

        shared.attempts.store(attempts + 1, Ordering::SeqCst);
        info!(
            attempt = attempts + 1,
            max = config.max_reconnect_attempts,
            delay_ms = config.reconnect_delay.as_millis(),
            "scheduling reconnect"
        );

        tokio::select! {
            _ = stopped(&mut stop) => return,
            _ = wake.notified() => debug!("reconnect delay cut short"),
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }
}

async fn pump(shared: &Shared, ws: WsStream, stop: &mut watch::Receiver<bool>) -> PumpExit {
    let (mut write, mut read) = ws.split();

    loop {
        let frame = tokio::select! {
            _ = stopped(stop) => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!(error = %e, "close frame not sent");
                }
                return PumpExit::Stopped;
            }
            frame = read.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => shared.handle_text(&text),
            Some(Ok(Message::Ping(payload))) => {
                if let Err(e) = write.send(Message::Pong(payload)).await {
                    return PumpExit::Lost(format!("pong failed: {}", e));
                }
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame
                    .as_ref()
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "close frame received".to_string());
                return PumpExit::Lost(reason);
            }
            Some(Ok(Message::Binary(payload))) => {
                debug!(bytes = payload.len(), "ignoring binary frame");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return PumpExit::Lost(format!("stream error: {}", e)),
            None => return PumpExit::Lost("stream ended".to_string()),
        }
    }
}
