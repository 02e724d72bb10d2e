use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{ClientError, RemoteError};
use crate::protocol::{ClientFrame, Route, ServerFrame, SubscriptionId, SubscriptionQuery};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Hook = Arc<dyn Fn() + Send + Sync>;
type Delivery = Result<Patch, RemoteError>;

/// Upper bound on waiting for the server's close reply during shutdown.
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

// ═══════════════════════════════════════════════════════════════
//  Public types
// ═══════════════════════════════════════════════════════════════

/// Result delivery for a subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub id: SubscriptionId,
    /// Payload as sent by the server (key order and numerals preserved).
    pub result: Value,
}

/// Handle of an active subscription.
///
/// Resolves at most once: only the first server delivery for this id is
/// observed. Later deliveries on the same id are dropped.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: oneshot::Receiver<Delivery>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the first delivery. No timeout: pending for as long as the
    /// session stays open and the server stays silent.
    pub async fn patch(self) -> Result<Patch, ClientError> {
        let Self { id, rx } = self;
        match rx.await {
            Ok(Ok(patch)) => Ok(patch),
            Ok(Err(remote)) => Err(ClientError::Remote(remote)),
            Err(_) => Err(ClientError::Disconnected(id)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Shared state (client ↔ connection task)
// ═══════════════════════════════════════════════════════════════

enum Outbound {
    Text(String),
    Close,
}

struct Session {
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

struct Active {
    id: SubscriptionId,
    /// Taken by the first delivery.
    tx: Option<oneshot::Sender<Delivery>>,
}

#[derive(Default)]
struct State {
    session: Option<Session>,
    active: Option<Active>,
}

impl State {
    /// Sender of a live session. A closed sender means the task already exited.
    fn outbound(&self) -> Option<&mpsc::UnboundedSender<Outbound>> {
        self.session
            .as_ref()
            .map(|s| &s.outbound)
            .filter(|tx| !tx.is_closed())
    }
}

struct Shared {
    state: Mutex<State>,
    on_disconnect: Option<Hook>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, text: &str) {
        let frame = match ServerFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "skipping unparsable frame");
                return;
            }
        };
        let route = frame.route();
        let outcome = frame.into_outcome();

        let mut state = self.state();
        let Some(active) = state.active.as_mut() else {
            debug!(?route, "no active subscription, frame dropped");
            return;
        };
        match route {
            Route::Active => {}
            Route::To(id) if id == active.id => {}
            Route::To(id) => {
                debug!(%id, "frame for unknown subscription dropped");
                return;
            }
            Route::Invalid => {
                debug!("frame with malformed id dropped");
                return;
            }
        }

        let id = active.id;
        let Some(tx) = active.tx.take() else {
            debug!(%id, "subscription already resolved, frame dropped");
            return;
        };
        // Receiver gone means the caller stopped waiting.
        let _ = tx.send(outcome.map(|result| Patch { id, result }));
    }

    fn teardown(&self) {
        // Dropping the sender resolves a pending `patch()` with `Disconnected`.
        // The id stays owned until its single `unsubscribe`.
        if let Some(active) = self.state().active.as_mut() {
            if active.tx.take().is_some() {
                debug!(id = %active.id, "pending subscription closed with the connection");
            }
        }
        info!("disconnected");
        if let Some(hook) = &self.on_disconnect {
            hook();
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Client
// ═══════════════════════════════════════════════════════════════

pub struct EscanClientBuilder {
    endpoint: String,
    on_connect: Option<Hook>,
    on_disconnect: Option<Hook>,
}

impl EscanClientBuilder {
    /// Called once per established session, before `connect` returns.
    pub fn on_connect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(hook));
        self
    }

    /// Called once per session when it ends, whatever the cause.
    pub fn on_disconnect(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> EscanClient {
        EscanClient {
            endpoint: self.endpoint,
            on_connect: self.on_connect,
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                on_disconnect: self.on_disconnect,
            }),
            connecting: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }
}

/// Single-connection subscription client.
///
/// ```no_run
/// # async fn demo() -> Result<(), escan_client::ClientError> {
/// use escan_client::{EscanClient, SubscriptionQuery};
///
/// let client = EscanClient::builder("wss://escan-mainnet.euler.finance").build();
/// client.connect().await?;
/// let sub = client.subscribe(&SubscriptionQuery {
///     topic: "accounts".into(),
///     by: "healthScore".into(),
///     health_max: 10_000_000_000_000_000_000,
///     limit: 10_000,
/// })?;
/// let id = sub.id();
/// let patch = sub.patch().await?;
/// client.unsubscribe(id)?;
/// client.shutdown().await;
/// # let _ = patch;
/// # Ok(())
/// # }
/// ```
pub struct EscanClient {
    endpoint: String,
    on_connect: Option<Hook>,
    shared: Arc<Shared>,
    /// Serializes handshakes so concurrent `connect` calls open one session.
    connecting: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

impl EscanClient {
    pub fn builder(endpoint: impl Into<String>) -> EscanClientBuilder {
        EscanClientBuilder {
            endpoint: endpoint.into(),
            on_connect: None,
            on_disconnect: None,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state().outbound().is_some()
    }

    /// Open the session. No-op while a session is live; no retries.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let _guard = self.connecting.lock().await;
        if self.is_connected() {
            debug!(endpoint = %self.endpoint, "already connected");
            return Ok(());
        }

        let (ws, _) = tokio_tungstenite::connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| ClientError::Connect {
                endpoint: self.endpoint.clone(),
                detail: e.to_string(),
            })?;
        info!(endpoint = %self.endpoint, "connected");
        if let Some(hook) = &self.on_connect {
            hook();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_session(ws, rx, Arc::clone(&self.shared)));
        self.shared.state().session = Some(Session { outbound: tx, task });
        Ok(())
    }

    /// Send a `sub` request. Only one subscription may be active at a time.
    pub fn subscribe(&self, query: &SubscriptionQuery) -> Result<Subscription, ClientError> {
        let mut state = self.shared.state();
        if let Some(active) = &state.active {
            return Err(ClientError::SubscriptionActive(active.id));
        }
        let outbound = state.outbound().ok_or(ClientError::NotConnected)?;

        let id = SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let text = ClientFrame::Sub { id, query }.encode()?;
        outbound
            .send(Outbound::Text(text))
            .map_err(|_| ClientError::NotConnected)?;

        let (tx, rx) = oneshot::channel();
        state.active = Some(Active { id, tx: Some(tx) });
        debug!(%id, topic = %query.topic, "subscribed");
        Ok(Subscription { id, rx })
    }

    /// Release a subscription. Each id is accepted exactly once.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ClientError> {
        let mut state = self.shared.state();
        if state.active.as_ref().map(|a| a.id) != Some(id) {
            return Err(ClientError::UnknownSubscription(id));
        }
        state.active = None;

        let text = ClientFrame::Unsub { id }.encode()?;
        if let Some(outbound) = state.outbound() {
            let _ = outbound.send(Outbound::Text(text));
        }
        debug!(%id, "unsubscribed");
        Ok(())
    }

    /// Close the session after every frame queued before this call is sent,
    /// and wait for the connection task to finish.
    pub async fn shutdown(&self) {
        let session = self.shared.state().session.take();
        let Some(Session { outbound, task }) = session else {
            return;
        };
        let _ = outbound.send(Outbound::Close);
        drop(outbound);
        if let Err(e) = task.await {
            warn!(error = %e, "connection task failed");
        }
    }
}

impl Drop for EscanClient {
    /// The task holds `Shared`, so the session must be closed explicitly.
    fn drop(&mut self) {
        if let Some(session) = self.shared.state().session.take() {
            let _ = session.outbound.send(Outbound::Close);
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Connection task
// ═══════════════════════════════════════════════════════════════

async fn run_session(
    mut ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    shared: Arc<Shared>,
) {
    loop {
        tokio::select! {
            biased;

            cmd = outbound.recv() => match cmd {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = ws.send(Message::Text(text.into())).await {
                        warn!(error = %e, "send failed");
                        break;
                    }
                }
                // `shutdown` or `Drop` of the client.
                Some(Outbound::Close) | None => {
                    close(&mut ws).await;
                    break;
                }
            },

            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => shared.dispatch(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "server closed the connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "read failed");
                    break;
                }
                None => break,
            },
        }
    }

    // Marks the session dead for `is_connected` before the hook runs.
    drop(outbound);
    shared.teardown();
}

async fn close(ws: &mut WsStream) {
    if let Err(e) = ws.close(None).await {
        debug!(error = %e, "close frame not sent");
        return;
    }
    let drain = async { while let Some(Ok(_)) = ws.next().await {} };
    if tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, drain).await.is_err() {
        debug!("close handshake timed out");
    }
}
