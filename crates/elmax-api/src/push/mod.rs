// Push notification listener
//
// A background task keeps one websocket open to the push endpoint while at
// least one handler is registered. Every text frame is a full panel status
// snapshot, routed to the handlers of that snapshot's panel.

mod handler;
mod state;

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

pub use handler::{HANDLER_QUEUE_CAPACITY, HandlerId, PushHandler};
pub use state::{ChannelEvent, ChannelState, ReconnectConfig};

use crate::error::Error;
use crate::model::PanelStatus;
use crate::session::Authenticator;
use crate::transport::TransportConfig;
use handler::Registry;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Listens for pushed panel snapshots and fans them out to handlers.
///
/// Obtained from [`ElmaxClient::push_listener`](crate::ElmaxClient::push_listener)
/// and sharing that client's session. The websocket is opened when the
/// first handler registers and closed when the last one leaves, on
/// [`shutdown`](Self::shutdown), or when the listener is dropped.
pub struct PushListener {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: Url,
    session: Arc<Authenticator>,
    transport: TransportConfig,
    reconnect: ReconnectConfig,
    registry: Registry,
    state: watch::Sender<ChannelState>,
    running: Mutex<Option<CancellationToken>>,
}

impl PushListener {
    pub(crate) fn new(
        endpoint: Url,
        session: Arc<Authenticator>,
        transport: TransportConfig,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                endpoint,
                session,
                transport,
                reconnect,
                registry: Registry::default(),
                state,
                running: Mutex::new(None),
            }),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Call `handler` with every snapshot pushed for `panel_id`.
    ///
    /// Starts the channel if it is not running. Must be called from within
    /// a Tokio runtime.
    pub fn register_push_notification_handler(
        &self,
        panel_id: impl Into<String>,
        handler: impl PushHandler,
    ) -> HandlerId {
        let id = self.inner.registry.register(panel_id.into(), Arc::new(handler));
        self.ensure_running();
        id
    }

    /// Remove every handler registered for `panel_id`. Returns how many
    /// were removed.
    pub fn unregister_push_notification_handler(&self, panel_id: &str) -> usize {
        let removed = self.inner.registry.unregister_panel(panel_id);
        self.stop_if_idle();
        removed
    }

    /// Remove a single registration.
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        let removed = self.inner.registry.unregister(id);
        self.stop_if_idle();
        removed
    }

    /// Close the channel, cancel any pending reconnect, and drop all
    /// handlers.
    pub fn shutdown(&self) {
        self.inner.registry.clear();
        self.stop();
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    /// Watch channel state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    fn ensure_running(&self) {
        let mut running = self
            .inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|cancel| !cancel.is_cancelled()) {
            return;
        }

        let cancel = CancellationToken::new();
        *running = Some(cancel.clone());
        tokio::spawn(run(Arc::clone(&self.inner), cancel));
    }

    fn stop_if_idle(&self) {
        if self.inner.registry.is_empty() {
            debug!("no push handlers left");
            self.stop();
        }
    }

    fn stop(&self) {
        let mut running = self
            .inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(cancel) = running.take() {
            cancel.cancel();
        }
        self.inner.state.send_replace(ChannelState::Disconnected);
    }
}

impl Drop for PushListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Background loop ──────────────────────────────────────────────────

/// Drive the channel state machine until it reaches `Disconnected`.
async fn run(inner: Arc<Inner>, cancel: CancellationToken) {
    let reconnect = &inner.reconnect;
    let mut state = ChannelState::Disconnected.on(ChannelEvent::Start, reconnect);
    let mut stream = None;

    loop {
        if !inner.publish(state, &cancel) || state == ChannelState::Disconnected {
            break;
        }

        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => ChannelEvent::Shutdown,
            event = inner.step(state, &mut stream) => event,
        };

        let next = state.on(event, reconnect);
        if next == ChannelState::Disconnected && event != ChannelEvent::Shutdown {
            error!(
                max_retries = ?reconnect.max_retries,
                "push channel reconnection limit reached, giving up"
            );
        }
        state = next;
    }

    cancel.cancel();
    debug!("push loop exiting");
}

impl Inner {
    /// Publish `state` unless this run was cancelled. Serialized with `stop`
    /// so a stopped run never overwrites the final `Disconnected`.
    fn publish(&self, state: ChannelState, cancel: &CancellationToken) -> bool {
        let _running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if cancel.is_cancelled() {
            return false;
        }
        self.state.send_replace(state);
        true
    }

    /// Do the work of `state` and report how it ended.
    async fn step(&self, state: ChannelState, stream: &mut Option<WsStream>) -> ChannelEvent {
        match state {
            ChannelState::Disconnected => ChannelEvent::Shutdown,
            ChannelState::Connecting { attempt } => match self.connect().await {
                Ok(ws) => {
                    *stream = Some(ws);
                    ChannelEvent::Connected
                }
                Err(e) => {
                    warn!(error = %e, attempt, "push channel connect failed");
                    ChannelEvent::ConnectFailed
                }
            },
            ChannelState::Subscribed => {
                let Some(ws) = stream.take() else {
                    return ChannelEvent::Dropped;
                };
                match self.read(ws).await {
                    Ok(()) => info!("push channel closed by server, reconnecting"),
                    Err(e) => warn!(error = %e, "push channel dropped"),
                }
                ChannelEvent::Dropped
            }
            ChannelState::Reconnecting { attempt } => {
                let delay = self.reconnect.delay_for(attempt);
                info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "waiting before push reconnect"
                );
                tokio::time::sleep(delay).await;
                ChannelEvent::BackoffElapsed
            }
        }
    }

    /// Open the websocket with a valid session token.
    async fn connect(&self) -> Result<WsStream, Error> {
        let token = self.session.valid_token().await?;

        info!(url = %self.endpoint, "connecting to push channel");

        let uri: tungstenite::http::Uri = self
            .endpoint
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;
        let request = ClientRequestBuilder::new(uri).with_header("Authorization", token.raw());
        let connector = self.transport.websocket_connector()?;

        match tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector).await
        {
            Ok((ws, _response)) => {
                info!("push channel connected");
                Ok(ws)
            }
            Err(tungstenite::Error::Http(response))
                if response.status() == tungstenite::http::StatusCode::UNAUTHORIZED =>
            {
                // Have a fresh token ready for the next attempt.
                if let Err(e) = self.session.renew(Some(&token)).await {
                    warn!(error = %e, "session renewal for push channel failed");
                }
                Err(Error::WebSocketConnect(
                    "push channel rejected the session token".into(),
                ))
            }
            Err(e) => Err(Error::WebSocketConnect(e.to_string())),
        }
    }

    /// Read frames until the connection ends.
    async fn read(&self, ws: WsStream) -> Result<(), Error> {
        let (_write, mut read) = ws.split();

        while let Some(frame) = read.next().await {
            match frame {
                Ok(tungstenite::Message::Text(text)) => self.handle_frame(&text),
                Ok(tungstenite::Message::Ping(_)) => {
                    // tungstenite handles pong replies automatically
                    trace!("push channel ping");
                }
                Ok(tungstenite::Message::Close(frame)) => {
                    if let Some(cf) = frame {
                        info!(code = %cf.code, reason = %cf.reason, "push channel close frame");
                    }
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => return Err(Error::WebSocketConnect(e.to_string())),
            }
        }
        Ok(())
    }

    fn handle_frame(&self, text: &str) {
        trace!(bytes = text.len(), "push frame");

        let status: PanelStatus = match serde_json::from_str(text) {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "ignoring unparseable push frame");
                return;
            }
        };
        if status.panel_id.is_empty() {
            warn!("ignoring push frame without panel id");
            return;
        }

        let status = Arc::new(status);
        let queued = self.registry.dispatch(&status);
        debug!(panel_id = %status.panel_id, handlers = queued, "push notification dispatched");
    }
}
