mod auth;
mod inner;

pub use auth::Credentials;
pub use inner::ConnectGatewayError;

pub(crate) use auth::{AuthOutcome, AuthSession};

use std::{fmt::Debug, sync::Arc, time::Duration};

use parking_lot::Mutex;
use snafu::prelude::*;
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::{
    backoff::{BackoffPolicy, BackoffState},
    config::{LinkConfig, ParseGatewayUrlError},
    ws::message::{Message, Request},
};
use inner::{ClientInner, ClientStateInit};

pub(crate) type WebsocketClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code of a deliberate, clean close
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// Lifecycle state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// no transport, maybe waiting for a reconnect
    Disconnected,
    /// transport being established
    Connecting,
    /// transport open, handshake not yet accepted
    Connected,
    /// handshake accepted, all traffic allowed
    Authenticated,
    /// shutdown requested, terminal
    Closing,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// Error when send a message over the link
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum SendError {
    /// no open transport, the message is dropped
    #[snafu(display("link is not connected, {type_name} message dropped"))]
    NotConnected {
        /// type of the dropped message
        type_name: String,
    },

    /// only the handshake may go out before authentication
    #[snafu(display("link is not authenticated, {type_name} message dropped"))]
    NotAuthenticated {
        /// type of the dropped message
        type_name: String,
    },
}

/// Anything outbound traffic can be handed to.
pub trait Outbound: Send + Sync + Debug {
    /// True when non-handshake messages may be sent.
    fn is_authenticated(&self) -> bool;

    /// Queue `message` on the current transport, never buffered across reconnects.
    fn send(&self, message: Message) -> Result<(), SendError>;
}

/// How a transport went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CloseInfo {
    pub code: u16,
    pub reason: String,
    pub remote: bool,
}

/// Settings of one [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// gateway address
    pub url: Url,
    /// handshake credentials
    pub credentials: Credentials,
    /// reconnect policy
    pub backoff: BackoffPolicy,
    /// log every raw frame
    pub log_messages: bool,
    /// verbose diagnostics
    pub debug: bool,
}

impl ConnectionSettings {
    /// Settings from the link configuration, validates the url.
    pub fn from_config(config: &LinkConfig) -> Result<Self, ParseGatewayUrlError> {
        Ok(Self {
            url: config.gateway_url()?,
            credentials: Credentials {
                identity_token: config.identity_token.clone(),
                registration_token: config.registration_token.clone(),
            },
            backoff: config.reconnect.policy(),
            log_messages: config.logging.log_messages,
            debug: config.logging.debug,
        })
    }
}

#[derive(Debug)]
pub(crate) struct Shared {
    pub url: Url,
    pub log_messages: bool,
    pub debug: bool,
    state: Mutex<LinkState>,
    auth: AuthSession,
    backoff: Mutex<BackoffState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    retry_disabled: Mutex<Option<String>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    requests: mpsc::UnboundedSender<Request>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Owner of the single socket to the management service.
///
/// Cloning gives another handle to the same connection. Inbound requests
/// are handed to the channel given at construction.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager, nothing is connected until [`open`](Self::open).
    pub fn new(settings: ConnectionSettings, requests: mpsc::UnboundedSender<Request>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                url: settings.url,
                log_messages: settings.log_messages,
                debug: settings.debug,
                state: Mutex::new(LinkState::Disconnected),
                auth: AuthSession::new(settings.credentials),
                backoff: Mutex::new(BackoffState::new(settings.backoff)),
                outbound: Mutex::new(None),
                retry_disabled: Mutex::new(None),
                shutdown_tx,
                shutdown_rx,
                requests,
                driver: Mutex::new(None),
            }),
        }
    }

    /// Start connecting in the background.
    ///
    /// No-op while a connection attempt or connection is alive, or after
    /// shutdown. Must be called within a tokio runtime.
    pub fn open(&self) {
        let mut driver = self.shared.driver.lock();

        if self.is_shut_down() {
            log::debug!("Open ignored, link is shut down");
            return;
        }

        if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
            log::debug!("Open ignored, link is already {}", self.state());
            return;
        }

        *self.shared.retry_disabled.lock() = None;
        self.set_state(LinkState::Connecting);

        log::info!("Connecting to {}", self.shared.url);

        let client = ClientInner {
            state: ClientStateInit {
                manager: self.clone(),
            },
        };
        *driver = Some(tokio::spawn(client.run()));
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        *self.shared.state.lock()
    }

    /// Reason retries were disabled, if they were.
    pub fn retry_disabled_reason(&self) -> Option<String> {
        self.shared.retry_disabled.lock().clone()
    }

    /// Failed attempts and delay of the next reconnect.
    pub fn backoff(&self) -> (u32, Duration) {
        let backoff = self.shared.backoff.lock();
        (backoff.attempt(), backoff.current_delay())
    }

    /// Credentials the next handshake will present.
    pub fn credentials(&self) -> Credentials {
        self.shared.auth.credentials()
    }

    /// Replace credentials, re-identify at once if connected but not yet authenticated.
    pub fn update_credentials(&self, credentials: Credentials) {
        self.shared.auth.update_credentials(credentials);

        if self.state() == LinkState::Connected && !self.shared.auth.is_authenticated() {
            log::info!("Re-sending handshake with updated credentials");
            self.send_handshake();
        }
    }

    /// Stop for good: no more reconnects, close the transport if open.
    ///
    /// Idempotent. Use [`closed`](Self::closed) to wait until the socket is gone.
    pub fn shutdown(&self) {
        if self.shared.shutdown_tx.send_replace(true) {
            return;
        }

        log::info!("Shutting down link to {}", self.shared.url);

        self.disable_retry("link shut down");
        self.set_state(LinkState::Closing);
        self.shared.auth.reset();
    }

    /// Wait for the background connection task to end.
    pub async fn closed(&self) {
        let handle = self.shared.driver.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                log::warn!("Connection task ended abnormally: {}", err);
            }
        }
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        *self.shared.shutdown_rx.borrow()
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shared.shutdown_rx.clone()
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    fn set_state(&self, state: LinkState) {
        let mut current = self.shared.state.lock();
        if *current == LinkState::Closing && state != LinkState::Closing {
            return;
        }
        if *current != state {
            log::debug!("Link state {} -> {}", *current, state);
            *current = state;
        }
    }

    fn disable_retry(&self, reason: &str) {
        let mut disabled = self.shared.retry_disabled.lock();
        if disabled.is_none() {
            *disabled = Some(reason.to_string());
        }
    }

    fn send_handshake(&self) {
        if let Err(err) = self.send(self.shared.auth.handshake()) {
            log::warn!("Send handshake failed: {}", err);
        }
    }

    pub(crate) fn on_connecting(&self) {
        self.set_state(LinkState::Connecting);
    }

    pub(crate) fn on_transport_opened(&self, tx: mpsc::UnboundedSender<Message>) {
        log::info!("Connected to {}", self.shared.url);

        *self.shared.outbound.lock() = Some(tx);
        self.shared.auth.reset();
        self.shared.backoff.lock().reset();
        self.set_state(LinkState::Connected);

        self.send_handshake();
    }

    /// Returns the attempt number and delay of the next reconnect, `None` to stop.
    pub(crate) fn on_transport_closed(&self, info: CloseInfo) -> Option<(u32, Duration)> {
        self.shared.outbound.lock().take();
        self.shared.auth.reset();

        log::info!(
            "Connection closed{}, code {}, reason: {}",
            if info.remote { " by remote" } else { "" },
            info.code,
            if info.reason.is_empty() {
                "none"
            } else {
                info.reason.as_str()
            }
        );

        if self.is_shut_down() {
            self.set_state(LinkState::Closing);
            return None;
        }

        self.set_state(LinkState::Disconnected);

        if let Some(reason) = self.retry_disabled_reason() {
            log::error!("Not reconnecting: {}", reason);
            return None;
        }

        let next = self.shared.backoff.lock().advance();
        match next {
            Some((attempt, delay)) => {
                log::info!("Reconnecting in {:?}, attempt {}", delay, attempt);
            }
            None => {
                log::error!("Not reconnecting: maximum reconnect attempts reached");
                self.disable_retry("maximum reconnect attempts reached");
            }
        }
        next
    }

    pub(crate) fn on_transport_error(&self, err: &dyn std::error::Error) {
        log::error!("Connection error: {}", err);
    }

    pub(crate) fn on_message(&self, message: Message) {
        match message {
            Message::Connected(data) => match data.payload.and_then(|p| p.client_id) {
                Some(id) => log::info!("Connection acknowledged, client id: {}", id),
                None => log::info!("Connection acknowledged"),
            },
            Message::IdentifyResponse(_) | Message::Authenticated(_) => {
                match self.shared.auth.on_handshake_result(&message) {
                    AuthOutcome::Authenticated => {
                        let has_transport = self.shared.outbound.lock().is_some();
                        if has_transport {
                            self.set_state(LinkState::Authenticated);
                        }
                    }
                    AuthOutcome::Rejected { permanent: true } => {
                        self.disable_retry("authentication rejected, fix credentials and reload");
                    }
                    AuthOutcome::Rejected { permanent: false } => {
                        log::warn!("Authentication failed, will retry on next connection");
                    }
                    AuthOutcome::Ignored => {}
                }
            }
            Message::Error(notice) => {
                log::error!(
                    "Server error: {}",
                    notice.message.as_deref().unwrap_or("Unknown error")
                );

                if notice.code == Some(401) {
                    log::error!("Unauthorized, disabling reconnect");
                    self.disable_retry("server reported unauthorized");
                }
            }
            Message::Request(request) => {
                log::trace!(
                    "Received request {:?}, action {}",
                    request.request_id,
                    request.payload.action
                );

                if self.shared.requests.send(request).is_err() {
                    log::warn!("Request dropped, no router is running");
                }
            }
            other => {
                if self.shared.debug {
                    log::info!("Ignored {} message", other.type_name());
                } else {
                    log::debug!("Ignored {} message", other.type_name());
                }
            }
        }
    }
}

impl Outbound for ConnectionManager {
    fn is_authenticated(&self) -> bool {
        if self.state() != LinkState::Authenticated {
            return false;
        }

        self.shared
            .outbound
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    fn send(&self, message: Message) -> Result<(), SendError> {
        let type_name = message.type_name();

        if !message.is_handshake() && !self.is_authenticated() {
            return error::NotAuthenticated { type_name }.fail();
        }

        let outbound = self.shared.outbound.lock();
        let tx = outbound
            .as_ref()
            .with_context(|| error::NotConnected { type_name })?;

        tx.send(message)
            .map_err(|_| error::NotConnected { type_name }.build())
    }
}
