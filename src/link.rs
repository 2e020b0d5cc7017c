//! The session object tying a connection, the request router and event
//! forwarding together.

use std::{
    fmt::{self, Display},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{LevelFilter, Log};
use parking_lot::{Mutex, RwLock};
use snafu::prelude::*;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    config::{ConfigHandle, LinkConfig},
    error::{self, Result},
    forwarder::EventForwarder,
    log_filter::{ForwardingLogger, LogFilter, LOG_QUEUE_CAPACITY},
    platform::MainContext,
    router::RequestRouter,
    ws::{
        message::Request, ConnectionManager, ConnectionSettings, Credentials, LinkState, Message,
        Outbound, SendError,
    },
};

/// The connection currently in use, swapped on reload.
#[derive(Debug)]
struct ActiveConnection {
    manager: RwLock<ConnectionManager>,
}

impl ActiveConnection {
    fn current(&self) -> ConnectionManager {
        self.manager.read().clone()
    }

    fn replace(&self, manager: ConnectionManager) -> ConnectionManager {
        std::mem::replace(&mut *self.manager.write(), manager)
    }
}

impl Outbound for ActiveConnection {
    fn is_authenticated(&self) -> bool {
        self.manager.read().is_authenticated()
    }

    fn send(&self, message: Message) -> std::result::Result<(), SendError> {
        self.manager.read().send(message)
    }
}

/// Snapshot of the link for operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    /// gateway address
    pub url: String,
    /// lifecycle state
    pub state: LinkState,
    /// whether events and responses are delivered
    pub authenticated: bool,
    /// failed connection attempts since the last success
    pub reconnect_attempt: u32,
    /// delay before the next attempt
    pub next_retry_delay: Duration,
    /// why reconnecting stopped, if it did
    pub fatal: Option<String>,
    /// log lines dropped because the forwarding queue was full
    pub dropped_log_lines: u64,
}

impl Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Gateway: {}", self.url)?;

        let (socket, events) = match (self.state, self.authenticated) {
            (_, true) => ("Connected & Authenticated", "Enabled"),
            (LinkState::Connected, false) => {
                ("Connected (Not Authenticated)", "Disabled (Not Authenticated)")
            }
            (state, false) => {
                write!(f, "WebSocket: {}", state)?;
                return self.fmt_tail(f, "Disabled (No Connection)");
            }
        };

        write!(f, "WebSocket: {}", socket)?;
        self.fmt_tail(f, events)
    }
}

impl LinkStatus {
    fn fmt_tail(&self, f: &mut fmt::Formatter<'_>, events: &str) -> fmt::Result {
        writeln!(f)?;
        write!(f, "Events: {}", events)?;

        if let Some(reason) = &self.fatal {
            write!(f, "\nReconnect: stopped, {}", reason)?;
        } else if self.reconnect_attempt > 0 {
            write!(
                f,
                "\nReconnect: attempt {}, next in {}s",
                self.reconnect_attempt,
                self.next_retry_delay.as_secs()
            )?;
        }

        if self.dropped_log_lines > 0 {
            write!(f, "\nDropped log lines: {}", self.dropped_log_lines)?;
        }

        Ok(())
    }
}

/// A running link to the management service.
///
/// Must be started and used within a tokio runtime.
#[derive(Debug)]
pub struct Link {
    config: ConfigHandle,
    active: Arc<ActiveConnection>,
    forwarder: EventForwarder,
    requests: mpsc::UnboundedSender<Request>,
    router: JoinHandle<()>,
    dropped_logs: Mutex<Option<Arc<AtomicU64>>>,
}

fn settings(config: &LinkConfig) -> Result<ConnectionSettings> {
    ConnectionSettings::from_config(config).with_context(|_| error::InvalidGatewayURL {
        url: &config.url,
    })
}

impl Link {
    /// Validate `config`, start serving requests and open the connection.
    pub fn start(config: LinkConfig, context: MainContext) -> Result<Self> {
        let settings = settings(&config)?;

        let (requests, requests_rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(settings, requests.clone());
        let active = Arc::new(ActiveConnection {
            manager: RwLock::new(manager.clone()),
        });

        let forwarder = EventForwarder::new(active.clone(), config.logging.debug);
        let router = tokio::spawn(RequestRouter::new(context, active.clone()).run(requests_rx));

        manager.open();

        log::info!("Link started");

        Ok(Self {
            config: ConfigHandle::new(config),
            active,
            forwarder,
            requests,
            router,
            dropped_logs: Mutex::new(None),
        })
    }

    /// Live view of the configuration in use.
    pub fn config(&self) -> ConfigHandle {
        self.config.clone()
    }

    /// Handle for pushing game events.
    pub fn forwarder(&self) -> EventForwarder {
        self.forwarder.clone()
    }

    /// Current connection.
    pub fn connection(&self) -> ConnectionManager {
        self.active.current()
    }

    /// Operator facing status.
    pub fn status(&self) -> LinkStatus {
        let manager = self.active.current();
        let (reconnect_attempt, next_retry_delay) = manager.backoff();

        LinkStatus {
            url: self.config.get().url,
            state: manager.state(),
            authenticated: manager.is_authenticated(),
            reconnect_attempt,
            next_retry_delay,
            fatal: manager.retry_disabled_reason(),
            dropped_log_lines: self
                .dropped_logs
                .lock()
                .as_ref()
                .map_or(0, |dropped| dropped.load(Ordering::Relaxed)),
        }
    }

    /// Replace the credentials, kept in the live config too.
    pub fn update_credentials(&self, identity_token: &str, registration_token: &str) {
        let mut config = self.config.get();
        config.identity_token = identity_token.to_string();
        config.registration_token = registration_token.to_string();
        self.config.replace(config);

        self.active.current().update_credentials(Credentials {
            identity_token: identity_token.to_string(),
            registration_token: registration_token.to_string(),
        });
    }

    /// Close the current connection and reconnect with `config`.
    ///
    /// An invalid config is rejected before anything is torn down.
    pub async fn reload(&self, config: LinkConfig) -> Result<()> {
        let settings = settings(&config)?;

        let manager = ConnectionManager::new(settings, self.requests.clone());
        let old = self.active.replace(manager.clone());

        old.shutdown();
        old.closed().await;

        self.forwarder.set_debug(config.logging.debug);
        self.config.replace(config);
        manager.open();

        log::info!("Configuration reloaded, link reconnecting");

        Ok(())
    }

    /// Install the global logger that forwards accepted lines to the service.
    ///
    /// Every record still reaches `inner`. Fails when a global logger is
    /// already set.
    pub fn install_log_forwarding(&self, inner: Box<dyn Log>, max_level: LevelFilter) -> Result<()> {
        let filter = LogFilter::new(Arc::new(self.config.clone()));
        let (logger, pump) = ForwardingLogger::new(inner, filter, LOG_QUEUE_CAPACITY);
        let dropped = logger.dropped();

        log::set_boxed_logger(Box::new(logger)).context(error::InstallLogger)?;
        log::set_max_level(max_level);

        *self.dropped_logs.lock() = Some(dropped);
        tokio::spawn(pump.run(self.forwarder.clone()));

        Ok(())
    }

    /// Close the connection for good and stop serving requests.
    pub async fn shutdown(self) {
        let manager = self.active.current();
        manager.shutdown();
        manager.closed().await;

        self.router.abort();

        log::info!("Link stopped");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::platform::MemoryPlatform;

    fn config(url: &str) -> LinkConfig {
        LinkConfig {
            url: url.to_string(),
            identity_token: "srv".to_string(),
            registration_token: "reg".to_string(),
            ..Default::default()
        }
    }

    fn context() -> MainContext {
        let (context, runner) = MainContext::channel();
        tokio::spawn(runner.run(MemoryPlatform::new()));
        context
    }

    #[tokio::test]
    async fn test_start_rejects_bad_url() {
        let err = Link::start(config("http://example.com"), context()).unwrap_err();
        assert!(matches!(err, error::Error::InvalidGatewayURL { .. }));
    }

    #[tokio::test]
    async fn test_reload_keeps_old_connection_on_bad_config() {
        // nothing listens on port 9, attempts fail and back off
        let link = Link::start(config("ws://127.0.0.1:9/"), context()).unwrap();
        let before = link.connection();

        assert!(link.reload(config("")).await.is_err());
        assert_eq!(link.config().get().url, "ws://127.0.0.1:9/");
        assert!(!before.is_shut_down());

        link.shutdown().await;
        assert!(before.is_shut_down());
    }

    #[tokio::test]
    async fn test_reload_swaps_connection() {
        let link = Link::start(config("ws://127.0.0.1:9/"), context()).unwrap();
        let before = link.connection();

        link.reload(config("ws://127.0.0.1:10/")).await.unwrap();

        assert!(before.is_shut_down());
        assert_eq!(before.state(), LinkState::Closing);
        assert!(!link.connection().is_shut_down());
        assert_eq!(link.config().get().url, "ws://127.0.0.1:10/");
        assert!(!link.forwarder().debug());

        let mut verbose = config("ws://127.0.0.1:10/");
        verbose.logging.debug = true;
        let forwarder = link.forwarder();
        link.reload(verbose).await.unwrap();
        assert!(forwarder.debug());

        link.shutdown().await;
    }

    #[tokio::test]
    async fn test_update_credentials_reaches_config_and_connection() {
        let link = Link::start(config("ws://127.0.0.1:9/"), context()).unwrap();

        link.update_credentials("srv-2", "reg-2");

        assert_eq!(link.config().get().identity_token, "srv-2");
        assert_eq!(link.connection().credentials().registration_token, "reg-2");

        link.shutdown().await;
    }

    #[test]
    fn test_status_lines() {
        let mut status = LinkStatus {
            url: "wss://example.com/".to_string(),
            state: LinkState::Authenticated,
            authenticated: true,
            reconnect_attempt: 0,
            next_retry_delay: Duration::from_secs(5),
            fatal: None,
            dropped_log_lines: 0,
        };
        assert_eq!(
            status.to_string(),
            "Gateway: wss://example.com/\nWebSocket: Connected & Authenticated\nEvents: Enabled"
        );

        status.state = LinkState::Disconnected;
        status.authenticated = false;
        status.fatal = Some("authentication rejected".to_string());
        status.dropped_log_lines = 3;
        assert_eq!(
            status.to_string(),
            "Gateway: wss://example.com/\nWebSocket: disconnected\nEvents: Disabled (No Connection)\
             \nReconnect: stopped, authentication rejected\nDropped log lines: 3"
        );
    }
}
