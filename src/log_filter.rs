//! Server log forwarding.
//!
//! [`ForwardingLogger`] wraps the host's real logger. Every record goes to
//! the real logger untouched, then [`LogFilter`] decides if it's also
//! forwarded. Accepted lines are queued and a [`LogPump`] task hands them
//! to the [`EventForwarder`], so a slow link never stalls logging.

use std::{
    collections::HashSet,
    fmt::Display,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use log::{Level, Log, Metadata, Record};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{
    config::{LogSettingsSource, LoggingConfig},
    forwarder::EventForwarder,
};

/// Loggers never forwarded, the link's own and its transport's
pub const DEFAULT_FILTERED_LOGGERS: [&str; 2] = ["gamelink", "tungstenite"];

/// How long settings are trusted before they are read again
pub const SETTINGS_TTL: Duration = Duration::from_secs(30);

/// Lines waiting for the link, more are dropped
pub const LOG_QUEUE_CAPACITY: usize = 256;

/// Parse a level name, case-insensitive, with `WARNING`, `SEVERE` and `FATAL` aliases.
pub fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_ascii_uppercase().as_str() {
        "ERROR" | "SEVERE" | "FATAL" => Some(Level::Error),
        "WARN" | "WARNING" => Some(Level::Warn),
        "INFO" => Some(Level::Info),
        "DEBUG" => Some(Level::Debug),
        "TRACE" => Some(Level::Trace),
        _ => None,
    }
}

/// `a::b::Server` or `a.b.Server` -> `Server`
fn simple_name(logger: &str) -> &str {
    logger
        .rsplit(|c| c == ':' || c == '.')
        .find(|segment| !segment.is_empty())
        .unwrap_or("Unknown")
}

/// Forwarded line: `[LEVEL] SimpleName: message`.
pub fn format_line(level: Level, logger: &str, message: impl Display) -> String {
    format!("[{}] {}: {}", level, simple_name(logger), message)
}

/// Decision rules for forwarding, a snapshot of the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilterConfig {
    /// forward at all
    pub forwarding_enabled: bool,
    /// least severe level forwarded
    pub min_level: Level,
    /// loggers whose name contains any of these are never forwarded
    pub filtered_loggers: HashSet<String>,
    /// when these settings were read
    pub loaded_at: Instant,
}

impl LogFilterConfig {
    /// Used when settings were never readable.
    pub fn safe_defaults() -> Self {
        Self {
            forwarding_enabled: true,
            min_level: Level::Info,
            filtered_loggers: DEFAULT_FILTERED_LOGGERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            loaded_at: Instant::now(),
        }
    }

    /// Rules from settings, the default filtered loggers are always kept.
    pub fn from_settings(settings: &LoggingConfig) -> Self {
        let mut config = Self::safe_defaults();

        config.forwarding_enabled = settings.forward_server_logs;
        config.min_level = parse_level(&settings.min_level).unwrap_or(Level::Info);
        config.filtered_loggers.extend(
            settings
                .filtered_loggers
                .iter()
                .filter(|s| !s.is_empty())
                .cloned(),
        );

        config
    }

    /// Pure forwarding decision for one record.
    pub fn accepts(&self, logger: Option<&str>, level: Level) -> bool {
        if !self.forwarding_enabled {
            return false;
        }

        let logger = match logger {
            Some(logger) if !logger.is_empty() => logger,
            _ => return false,
        };

        if self
            .filtered_loggers
            .iter()
            .any(|filtered| logger.contains(filtered.as_str()))
        {
            return false;
        }

        level <= self.min_level
    }
}

/// [`LogFilterConfig`] cached over a [`LogSettingsSource`].
///
/// Never fails: unreadable settings fall back to the last good ones, or
/// to [`LogFilterConfig::safe_defaults`].
pub struct LogFilter {
    source: Arc<dyn LogSettingsSource>,
    cached: RwLock<Option<Arc<LogFilterConfig>>>,
    ttl: Duration,
    refreshing: Mutex<()>,
}

impl std::fmt::Debug for LogFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFilter")
            .field("cached", &self.cached)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl LogFilter {
    /// Filter reading settings from `source`.
    pub fn new(source: Arc<dyn LogSettingsSource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
            ttl: SETTINGS_TTL,
            refreshing: Mutex::new(()),
        }
    }

    /// Change how long settings are cached.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Current rules, read again from the source when stale.
    pub fn config(&self) -> Arc<LogFilterConfig> {
        if let Some(config) = self.fresh() {
            return config;
        }

        // settings reads may log, which lands here again
        let guard = match self.refreshing.try_lock() {
            Some(guard) => guard,
            None => return self.last_known(),
        };

        let (config, failure) = match self.source.log_settings() {
            Ok(settings) => {
                let warning = parse_level(&settings.min_level)
                    .is_none()
                    .then(|| format!("unknown log level {}, using INFO", settings.min_level));
                (LogFilterConfig::from_settings(&settings), warning)
            }
            Err(err) => {
                let mut fallback = (*self.last_known()).clone();
                fallback.loaded_at = Instant::now();
                (fallback, Some(err.to_string()))
            }
        };

        let config = Arc::new(config);
        *self.cached.write() = Some(config.clone());
        drop(guard);

        if let Some(reason) = failure {
            log::warn!("Log forwarding settings: {}", reason);
        }

        config
    }

    /// Forwarding decision for one record.
    pub fn accepts(&self, logger: Option<&str>, level: Level) -> bool {
        self.config().accepts(logger, level)
    }

    fn fresh(&self) -> Option<Arc<LogFilterConfig>> {
        self.cached
            .read()
            .as_ref()
            .filter(|config| config.loaded_at.elapsed() < self.ttl)
            .cloned()
    }

    fn last_known(&self) -> Arc<LogFilterConfig> {
        self.cached
            .read()
            .clone()
            .unwrap_or_else(|| Arc::new(LogFilterConfig::safe_defaults()))
    }
}

/// A [`Log`] that forwards accepted records on top of the host's logger.
pub struct ForwardingLogger {
    inner: Box<dyn Log>,
    filter: LogFilter,
    queue: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
}

impl std::fmt::Debug for ForwardingLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingLogger")
            .field("filter", &self.filter)
            .field("dropped", &self.dropped)
            .finish()
    }
}

/// Drains forwarded lines into the link.
#[derive(Debug)]
pub struct LogPump {
    queue: mpsc::Receiver<String>,
}

impl ForwardingLogger {
    /// Logger wrapping `inner`, with the pump that delivers its lines.
    pub fn new(inner: Box<dyn Log>, filter: LogFilter, capacity: usize) -> (Self, LogPump) {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let logger = Self {
            inner,
            filter,
            queue: tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };

        (logger, LogPump { queue: rx })
    }

    /// Counter of lines dropped because the queue was full.
    pub fn dropped(&self) -> Arc<AtomicU64> {
        self.dropped.clone()
    }
}

impl Log for ForwardingLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
            || self
                .filter
                .accepts(Some(metadata.target()), metadata.level())
    }

    fn log(&self, record: &Record<'_>) {
        self.inner.log(record);

        if !self.filter.accepts(Some(record.target()), record.level()) {
            return;
        }

        let line = format_line(record.level(), record.target(), record.args());
        if let Err(TrySendError::Full(_)) = self.queue.try_send(line) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn flush(&self) {
        self.inner.flush()
    }
}

impl LogPump {
    /// Deliver lines until the logger is gone.
    pub async fn run(mut self, forwarder: EventForwarder) {
        while let Some(line) = self.queue.recv().await {
            forwarder.send_log_event(&line);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{
        config::ConfigError,
        testing::RecordingOutbound,
    };

    #[derive(Default)]
    struct FakeSource {
        settings: Mutex<Option<LoggingConfig>>,
        reads: AtomicUsize,
    }

    impl FakeSource {
        fn with(settings: LoggingConfig) -> Arc<Self> {
            let source = Self::default();
            *source.settings.lock() = Some(settings);
            Arc::new(source)
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl LogSettingsSource for FakeSource {
        fn log_settings(&self) -> Result<LoggingConfig, ConfigError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.settings
                .lock()
                .clone()
                .ok_or_else(|| ConfigError::Unavailable {
                    message: "config file missing".to_string(),
                })
        }
    }

    fn settings(min_level: &str, filtered: &[&str]) -> LoggingConfig {
        LoggingConfig {
            min_level: min_level.to_string(),
            filtered_loggers: filtered.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_accepts() {
        let config = LogFilterConfig::from_settings(&settings("WARNING", &["noisy"]));

        assert!(config.accepts(Some("minecraft.server"), Level::Error));
        assert!(config.accepts(Some("minecraft.server"), Level::Warn));
        assert!(!config.accepts(Some("minecraft.server"), Level::Info));
        assert!(!config.accepts(Some("plugins.noisy.Thing"), Level::Error));
        assert!(!config.accepts(None, Level::Error));
        assert!(!config.accepts(Some(""), Level::Error));

        let disabled = LogFilterConfig {
            forwarding_enabled: false,
            ..config
        };
        assert!(!disabled.accepts(Some("minecraft.server"), Level::Error));
    }

    #[test]
    fn test_own_loggers_never_forwarded() {
        let config = LogFilterConfig::from_settings(&settings("TRACE", &[]));

        assert!(!config.accepts(Some("gamelink"), Level::Error));
        assert!(!config.accepts(Some("gamelink::ws::client"), Level::Trace));
        assert!(!config.accepts(Some("tungstenite::protocol"), Level::Error));
        assert!(config.accepts(Some("minecraft.server"), Level::Trace));
    }

    #[test]
    fn test_parse_level_aliases() {
        assert_eq!(parse_level("severe"), Some(Level::Error));
        assert_eq!(parse_level("FATAL"), Some(Level::Error));
        assert_eq!(parse_level("Warning"), Some(Level::Warn));
        assert_eq!(parse_level("info"), Some(Level::Info));
        assert_eq!(parse_level("finest"), None);

        let config = LogFilterConfig::from_settings(&settings("finest", &[]));
        assert_eq!(config.min_level, Level::Info);
    }

    #[test]
    fn test_format_line() {
        assert_eq!(
            format_line(Level::Info, "net.minecraft.server.Server", "Done"),
            "[INFO] Server: Done"
        );
        assert_eq!(
            format_line(Level::Warn, "host::world::Saver", "slow"),
            "[WARN] Saver: slow"
        );
        assert_eq!(format_line(Level::Error, "::", "x"), "[ERROR] Unknown: x");
    }

    #[test]
    fn test_settings_are_cached() {
        let source = FakeSource::with(settings("INFO", &[]));
        let filter = LogFilter::new(source.clone());

        for _ in 0..10 {
            filter.accepts(Some("server"), Level::Info);
        }
        assert_eq!(source.reads(), 1);

        let filter = LogFilter::new(source.clone()).with_ttl(Duration::ZERO);
        filter.accepts(Some("server"), Level::Info);
        filter.accepts(Some("server"), Level::Info);
        assert_eq!(source.reads(), 3);
    }

    #[test]
    fn test_failed_refresh_keeps_last_known_good() {
        let source = FakeSource::with(settings("ERROR", &["quiet"]));
        let filter = LogFilter::new(source.clone()).with_ttl(Duration::ZERO);

        assert!(!filter.accepts(Some("server"), Level::Warn));

        *source.settings.lock() = None;
        let config = filter.config();
        assert_eq!(config.min_level, Level::Error);
        assert!(config.filtered_loggers.contains("quiet"));
    }

    #[test]
    fn test_failed_first_read_uses_safe_defaults() {
        let filter = LogFilter::new(Arc::new(FakeSource::default()));
        let config = filter.config();

        assert!(config.forwarding_enabled);
        assert_eq!(config.min_level, Level::Info);
        assert!(config.filtered_loggers.contains("gamelink"));
    }

    #[derive(Default, Clone)]
    struct CountingLog {
        seen: Arc<AtomicUsize>,
    }

    impl Log for CountingLog {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }

        fn log(&self, _: &Record<'_>) {
            self.seen.fetch_add(1, Ordering::SeqCst);
        }

        fn flush(&self) {}
    }

    fn emit(logger: &ForwardingLogger, target: &str, level: Level, message: &str) {
        logger.log(
            &Record::builder()
                .target(target)
                .level(level)
                .args(format_args!("{}", message))
                .build(),
        );
    }

    #[test]
    fn test_logger_always_delegates_and_drops_when_full() {
        let inner = CountingLog::default();
        let filter = LogFilter::new(FakeSource::with(settings("INFO", &[])));
        let (logger, _pump) = ForwardingLogger::new(Box::new(inner.clone()), filter, 2);

        emit(&logger, "gamelink::ws", Level::Error, "own");
        emit(&logger, "minecraft.server", Level::Debug, "quiet");
        for i in 0..3 {
            emit(&logger, "minecraft.server", Level::Info, &i.to_string());
        }

        assert_eq!(inner.seen.load(Ordering::SeqCst), 5);
        assert_eq!(logger.dropped().load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pump_delivers_lines() {
        let filter = LogFilter::new(FakeSource::with(settings("INFO", &[])));
        let (logger, pump) = ForwardingLogger::new(Box::new(CountingLog::default()), filter, 8);

        let outbound = Arc::new(RecordingOutbound::authenticated());
        let forwarder = EventForwarder::new(outbound.clone(), false);

        emit(&logger, "minecraft.server", Level::Warn, "disk almost full");
        drop(logger);
        pump.run(forwarder).await;

        let sent = outbound.sent();
        let payload = &sent[0].as_game_event().unwrap().payload;
        assert_eq!(payload.r#type, "log");
        assert_eq!(payload.data["msg"], "[WARN] server: disk almost full");
    }
}
