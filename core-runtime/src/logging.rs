//! Tracing bootstrap for the SDK.
//!
//! [`init_logging`] installs a global `tracing` subscriber that writes to
//! stderr in one of three [`LogFormat`]s and, when a [`LoggerSink`] is
//! configured, mirrors every event into the host as a
//! [`LogEntry`](bridge_traits::time::LogEntry).
//!
//! Upload session URLs, download URLs and monitor URLs are pre-authenticated
//! and OAuth traffic carries codes and tokens, so values headed for the sink
//! pass through [`redact_if_sensitive`] unless redaction is switched off.
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use bridge_traits::time::LogLevel;
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug),
//! )?;
//! ```

use crate::error::{Error, Result};

use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};

use std::fmt;
use std::io;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::format::FmtSpan,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    Layer, Registry,
};

/// Crates that follow `LoggingConfig::level`. Everything else is held at `warn`.
const SDK_TARGETS: &[&str] = &[
    "onedrive_sdk",
    "core_runtime",
    "core_auth",
    "provider_onedrive",
    "bridge_traits",
    "bridge_desktop",
];

const REDACTED: &str = "[REDACTED]";

/// Field-name fragments whose values never leave the process unmasked.
const CREDENTIAL_MARKERS: &[&str] = &[
    "token",
    "password",
    "secret",
    "authorization",
    "bearer",
    "code",
    "verifier",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored. Default for debug builds.
    Pretty,
    /// One JSON object per event. Default for release builds.
    Json,
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level applied to the SDK's own crates.
    pub level: LogLevel,
    /// Mask credentials and URL queries before they reach the sink.
    pub redact_pii: bool,
    /// Raw `EnvFilter` directives. Replaces the level-based default.
    pub filter: Option<String>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Report span open/close.
    pub enable_spans: bool,
    pub display_target: bool,
    pub display_thread_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            redact_pii: true,
            filter: None,
            logger_sink: None,
            enable_spans: false,
            display_target: true,
            display_thread_info: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_pii_redaction(mut self, redact: bool) -> Self {
        self.redact_pii = redact;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_spans(mut self, enable: bool) -> Self {
        self.enable_spans = enable;
        self
    }

    pub fn with_target(mut self, display: bool) -> Self {
        self.display_target = display;
        self
    }

    pub fn with_thread_info(mut self, display: bool) -> Self {
        self.display_thread_info = display;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let directives = match &self.filter {
            Some(custom) => custom.clone(),
            None => std::iter::once("warn".to_string())
                .chain(
                    SDK_TARGETS
                        .iter()
                        .map(|target| format!("{target}={}", self.level)),
                )
                .collect::<Vec<_>>()
                .join(","),
        };

        EnvFilter::try_new(&directives)
            .map_err(|e| Error::Config(format!("Invalid log filter '{directives}': {e}")))
    }

    fn output_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let span_events = if self.enable_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let base = tracing_subscriber::fmt::layer()
            .with_target(self.display_target)
            .with_thread_ids(self.display_thread_info)
            .with_thread_names(self.display_thread_info)
            .with_writer(io::stderr);

        match self.format {
            LogFormat::Pretty => base.pretty().with_span_events(span_events).boxed(),
            LogFormat::Compact => base.compact().with_span_events(span_events).boxed(),
            LogFormat::Json => base
                .json()
                .flatten_event(true)
                .with_current_span(self.enable_spans)
                .with_span_list(self.enable_spans)
                .boxed(),
        }
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// `Error::Config` for an unparsable filter, `Error::Logging` when a global
/// subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = config.env_filter()?;
    let forwarder = config
        .logger_sink
        .clone()
        .map(|sink| SinkForwarder::new(sink, config.redact_pii));

    tracing_subscriber::registry()
        .with(config.output_layer())
        .with(forwarder)
        .with(filter)
        .try_init()
        .map_err(|e| Error::Logging(format!("Failed to initialize logging: {e}")))
}

/// Mask `value` when `field_name` marks it as a credential, or strip the
/// query from URL-valued fields (`*_url`, `*link`).
///
/// ```ignore
/// tracing::debug!(upload_url = %redact_if_sensitive("upload_url", &session.upload_url));
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    let name = field_name.to_ascii_lowercase();
    if CREDENTIAL_MARKERS.iter().any(|marker| name.contains(marker)) {
        REDACTED.to_string()
    } else if name.ends_with("url") || name.ends_with("link") {
        redact_url(value)
    } else {
        value.to_string()
    }
}

/// Keep scheme, host and path; replace any query or fragment.
pub fn redact_url(url: &str) -> String {
    match url.find(['?', '#']) {
        Some(pos) => format!("{}?{REDACTED}", &url[..pos]),
        None => url.to_string(),
    }
}

/// Layer mirroring events into a host [`LoggerSink`].
struct SinkForwarder {
    sink: Arc<dyn LoggerSink>,
    redact: bool,
}

impl SinkForwarder {
    fn new(sink: Arc<dyn LoggerSink>, redact: bool) -> Self {
        Self { sink, redact }
    }

    fn deliver(&self, entry: LogEntry) {
        let sink = Arc::clone(&self.sink);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = sink.log(entry).await {
                        eprintln!("LoggerSink error: {err}");
                    }
                });
            }
            Err(_) => {
                if let Err(err) = futures::executor::block_on(sink.log(entry)) {
                    eprintln!("LoggerSink error: {err}");
                }
            }
        }
    }
}

impl<S> Layer<S> for SinkForwarder
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = sink_level(*metadata.level());
        if !self.sink.accepts(level) {
            return;
        }

        let mut collector = FieldCollector::new(self.redact);
        event.record(&mut collector);

        let message = collector
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_string());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        entry.fields.extend(collector.fields);
        if let Some(span) = ctx.lookup_current() {
            entry = entry.in_span(span.name());
        }

        self.deliver(entry);
    }
}

fn sink_level(level: Level) -> LogLevel {
    match level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        Level::ERROR => LogLevel::Error,
    }
}

/// Stringifies event fields, applying redaction as they are recorded.
struct FieldCollector {
    redact: bool,
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl FieldCollector {
    fn new(redact: bool) -> Self {
        Self {
            redact,
            message: None,
            fields: Vec::new(),
        }
    }

    fn push(&mut self, field: &Field, value: String) {
        let name = field.name();
        if name == "message" {
            self.message = Some(value);
            return;
        }
        let value = if self.redact {
            redact_if_sensitive(name, &value)
        } else {
            value
        };
        self.fields.push((name.to_string(), value));
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as SinkResult;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        entries: Mutex<Vec<LogEntry>>,
    }

    #[async_trait]
    impl LoggerSink for RecordingSink {
        async fn log(&self, entry: LogEntry) -> SinkResult<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }

        fn accepts(&self, _level: LogLevel) -> bool {
            true
        }
    }

    fn capture(redact: bool, emit: impl FnOnce()) -> Vec<LogEntry> {
        let sink = Arc::new(RecordingSink::default());
        let forwarder = SinkForwarder::new(sink.clone(), redact);
        let subscriber = tracing_subscriber::registry().with(forwarder);
        tracing::subscriber::with_default(subscriber, emit);
        let entries = sink.entries.lock().unwrap().clone();
        entries
    }

    #[test]
    fn default_filter_raises_sdk_crates_only() {
        let config = LoggingConfig::default().with_level(LogLevel::Debug);
        let filter = config.env_filter().unwrap().to_string();
        assert!(filter.contains("provider_onedrive=debug"));
        assert!(filter.contains("core_auth=debug"));
        assert!(filter.contains("warn"));
    }

    #[test]
    fn custom_filter_replaces_default() {
        let config = LoggingConfig::default().with_filter("core_auth=trace");
        let filter = config.env_filter().unwrap().to_string();
        assert!(filter.contains("core_auth=trace"));
        assert!(!filter.contains("provider_onedrive"));
    }

    #[test]
    fn malformed_filter_is_config_error() {
        let config = LoggingConfig::default().with_filter("core_auth=[");
        assert!(matches!(config.env_filter(), Err(Error::Config(_))));
    }

    #[test]
    fn credentials_and_url_queries_are_masked() {
        assert_eq!(redact_if_sensitive("access_token", "EwB4A8l"), REDACTED);
        assert_eq!(redact_if_sensitive("auth_code", "M.C507_BL2"), REDACTED);
        assert_eq!(
            redact_if_sensitive("upload_url", "https://up.example.com/abc?tempauth=xyz"),
            "https://up.example.com/abc?[REDACTED]"
        );
        assert_eq!(redact_if_sensitive("name", "report.docx"), "report.docx");
    }

    #[test]
    fn redact_url_handles_fragments_and_plain_urls() {
        assert_eq!(
            redact_url("https://api.onedrive.com/v1.0/drive"),
            "https://api.onedrive.com/v1.0/drive"
        );
        assert_eq!(
            redact_url("https://login.live.com/oauth20_desktop.srf#access_token=a"),
            "https://login.live.com/oauth20_desktop.srf?[REDACTED]"
        );
    }

    #[test]
    fn forwarder_masks_fields_for_the_sink() {
        let entries = capture(true, || {
            tracing::info!(
                target: "provider_onedrive::upload",
                item = "report.docx",
                access_token = "abc",
                "chunk accepted"
            );
        });

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.target, "provider_onedrive::upload");
        assert_eq!(entry.message, "chunk accepted");
        assert_eq!(entry.fields["item"], "report.docx");
        assert_eq!(entry.fields["access_token"], REDACTED);
    }

    #[test]
    fn forwarder_records_span_and_raw_values_without_redaction() {
        let entries = capture(false, || {
            let span = tracing::info_span!("upload");
            let _entered = span.enter();
            tracing::warn!(upload_url = "https://up.example.com/s?tempauth=1", "retrying");
        });

        let entry = &entries[0];
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.span.as_deref(), Some("upload"));
        assert_eq!(entry.fields["upload_url"], "https://up.example.com/s?tempauth=1");
    }
}
