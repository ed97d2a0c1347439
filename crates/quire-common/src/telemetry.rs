//! Logging and metrics for quire binaries.
//!
//! `init` installs a prometheus recorder and a console subscriber. The
//! recorder is only read back through [`render`]; nothing is served over
//! HTTP.
//!
//! ```ignore
//! use quire_common::telemetry::{self, TelemetryConfig};
//!
//! telemetry::init(TelemetryConfig::from_env("quire-sim"));
//! tracing::info!("started");
//! println!("{}", telemetry::render());
//! ```

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use metrics::{counter, gauge, histogram};

static RECORDER: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Console output shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogStyle {
    #[default]
    Compact,
    /// Multi-line events, easier to read when stepping through a scenario.
    Pretty,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Used when `RUST_LOG` is unset.
    pub console_level: Level,
    pub style: LogStyle,
}

impl TelemetryConfig {
    /// Defaults plus the environment.
    ///
    /// `QUIRE_LOG_LEVEL` picks the fallback level (`RUST_LOG` still wins),
    /// `QUIRE_LOG_STYLE=pretty` switches the console format.
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let console_level = std::env::var("QUIRE_LOG_LEVEL")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(if cfg!(debug_assertions) {
                Level::DEBUG
            } else {
                Level::INFO
            });
        let style = match std::env::var("QUIRE_LOG_STYLE").as_deref() {
            Ok("pretty") => LogStyle::Pretty,
            _ => LogStyle::Compact,
        };

        Self {
            service_name: service_name.into(),
            console_level,
            style,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.console_level = level;
        self
    }

    pub fn with_style(mut self, style: LogStyle) -> Self {
        self.style = style;
        self
    }
}

/// Install metrics and tracing. Safe to call more than once.
pub fn init(config: TelemetryConfig) {
    if init_metrics().is_some() {
        describe_sync_metrics();
    }
    init_tracing(&config);
}

/// Prometheus recorder, installed on first use.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    RECORDER
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "prometheus recorder not installed");
                None
            }
        })
        .as_ref()
}

fn describe_sync_metrics() {
    metrics::describe_counter!("quire_sync_saves_total", "document saves by outcome");
    metrics::describe_counter!("quire_sync_emits_total", "content broadcasts to the room");
    metrics::describe_counter!(
        "quire_sync_malformed_payloads_total",
        "room payloads that failed to decode"
    );
    metrics::describe_counter!("quire_sync_forks_total", "offline copies created on reconnect");
    metrics::describe_counter!(
        "quire_sync_reconcile_failures_total",
        "reconnect attempts that will be retried"
    );
}

fn init_tracing(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.console_level.as_str().to_lowercase()));

    let console = match config.style {
        LogStyle::Compact => tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .boxed(),
        LogStyle::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(console.with_filter(filter))
        .try_init()
    {
        eprintln!("tracing already initialized: {e}");
        return;
    }

    tracing::debug!(service = %config.service_name, style = ?config.style, "telemetry ready");
}

/// Current metrics in prometheus text format, empty without a recorder.
pub fn render() -> String {
    init_metrics().map(PrometheusHandle::render).unwrap_or_default()
}
