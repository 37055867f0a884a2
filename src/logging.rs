//! Structured logging backed by `tracing`.
//!
//! The global subscriber is installed once: stdout, plus a daily rotated
//! `stls.log` when file logging is on and the directory can be created.

use std::path::{Path, PathBuf};
use std::sync::{Once, OnceLock};

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_DIRECTIVE: &str = "stls=info,warn";
const LOG_FILE: &str = "stls.log";

static INIT_LOGGING: Once = Once::new();
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Logging knobs from the root config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Option<String>,
    pub dir: Option<PathBuf>,
    pub to_file: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: None,
            dir: None,
            to_file: true,
        }
    }
}

impl LogSettings {
    /// Configured directory, else `<data dir>/stls/logs`.
    pub fn log_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("stls")
                .join("logs")
        })
    }

    /// Filter directive in effect: `RUST_LOG`, then the configured level,
    /// then the built-in default. Unparsable directives fall through.
    pub fn directive(&self, rust_log: Option<&str>) -> String {
        [rust_log, self.level.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|d| !d.is_empty() && EnvFilter::try_new(d).is_ok())
            .unwrap_or(DEFAULT_DIRECTIVE)
            .to_string()
    }
}

fn file_appender(dir: &Path) -> Option<RollingFileAppender> {
    if let Err(err) = std::fs::create_dir_all(dir) {
        eprintln!("[stls][WARN] Cannot create log directory {}: {}", dir.display(), err);
        return None;
    }
    Some(RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE))
}

/// Install the subscriber. Later calls are no-ops.
pub fn init_logging(settings: &LogSettings) {
    INIT_LOGGING.call_once(|| {
        let directive = settings.directive(std::env::var("RUST_LOG").ok().as_deref());
        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

        let dir = settings.log_dir();
        let appender = if settings.to_file { file_appender(&dir) } else { None };
        let file_layer = appender.map(|appender| {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            LOG_GUARD.set(guard).ok();
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(writer)
        });
        let file_enabled = file_layer.is_some();

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_timer(UtcTime::rfc_3339()))
            .with(file_layer)
            .init();

        match (settings.to_file, file_enabled) {
            (_, true) => info!("Logging at '{}', daily files under {}", directive, dir.display()),
            (true, false) => warn!("Logging at '{}' to stdout only, {} unavailable", directive, dir.display()),
            (false, _) => info!("Logging at '{}' to stdout only", directive),
        }
    });
}
