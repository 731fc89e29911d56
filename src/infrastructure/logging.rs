//! Logging system configuration and initialization
//!
//! - Console and file output, each optional
//! - Plain or JSON file format
//! - The previous log file is renamed with its timestamp on startup
//! - Old log files beyond `max_files` are removed
//! - Timestamps in a configurable fixed UTC offset

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::{FixedOffset, Offset, Utc};
use lazy_static::lazy_static;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

/// Active log file; older ones carry a timestamp suffix.
pub const LOG_FILE_NAME: &str = "price-harvester.log";

// Keeps the non-blocking file writers alive for the life of the process
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

type FilteredRegistry = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

/// Timestamps in a fixed offset from UTC
#[derive(Debug, Clone, Copy)]
struct OffsetTimeFormatter {
    offset: FixedOffset,
}

impl OffsetTimeFormatter {
    fn from_minutes(minutes: i32) -> Self {
        Self {
            offset: FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix()),
        }
    }
}

impl FormatTime for OffsetTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Utc::now().with_timezone(&self.offset);
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Log directory: the configured one, else `logs/` next to the executable.
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    if let Some(dir) = &config.directory {
        return dir.clone();
    }
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Rename the previous run's log file with its timestamp.
fn rotate_existing_log_file(log_dir: &Path, offset: FixedOffset) -> Result<()> {
    let log_file_path = log_dir.join(LOG_FILE_NAME);
    if !log_file_path.exists() {
        return Ok(());
    }

    let metadata = std::fs::metadata(&log_file_path).context("Failed to get log file metadata")?;
    let file_time = metadata
        .modified()
        .or_else(|_| metadata.created())
        .unwrap_or_else(|_| std::time::SystemTime::now());
    let stamp = chrono::DateTime::<Utc>::from(file_time).with_timezone(&offset);

    let stem = LOG_FILE_NAME.trim_end_matches(".log");
    let rotated = log_dir.join(format!("{}.{}.log", stem, stamp.format("%Y%m%dT%H%M%S")));
    std::fs::rename(&log_file_path, &rotated)
        .with_context(|| format!("Failed to rotate log file {} to {}", log_file_path.display(), rotated.display()))?;
    Ok(())
}

/// Remove the oldest `.log` files beyond `max_files`.
fn cleanup_old_logs(log_dir: &Path, max_files: usize) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path.extension().and_then(|e| e.to_str()) == Some("log");
        if path.is_file() && is_log {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(max_files) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}

/// Filter from `RUST_LOG`, else the configured level plus per-module overrides.
fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::new(&config.level);
    if !config.level.eq_ignore_ascii_case("trace") {
        for (module, level) in &config.module_filters {
            let directive = format!("{module}={level}")
                .parse()
                .with_context(|| format!("Invalid log filter {module}={level}"))?;
            filter = filter.add_directive(directive);
        }
    }
    for target in ["price_harvester", "price_harvester_lib"] {
        filter = filter.add_directive(format!("{target}={}", config.level).parse()?);
    }
    Ok(filter)
}

/// Initialize logging with the given configuration.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let timer = OffsetTimeFormatter::from_minutes(config.utc_offset_minutes);
    let log_dir = get_log_directory(config);
    let mut removed = 0;
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.file_output {
        std::fs::create_dir_all(&log_dir).with_context(|| format!("Failed to create log directory {log_dir:?}"))?;
        rotate_existing_log_file(&log_dir, timer.offset)?;
        if config.auto_cleanup_logs {
            removed = cleanup_old_logs(&log_dir, config.max_files as usize)?;
        }

        let (file_writer, file_guard) = non_blocking(rolling::never(&log_dir, LOG_FILE_NAME));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry is poisoned"))?
            .push(file_guard);

        let file_layer = fmt::Layer::new()
            .with_writer(file_writer)
            .with_timer(timer)
            .with_ansi(false);
        layers.push(if config.json_format {
            file_layer.json().with_target(true).with_file(true).with_line_number(true).boxed()
        } else {
            file_layer.with_target(false).boxed()
        });
    }

    if config.console_output {
        layers.push(
            fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_timer(timer)
                .with_target(false)
                .boxed(),
        );
    }

    Registry::default()
        .with(build_filter(config)?)
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {e}"))?;

    info!("Logging system initialized (level: {})", config.level);
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
        if removed > 0 {
            info!("Removed {} old log file(s), keeping {}", removed, config.max_files);
        }
    }
    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Price Harvester ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {} ({})", std::env::consts::OS, std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}
