//! Logging setup for the display layer and its embedders.
//!
//! Logs always go to a file at `warn` level (or higher if requested). Stdout logging is
//! enabled when `STOAT_LOG` or `RUST_LOG` is set, or in debug builds.
//!
//! ## Environment Variables
//!
//! 1. **`STOAT_LOG`** (highest priority) - Stoat-specific logging control
//! 2. **`RUST_LOG`** - Standard tracing environment variable
//! 3. **Default** - `warn` globally, `info` for stoat crates
//!
//! ## Log File Location
//!
//! Default: `<data_local_dir>/stoat/logs/stoat-<pid>.log`
//! - macOS: `~/Library/Application Support/stoat/logs/stoat-12345.log`
//! - Linux: `~/.local/share/stoat/logs/stoat-12345.log`
//!
//! Override with [`LogConfig::log_file_path`] or `STOAT_LOG_FILE`.

use std::{
    env,
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Crates whose events are raised to `info` (or to the bare `STOAT_LOG` level).
const STOAT_CRATES: &[&str] = &["stoat_display_layer", "stoat_log"];

/// Returned from [`init`]; must be held alive to ensure log file flushing.
pub struct LogGuard {
    _file_guard: WorkerGuard,
    pub log_file: PathBuf,
}

#[derive(Debug, Default, Clone)]
pub struct LogConfig {
    /// A file path, or a directory to place `stoat-<pid>.log` in.
    pub log_file_path: Option<PathBuf>,
}

/// Initialize logging.
///
/// The returned [`LogGuard`] must be held for the lifetime of the program --
/// dropping it flushes and stops the background file writer.
pub fn init(config: LogConfig) -> Result<LogGuard, BoxError> {
    let override_path = config
        .log_file_path
        .or_else(|| env::var_os("STOAT_LOG_FILE").map(PathBuf::from));
    let (log_dir, filename) = resolve_log_path(override_path);

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, &filename);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_filter(create_file_filter());

    let stdout_enabled =
        env::var("STOAT_LOG").is_ok() || env::var("RUST_LOG").is_ok() || cfg!(debug_assertions);
    let stdout_layer = stdout_enabled.then(|| fmt::layer().with_filter(create_filter()));

    Registry::default()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()?;

    Ok(LogGuard {
        _file_guard: file_guard,
        log_file: log_dir.join(filename),
    })
}

/// Initialize logging for tests.
///
/// Stdout only, with the test writer so output is captured per test. Safe to call from
/// every test; later calls are no-ops.
pub fn test() {
    let _ = fmt()
        .with_env_filter(create_filter())
        .with_test_writer()
        .try_init();
}

fn resolve_log_path(override_path: Option<PathBuf>) -> (PathBuf, String) {
    let filename = format!("stoat-{}.log", std::process::id());

    if let Some(path) = override_path {
        if path.extension().is_some() {
            let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or(filename);
            return (dir, name);
        }
        return (path, filename);
    }

    let dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stoat")
        .join("logs");
    (dir, filename)
}

/// File filter: the user-specified level if set, otherwise `warn`.
fn create_file_filter() -> EnvFilter {
    if env::var("STOAT_LOG").is_ok() || env::var("RUST_LOG").is_ok() {
        return create_filter();
    }
    EnvFilter::new("warn")
}

/// `STOAT_LOG` > `RUST_LOG` > `warn` globally with `info` for stoat crates.
fn create_filter() -> EnvFilter {
    if let Ok(stoat_log) = env::var("STOAT_LOG") {
        return expand_stoat_log(&stoat_log);
    }
    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }
    EnvFilter::new(directives("info"))
}

/// `STOAT_LOG=debug` becomes `warn,stoat_display_layer=debug,...`; anything with
/// module syntax is used as-is.
fn expand_stoat_log(stoat_log: &str) -> EnvFilter {
    if stoat_log.contains('=') || stoat_log.contains(':') || stoat_log.contains(',') {
        return EnvFilter::new(stoat_log);
    }
    EnvFilter::new(directives(stoat_log))
}

fn directives(level: &str) -> String {
    let mut directives = String::from("warn");
    for name in STOAT_CRATES {
        directives.push_str(&format!(",{name}={level}"));
    }
    directives
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_path_override_splits_dir_and_name() {
        let (dir, name) = resolve_log_path(Some(PathBuf::from("/tmp/logs/editor.log")));
        assert_eq!(dir, PathBuf::from("/tmp/logs"));
        assert_eq!(name, "editor.log");
    }

    #[test]
    fn directory_override_uses_pid_filename() {
        let (dir, name) = resolve_log_path(Some(PathBuf::from("/tmp/logs")));
        assert_eq!(dir, PathBuf::from("/tmp/logs"));
        assert_eq!(name, format!("stoat-{}.log", std::process::id()));
    }

    #[test]
    fn default_directives_cover_every_crate() {
        assert_eq!(
            directives("debug"),
            "warn,stoat_display_layer=debug,stoat_log=debug"
        );
    }
}
