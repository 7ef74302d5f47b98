use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, Local};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LoggingConfig, LoggingMode};
use crate::constants::{DEFAULT_LOG_LEVEL_CONSOLE, DEFAULT_LOG_LEVEL_FILE};

/// The main entry point to set up logging.  Should only be called once.
pub fn init_logging(cfg: LoggingConfig) {
    let maybe_log_file: Option<PathBuf> = match &cfg.logging_mode {
        LoggingMode::Directory(log_dir) => Some(log_file_in_dir(log_dir, &cfg.file_prefix)),
        LoggingMode::File(path_buf) => Some(path_buf.clone()),
        LoggingMode::Console => None,
    };

    // Attempt logging to a file, but fallback to console logging on error.
    if let Some(log_file) = maybe_log_file {
        if let Err(e) = init_logging_to_file(&log_file, cfg.use_json) {
            init_logging_to_console(&cfg);
            error!("Error logging to file {log_file:?} ({e}); falling back to console logging.");
        }
    } else {
        init_logging_to_console(&cfg);
    }

    info!("{}", &cfg.version);
}

fn init_logging_to_console(cfg: &LoggingConfig) {
    let default_level = cfg.console_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL_CONSOLE);

    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let fmt_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_default();

    let registry = tracing_subscriber::registry();
    if cfg.use_json {
        let _ = registry.with(fmt_layer_base.json().with_filter(fmt_filter)).try_init();
    } else {
        let _ = registry.with(fmt_layer_base.compact().with_filter(fmt_filter)).try_init();
    }
}

fn init_logging_to_file(path: &Path, use_json: bool) -> Result<(), std::io::Error> {
    use tracing_appender::{non_blocking, rolling};

    let (path, file_name) = match path.file_name() {
        Some(name) => (path.to_path_buf(), name.to_owned()),
        None => (path.join("recon.log"), OsStr::new("recon.log").to_owned()),
    };

    let log_directory = match path.parent() {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            parent.to_path_buf()
        },
        None => PathBuf::from("."),
    };

    // Fail early here so the caller can fall back to the console.
    std::fs::write(&path, [])?;

    let file_appender = rolling::never(log_directory, file_name);
    let (writer, guard) = non_blocking(file_appender);

    // The worker guard must outlive the subscriber or buffered lines are lost.
    static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
    let _ = FILE_GUARD.set(guard);

    let fmt_layer_base = tracing_subscriber::fmt::layer()
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer);
    let fmt_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_LEVEL_FILE))
        .unwrap_or_default();

    let registry = tracing_subscriber::registry();
    if use_json {
        let _ = registry.with(fmt_layer_base.json().with_filter(fmt_filter)).try_init();
    } else {
        let _ = registry.with(fmt_layer_base.with_filter(fmt_filter)).try_init();
    }

    Ok(())
}

/// Build `<prefix>_<YYYYMMDD>T<HHMMSS><mmm><+/-HHMM>_<pid>.log` in `dir`.
pub fn log_file_in_dir(dir: impl AsRef<Path>, prefix: &str) -> PathBuf {
    let now_local: DateTime<Local> = Local::now();
    let now_fixed: DateTime<FixedOffset> = now_local.with_timezone(now_local.offset());

    // ISO 8601 basic, filename-safe (no colons).
    let ts = now_fixed.format("%Y%m%dT%H%M%S%3f%z");

    let pid = std::process::id();
    dir.as_ref().join(format!("{prefix}_{ts}_{pid}.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name_shape() {
        let path = log_file_in_dir("/var/log/recon", "recon_cli");
        assert_eq!(path.parent(), Some(Path::new("/var/log/recon")));

        let name = path.file_name().unwrap().to_str().unwrap();
        let stem = name.strip_suffix(".log").unwrap();
        let (rest, pid) = stem.rsplit_once('_').unwrap();
        let (prefix, ts) = rest.rsplit_once('_').unwrap();
        assert_eq!(prefix, "recon_cli");
        assert_eq!(pid.parse::<u32>().unwrap(), std::process::id());
        assert!(DateTime::parse_from_str(ts, "%Y%m%dT%H%M%S%3f%z").is_ok());
    }
}
