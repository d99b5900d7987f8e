//! Logging setup
//!
//! Installs the process-wide `tracing` subscriber. The host process owns
//! stderr, so a log file is the usual choice for an injected agent.

use crate::config::LogConfig;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Filter used when the configured level does not parse
const FALLBACK_LEVEL: &str = "info";

/// Install the global subscriber described by `config`
///
/// Returns `false` if a global subscriber was already installed. Never
/// panics: a bad level falls back to `info`, an unopenable file to stderr.
pub fn init_logging(config: &LogConfig) -> bool {
    let (filter, bad_level) = match EnvFilter::try_new(&config.level) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new(FALLBACK_LEVEL), Some(e.to_string())),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    let mut file_error = None;
    let installed = match &config.file {
        Some(path) => match open_log_file(path) {
            Ok(file) => builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .is_ok(),
            Err(e) => {
                file_error = Some(format!("{}: {}", path.display(), e));
                builder.with_writer(io::stderr).try_init().is_ok()
            }
        },
        None => builder.with_writer(io::stderr).try_init().is_ok(),
    };

    if installed {
        info!("Logging initialized (level: {})", config.level);
    }
    if let Some(e) = bad_level {
        warn!("Invalid log level '{}', using '{}': {}", config.level, FALLBACK_LEVEL, e);
    }
    if let Some(e) = file_error {
        warn!("Cannot open log file {}, logging to stderr", e);
    }

    installed
}

/// Open `path` for appending, creating it if needed
fn open_log_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
