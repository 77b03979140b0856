use anyhow::{anyhow, Result};
use std::fs::{File, OpenOptions};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_PATH_ENV: &str = "ASKDOC_LOG_PATH";
pub const LOG_FILTER_ENV: &str = "ASKDOC_LOG";
const DEFAULT_LOG_PATH: &str = "/tmp/askdoc.log";
const DEFAULT_FILTER: &str = "askdoc=info";

/// Installs the global tracing subscriber.
///
/// Logs go to `ASKDOC_LOG_PATH` when set. Without it, an interactive terminal
/// gets a default log file so log lines never interleave with streamed
/// answers; a redirected stderr receives them directly.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if let Some(path) = resolve_log_path(std::io::stderr().is_terminal()) {
        match open_log_file(&path) {
            Ok(file) => {
                return builder
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init()
                    .map_err(|error| anyhow!("failed to install logger: {error}"));
            }
            Err(error) => {
                eprintln!("cannot open log file {}: {error}", path.display());
            }
        }
    }

    builder
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("failed to install logger: {error}"))
}

pub fn resolve_log_path(stderr_is_terminal: bool) -> Option<PathBuf> {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| stderr_is_terminal.then(|| PathBuf::from(DEFAULT_LOG_PATH)))
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
