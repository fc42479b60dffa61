//! Session logger: routes `tracing` events to a single file in the OS data
//! directory.
//!
//! The file is **truncated at each launch**, so it only ever holds output
//! from the most recent session.
//!
//! Log location for an app named `Mosaic`:
//!   Windows:  `%APPDATA%\Mosaic\mosaic.log`
//!   Linux:    `~/.local/share/Mosaic/mosaic.log`
//!   macOS:    `~/Library/Application Support/Mosaic/mosaic.log`
//!
//! The engine itself only emits events; installing a subscriber is the
//! host's choice. Panics are mirrored into the log before the default
//! handler runs.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Path of the current session log, once [`init`] has succeeded.
pub fn log_path() -> Option<&'static Path> {
    LOG_PATH.get().map(PathBuf::as_path)
}

/// Open (truncating) the session log and install it as the global
/// `tracing` subscriber. Later calls return the existing path.
pub fn init(app_name: &str) -> Option<&'static Path> {
    if let Some(path) = log_path() {
        return Some(path);
    }
    let path = log_file_path(app_name);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let mut file = match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            // Not fatal: the editor runs fine without a log.
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            return None;
        }
    };
    let _ = writeln!(file, "=== {} session started {} ===", app_name, human_timestamp());
    let _ = writeln!(file, "Log file: {}", path.display());
    let _ = writeln!(file);

    let fmt_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_line_number(true);
    // Another subscriber may already be installed (tests, host app).
    let _ = tracing_subscriber::registry()
        .with(LevelFilter::DEBUG)
        .with(fmt_layer)
        .try_init();

    let _ = LOG_PATH.set(path);

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!("PANIC: {}", info);
        prev(info);
    }));

    log_path()
}

fn log_file_path(app_name: &str) -> PathBuf {
    let file_name = format!("{}.log", app_name.to_lowercase().replace(' ', "_"));
    data_dir().join(app_name).join(file_name)
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

fn human_timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => format!("(unix {})", d.as_secs()),
        Err(_) => "(unknown time)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_lives_under_app_folder() {
        let path = log_file_path("Mosaic Editor");
        assert!(path.ends_with(Path::new("Mosaic Editor").join("mosaic_editor.log")));
    }
}
