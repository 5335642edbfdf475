//! Session logger: backs the `log` facade with a single file in the OS data
//! directory.
//!
//! The file is **truncated (overwritten) at each launch**, so it only ever
//! contains output from the most-recent session.
//!
//! Default location:
//!   Windows:  `%APPDATA%\PaintFE\paintfe-engine.log`
//!   Linux:    `~/.local/share/PaintFE/paintfe-engine.log`
//!   macOS:    `~/Library/Application Support/PaintFE/paintfe-engine.log`
//!
//! Panics are mirrored into the same file by a hook installed in [`init`].

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{Level, LevelFilter, Log, Metadata, Record};

static LOGGER: OnceLock<SessionLogger> = OnceLock::new();

struct SessionLogger {
    file: Option<Mutex<File>>,
    path: Option<PathBuf>,
    stderr: bool,
}

impl SessionLogger {
    fn write_line(&self, line: &str) {
        if let Some(mutex) = &self.file
            && let Ok(mut file) = mutex.lock()
        {
            let _ = writeln!(file, "{}", line);
        }
        if self.stderr {
            eprintln!("{}", line);
        }
    }
}

impl Log for SessionLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.write_line(&format!("[{}] [{}] {}", timestamp(), level_tag(record.level()), record.args()));
    }

    fn flush(&self) {
        if let Some(mutex) = &self.file
            && let Ok(mut file) = mutex.lock()
        {
            let _ = file.flush();
        }
    }
}

fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static Path> {
    LOGGER.get().and_then(|l| l.path.as_deref())
}

/// Install the session logger. Only the first call has any effect.
///
/// * Creates (or truncates) the log file at `path`, or the default location.
/// * Mirrors every line to stderr when `stderr` is set.
/// * Installs a panic hook that writes the panic message to the log before
///   propagating to the default handler.
pub fn init(level: LevelFilter, path: Option<&Path>, stderr: bool) {
    let path = path.map(Path::to_path_buf).unwrap_or_else(log_file_path);

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    // Open file, truncating any previous session's content
    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(f) => Some(Mutex::new(f)),
        Err(e) => {
            // Log file unavailable, keep stderr only
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            None
        }
    };
    let opened = file.is_some();

    let logger = LOGGER.get_or_init(|| SessionLogger { file, path: opened.then_some(path), stderr });
    if log::set_logger(logger).is_err() {
        return;
    }
    log::set_max_level(level);

    logger.write_line(&format!("=== paintfe-engine session started {} ===", human_timestamp()));
    if let Some(path) = &logger.path {
        logger.write_line(&format!("Log file: {}", path.display()));
    }
    logger.write_line("");

    // Mirror panics into the log, then run the default handler
    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(logger) = LOGGER.get() {
            logger.write_line(&format!("[{}] [PANIC] {}", timestamp(), info));
        }
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("PaintFE").join("paintfe-engine.log")
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
    // Linux / fallback
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

/// Time of day, `HH:MM:SS` UTC.
fn timestamp() -> String {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => {
            let secs = d.as_secs();
            format!("{:02}:{:02}:{:02}", (secs % 86400) / 3600, (secs % 3600) / 60, secs % 60)
        }
        Err(_) => "??:??:??".to_string(),
    }
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
    fn level_tags_are_upper_case() {
        assert_eq!(level_tag(Level::Warn), "WARN");
        assert_eq!(level_tag(Level::Debug), "DEBUG");
    }

    #[test]
    fn timestamps_are_clock_shaped() {
        let ts = timestamp();
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.matches(':').count(), 2);
    }
}
