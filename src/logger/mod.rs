//! Logger module
//!
//! Provides logging utilities for the image host including:
//! - Leveled, timestamped application lines
//! - Access logging with multiple formats
//! - Size-rotated log files next to console output
//!
//! Until `init()` runs, lines go straight to the console unfiltered.

mod format;
pub mod writer;

pub use format::AccessLogEntry;

use crate::config::Config;
use chrono::Local;
use std::net::SocketAddr;
use std::str::FromStr;

/// Severity, most severe first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl Level {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARNING",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" | "trace" => Ok(Self::Debug),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Initialize the logger with configuration
///
/// Should be called once at application startup, after the log directory exists.
pub fn init(config: &Config) -> std::io::Result<()> {
    let level = config.logging.level.parse::<Level>().unwrap_or_else(|e| {
        eprintln!("[logger] {e}, falling back to info");
        Level::Info
    });
    let file = writer::RotatingFile::open(
        config.logging.log_path(),
        config.logging.max_log_size,
        config.logging.backup_count,
    )?;
    writer::init(writer::LogWriter::new(level, Some(file)))
}

fn write(level: Level, message: &str) {
    #[cfg(test)]
    capture::record(level, message);

    let line = format::format_line(&Local::now(), level, message);
    match writer::get() {
        Some(w) => w.write(level, &line),
        None if level <= Level::Warn => eprintln!("{line}"),
        None => println!("{line}"),
    }
}

pub fn log_info(message: &str) {
    write(Level::Info, message);
}

pub fn log_warning(message: &str) {
    write(Level::Warn, message);
}

pub fn log_error(message: &str) {
    write(Level::Error, message);
}

pub fn log_debug(message: &str) {
    write(Level::Debug, message);
}

/// Log a terminal request outcome under its `Action:` tag
pub fn log_action(level: Level, action: &str) {
    write(level, &format!("Action: {action}"));
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    write(Level::Info, &entry.format(format));
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    log_info("======================================");
    log_info("Image host started");
    log_info(&format!("Listening on: http://{addr}"));
    log_info(&format!(
        "Static files: {}",
        config.storage.static_dir.display()
    ));
    log_info(&format!("Uploads: {}", config.storage.upload_dir.display()));
    log_info(&format!(
        "Max upload size: {} bytes, allowed: {}",
        config.storage.max_file_size,
        config.storage.allowed_extensions.join(", ")
    ));
    log_info(&format!("Log file: {}", config.logging.log_path().display()));
    if let Some(workers) = config.server.workers {
        log_info(&format!("Worker threads: {workers}"));
    }
    log_info("======================================");
}

pub fn log_server_stopped() {
    log_info("Server stopped.");
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    log_error(&format!("Failed to serve connection: {err:?}"));
}

/// Per-thread record of logged messages for handler tests
#[cfg(test)]
pub mod capture {
    use super::Level;
    use std::cell::RefCell;

    thread_local! {
        static LINES: RefCell<Option<Vec<(Level, String)>>> = const { RefCell::new(None) };
    }

    pub fn start() {
        LINES.with(|lines| *lines.borrow_mut() = Some(Vec::new()));
    }

    /// Stop recording and return everything logged on this thread since `start`
    pub fn finish() -> Vec<(Level, String)> {
        LINES.with(|lines| lines.borrow_mut().take().unwrap_or_default())
    }

    pub(super) fn record(level: Level, message: &str) {
        LINES.with(|lines| {
            if let Some(lines) = lines.borrow_mut().as_mut() {
                lines.push((level, message.to_string()));
            }
        });
    }
}
