use crate::models::ConnectLog;
use crate::utils::{format_timestamp, now};
use anyhow::Result;
use log::{debug, error, info, trace, warn, LevelFilter};
use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_log::LogTracer;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

static INIT: Once = Once::new();

/// Initialize the global logger, filtered by `RUST_LOG`
/// This should be called once at the start of the application
pub fn init_logger() {
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_level(true)
            .with_ansi(true)
            .finish();
        install(subscriber);

        log::set_max_level(LevelFilter::Debug);
    });
}

/// Initialize logger with a fixed maximum level
pub fn init_logger_with_level(level: Level) {
    INIT.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_level(true)
            .with_ansi(true)
            .finish();
        install(subscriber);

        log::set_max_level(level_filter(level));
    });
}

/// Initialize logger with environment variable support
/// Uses RUST_LOG environment variable for configuration
pub fn init_logger_with_env() {
    INIT.call_once(|| {
        let level = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string())
            .parse::<LevelFilter>()
            .unwrap_or(LevelFilter::Info);

        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_level(true)
            .with_ansi(true)
            .finish();
        install(subscriber);

        log::set_max_level(level);
    });
}

// Set the global subscriber, then bridge `log` records into it
fn install<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: Failed to set global subscriber: {:?}", e);
    }

    if let Err(e) = LogTracer::init() {
        eprintln!("Warning: Failed to initialize LogTracer: {:?}", e);
    }
}

/// Initialize logger from the configured level string ("trace" .. "error")
///
/// Unknown level names fall back to `info`.
pub fn init_logger_with_config(log_level: &str) {
    init_logger_with_level(parse_level(log_level));
}

/// Parse a level name, falling back to `INFO`
pub fn parse_level(log_level: &str) -> Level {
    log_level.trim().parse::<Level>().unwrap_or(Level::INFO)
}

fn level_filter(level: Level) -> LevelFilter {
    level.as_str().parse().unwrap_or(LevelFilter::Info)
}

/// Log a dispatch transaction using log (bridged to tracing via tracing-log)
pub fn log_transaction(log_entry: &ConnectLog) -> Result<()> {
    let timestamp = format_timestamp(now());
    let log_message = serde_json::to_string_pretty(log_entry)?;
    let formatted_message = format!("[{}] TRANSACTION:\n{}", timestamp, log_message);

    // Debug level so it only appears in debug mode
    debug!("{}", formatted_message);

    Ok(())
}

/// Log an error message
pub fn log_error(message: &str) {
    error!("{}", message);
}

/// Log an info message
pub fn log_info(message: &str) {
    info!("{}", message);
}

/// Log a warning message
pub fn log_warning(message: &str) {
    warn!("{}", message);
}

/// Log a debug message
pub fn log_debug(message: &str) {
    debug!("{}", message);
}

/// Log a trace message
pub fn log_trace(message: &str) {
    trace!("{}", message);
}

/// Convenience macro for logging dispatch transactions
#[macro_export]
macro_rules! log_connect_transaction {
    ($log_entry:expr) => {
        if let Err(e) = $crate::logging::log_transaction($log_entry) {
            eprintln!("Failed to log transaction: {}", e);
        }
    };
}

/// Convenience macro for logging errors
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_error(&format!($($arg)*));
    };
}

/// Convenience macro for logging info messages
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_info(&format!($($arg)*));
    };
}

/// Convenience macro for logging warning messages
#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        $crate::logging::log_warning(&format!($($arg)*));
    };
}

/// Convenience macro for logging debug messages
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_debug(&format!($($arg)*));
    };
}

/// Convenience macro for logging trace messages
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::logging::log_trace(&format!($($arg)*));
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level(" WARN "), Level::WARN);
        assert_eq!(parse_level("loud"), Level::INFO);
    }

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter(Level::TRACE), LevelFilter::Trace);
        assert_eq!(level_filter(Level::ERROR), LevelFilter::Error);
    }

    #[test]
    fn test_log_transaction_serializes() {
        let url = url::Url::parse("http://example.com/").unwrap();
        let entry = ConnectLog::new(&url, None);
        assert!(log_transaction(&entry).is_ok());
    }
}
