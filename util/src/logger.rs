//! Logging setup
//!
//! Log lines go to both stdout and the session's log file, stamped with the
//! number of seconds since the session started. The minimum level can be
//! overridden at run time through the `LONG_LOG_LEVEL` environment variable.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{info, Level};
use std::env;
use std::str::FromStr;
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Environment variable overriding the executable's log level.
pub const LOG_LEVEL_ENV_VAR: &str = "LONG_LOG_LEVEL";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("The log level must include INFO messages, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("{} is not a log level: {0}", LOG_LEVEL_ENV_VAR)]
    InvalidEnvLevel(String),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// The log level requested through `LONG_LOG_LEVEL`, or `default` if it
/// isn't set.
pub fn level_from_env(default: LevelFilter) -> Result<LevelFilter, LoggerInitError> {
    match env::var(LOG_LEVEL_ENV_VAR) {
        Ok(s) => parse_level(&s),
        Err(_) => Ok(default)
    }
}

/// Initialise the logger for this execution.
///
/// Must be called at most once, the second call fails as the global logger
/// is already set.
pub fn logger_init(
    min_level: LevelFilter,
    session: &Session
) -> Result<(), LoggerInitError> {

    if min_level < Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level))
    }

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFileInitError)?;

    fern::Dispatch::new()
        .format(|out, message, record| {
            let stamp = format!(
                "[{:10.6} {}]",
                session::get_elapsed_seconds(),
                level_tag(record.level())
            );

            // Debug and trace come from deep inside the modules, so say where
            if record.level() > Level::Info {
                out.finish(format_args!("{} {}: {}", stamp, record.target(), message))
            }
            else {
                out.finish(format_args!("{} {}", stamp, message))
            }
        })
        .level(min_level)
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised at {:?}", min_level);
    if let Ok(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log file: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn parse_level(s: &str) -> Result<LevelFilter, LoggerInitError> {
    LevelFilter::from_str(s.trim())
        .map_err(|_| LoggerInitError::InvalidEnvLevel(s.to_string()))
}

/// Three letter, coloured tag for a level.
fn level_tag(level: Level) -> ColoredString {
    match level {
        Level::Trace => "TRC".dimmed().italic(),
        Level::Debug => "DBG".dimmed(),
        Level::Info  => "INF".normal(),
        Level::Warn  => "WRN".yellow(),
        Level::Error => "ERR".red().bold()
    }
}
