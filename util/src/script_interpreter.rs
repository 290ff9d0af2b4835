//! # Script interpreter module
//!
//! This module provides an interpreter for timed scripts. A script is a text
//! file made of lines of the form
//!
//! ```text
//! 1.5: {"SetCruise": {"speed_ms": 25.0}};
//! ```
//!
//! where the number is the time (in seconds) at which the JSON payload
//! becomes due. The payload is deserialised into the event type chosen by the
//! caller.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::VecDeque;
use std::path::Path;
use std::fs;
use regex::RegexBuilder;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An event which is scripted to occur at a specific time.
struct Scripted<T> {
    /// The time the event is due at
    exec_time_s: f64,

    event: T
}

/// A script interpreter.
///
/// After initialising with the path to the script use `.get_pending` to
/// acquire the events that are due.
pub struct ScriptInterpreter<T> {
    events: VecDeque<Scripted<T>>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0}")]
    ScriptNotFound(String),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script is empty (or is so bad it can't be read)")]
    ScriptEmpty,

    #[error(
        "Script contains an invalid timestamp: {0}. \
        Should be a float (like 1.0)")]
    InvalidTimestamp(String),

    #[error("Script contains an invalid event at {0} s: {1}")]
    InvalidEvent(f64, serde_json::Error),

    #[error("Script events are not in time order (found {1} s after {0} s)")]
    OutOfOrder(f64, f64),

    #[error("Could not build the script parser: {0}")]
    ParserError(regex::Error)
}

/// Result of polling the interpreter.
#[derive(Debug, PartialEq)]
pub enum Pending<T> {
    None,
    Some(Vec<T>),
    EndOfScript
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: DeserializeOwned> ScriptInterpreter<T> {

    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {

        // Check that the script file exists.
        if !script_path.as_ref().exists() {
            return Err(ScriptError::ScriptNotFound(
                script_path.as_ref().display().to_string()));
        }

        let script = fs::read_to_string(script_path)
            .map_err(ScriptError::ScriptLoadError)?;

        Self::from_script(&script)
    }

    /// Create a new interpreter from the script's text.
    pub fn from_script(script: &str) -> Result<Self, ScriptError> {
        let mut events: VecDeque<Scripted<T>> = VecDeque::new();

        // Each match is a `time: payload;` pair
        let re = RegexBuilder::new(r"^\s*(\d+(\.\d+)?)\s*:\s*([^;]*);")
            .multi_line(true)
            .build()
            .map_err(ScriptError::ParserError)?;

        for cap in re.captures_iter(script) {
            let exec_time_s: f64 = cap[1]
                .parse()
                .map_err(|e| ScriptError::InvalidTimestamp(format!("{}", e)))?;

            if let Some(prev) = events.back() {
                if exec_time_s < prev.exec_time_s {
                    return Err(ScriptError::OutOfOrder(prev.exec_time_s, exec_time_s));
                }
            }

            let event = serde_json::from_str(&cap[3])
                .map_err(|e| ScriptError::InvalidEvent(exec_time_s, e))?;

            events.push_back(Scripted { exec_time_s, event });
        }

        if events.is_empty() {
            return Err(ScriptError::ScriptEmpty)
        }

        Ok(ScriptInterpreter { events })
    }
}

impl<T> ScriptInterpreter<T> {

    /// Return the events due at or before `current_time_s`.
    pub fn get_pending(&mut self, current_time_s: f64) -> Pending<T> {

        if self.events.is_empty() {
            return Pending::EndOfScript
        }

        let mut due = vec![];

        while let Some(front) = self.events.front() {
            if front.exec_time_s > current_time_s {
                break;
            }
            if let Some(s) = self.events.pop_front() {
                due.push(s.event);
            }
        }

        if due.is_empty() {
            Pending::None
        }
        else {
            Pending::Some(due)
        }
    }

    /// Get the number of events remaining in the script
    pub fn get_num_events(&self) -> usize {
        self.events.len()
    }

    /// Get the length of the script in seconds
    pub fn get_duration(&self) -> f64 {
        self.events.back().map_or(0f64, |s| s.exec_time_s)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    enum Event {
        Go { speed: f64 },
        Stop
    }

    const SCRIPT: &str = "
        0.0: {\"Go\": {\"speed\": 3.0}};
        0.5: \"Stop\";
        2: {\"Go\": {\"speed\": 1.0}};
    ";

    #[test]
    fn test_pending_events() {
        let mut si: ScriptInterpreter<Event> = ScriptInterpreter::from_script(SCRIPT).unwrap();

        assert_eq!(si.get_num_events(), 3);
        assert_eq!(si.get_duration(), 2.0);

        assert_eq!(si.get_pending(0.0), Pending::Some(vec![Event::Go { speed: 3.0 }]));
        assert_eq!(si.get_pending(0.2), Pending::None);
        assert_eq!(
            si.get_pending(5.0),
            Pending::Some(vec![Event::Stop, Event::Go { speed: 1.0 }])
        );
        assert_eq!(si.get_pending(6.0), Pending::EndOfScript);
    }

    #[test]
    fn test_bad_scripts() {
        assert!(matches!(
            ScriptInterpreter::<Event>::from_script("nothing here"),
            Err(ScriptError::ScriptEmpty)
        ));
        assert!(matches!(
            ScriptInterpreter::<Event>::from_script("1.0: {\"Fly\": {}};"),
            Err(ScriptError::InvalidEvent(_, _))
        ));
        assert!(matches!(
            ScriptInterpreter::<Event>::from_script("2.0: \"Stop\";\n1.0: \"Stop\";"),
            Err(ScriptError::OutOfOrder(_, _))
        ));
    }
}
