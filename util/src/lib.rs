//! # Utilities
//!
//! Support code shared by the longitudinal control executable and its tests:
//! sessions and their archives, logging, parameter files, scenario scripts
//! and a few maths helpers.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

/// CSV archiving of per-cycle data
pub mod archive;

/// Host machine information
pub mod host;

/// Log dispatch to stdout and the session log file
pub mod logger;

/// Interpolation and clamping helpers
pub mod maths;

/// The cyclic module interface
pub mod module;

/// TOML parameter loading
pub mod params;

/// Timed event scripts
pub mod script_interpreter;

/// Session directories, the session clock and background saving
pub mod session;

/// Time conversions
pub mod time;
