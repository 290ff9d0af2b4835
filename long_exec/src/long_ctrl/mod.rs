//! Longitudinal control module
//!
//! Runs one cycle of model predictive control per call to `proc`: the leads
//! and the cruise target are turned into an obstacle for every node of the
//! horizon, the solver is asked for the best trajectory keeping clear of
//! them, and the result is checked for crashes and divergence.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod seed;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use seed::*;
pub use state::*;

use crate::horizon::HorizonError;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during LongCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum LongCtrlError {
    #[error("Cannot load the LongCtrl parameters: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("The horizon is invalid: {0}")]
    InvalidHorizon(HorizonError),

    #[error("Invalid parameter: {0}")]
    InvalidParams(String),

    #[error("Cannot set up the LongCtrl archives: {0}")]
    ArchiveError(util::archive::ArchiveError),

    #[error("Input {0} is not finite ({1})")]
    NonFiniteInput(&'static str, f64),
}
