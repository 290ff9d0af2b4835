//! Cyclic module interface
//!
//! A module is built once by `init` and then stepped once per cycle by
//! `proc`. Modules which archive their data can be stepped with
//! `proc_archived` so the executable doesn't have to remember to write the
//! archives itself.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;

// Internal imports
use crate::{archive::Archived, session::Session};

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// A cyclic module.
pub trait State: Sized {
    /// Data needed to build the module, usually a parameter file path.
    type InitData;
    type InitError;

    /// Data consumed by each cycle.
    type InputData;
    /// Data produced by each cycle.
    type OutputData;
    /// Flags and monitoring values produced by each cycle.
    type StatusReport;
    type ProcError;

    /// Build the module.
    ///
    /// The session is provided so that the module can open its archives.
    fn init(init_data: Self::InitData, session: &Session)
        -> Result<Self, Self::InitError>;

    /// Run one cycle.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;

    /// Run one cycle then write the module's archives.
    ///
    /// A failure to archive is logged but doesn't fail the cycle.
    fn proc_archived(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    where
        Self: Archived
    {
        let result = self.proc(input_data)?;

        if let Err(e) = self.write() {
            warn!("Could not write archives: {}", e);
        }

        Ok(result)
    }
}
