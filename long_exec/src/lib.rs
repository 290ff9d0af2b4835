//! # Longitudinal control library.
//!
//! This library allows other crates in the workspace, the integration tests
//! and the benchmarks to access items defined inside the longitudinal control
//! crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Ego vehicle state
pub mod ego;

/// The non-uniform time grid the plan is made over
pub mod horizon;

/// Lead vehicle preprocessing and extrapolation
pub mod lead;

/// Conversion of leads and cruise speed into obstacles
pub mod obstacle;

/// Costs, soft constraints and acceleration bounds of the control problem
pub mod sched;

/// Solver interface and the built in Gauss-Newton solver
pub mod solver;

/// Longitudinal control module - plans the ego's speed each cycle
pub mod long_ctrl;

/// Closed loop scenario simulation
pub mod sim;
