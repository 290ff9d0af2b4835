//! # Optimal control solver interface
//!
//! The controller drives its solver only through the `OcpSolver` trait, so
//! any backend able to solve the problem defined in `sched` can be swapped
//! in. The solver is treated as a black box: it is seeded, fed the per-node
//! parameters, asked for one bounded solve and queried for the result. Any
//! non-zero status is a failure.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod gauss_newton;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::ego::EgoState;

pub use gauss_newton::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Solver status code, 0 is nominal.
pub type StatusCode = i32;

/// The solve completed.
pub const STATUS_SUCCESS: StatusCode = 0;

/// A NaN or infinity appeared in the problem or its solution.
pub const STATUS_NAN_DETECTED: StatusCode = 1;

/// The step's linear system could not be solved.
pub const STATUS_LINEAR_SOLVE_FAILURE: StatusCode = 4;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Time varying parameters of a single node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageParams {
    pub a_min_mss: f64,
    pub a_max_mss: f64,
    pub x_obstacle_m: f64,
}

/// A planned trajectory.
///
/// The state sequences have one entry per horizon node, the jerk has one per
/// interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    pub x_m: Vec<f64>,
    pub v_ms: Vec<f64>,
    pub a_mss: Vec<f64>,
    pub j_msss: Vec<f64>,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A parametric optimal control solver.
pub trait OcpSolver {
    /// Pin the state of the first node.
    fn set_initial_state(&mut self, x0: &EgoState);

    /// Set the parameters of node `step`.
    fn set_stage_parameters(&mut self, step: usize, params: StageParams);

    /// Replace the state guess at every node.
    fn warm_start(&mut self, trajectory: &[EgoState]);

    /// Run one bounded optimisation pass.
    fn solve(&mut self) -> StatusCode;

    /// The most recent solution.
    fn get_solution(&self) -> Solution;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Solution {
    /// An all zero solution over `num_steps` intervals.
    pub fn zeros(num_steps: usize) -> Self {
        Self {
            x_m: vec![0.0; num_steps + 1],
            v_ms: vec![0.0; num_steps + 1],
            a_mss: vec![0.0; num_steps + 1],
            j_msss: vec![0.0; num_steps],
        }
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.x_m.len()
    }

    /// State at node `i`, if there is one.
    pub fn state(&self, i: usize) -> Option<EgoState> {
        Some(EgoState::new(
            *self.x_m.get(i)?,
            *self.v_ms.get(i)?,
            *self.a_mss.get(i)?,
        ))
    }

    /// The state at every node.
    pub fn states(&self) -> Vec<EgoState> {
        (0..self.num_nodes()).filter_map(|i| self.state(i)).collect()
    }
}
