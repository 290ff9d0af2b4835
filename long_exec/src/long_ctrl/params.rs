//! Parameters structure for LongCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use super::LongCtrlError;
use crate::{
    horizon::{Horizon, HorizonError},
    sched::{AccelBounds, Weights},
    solver::SolverSettings,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Longitudinal control.
///
/// Any field missing from the parameter file takes its default value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Params {

    // ---- HORIZON ----

    /// Number of intervals in the horizon.
    pub horizon_num_steps: usize,

    /// Time of the final node. Nodes are spaced quadratically, densest at the
    /// start.
    ///
    /// Units: seconds
    pub horizon_duration_s: f64,

    // ---- LIMITS ----

    /// Hard braking limit, used as the lower acceleration bound whenever a
    /// lead is present and to decide if a lead can still be braked for.
    ///
    /// Units: meters/second^2
    pub min_accel_mss: f64,

    /// A planned gap to the first lead below this is a predicted crash.
    ///
    /// Units: meters
    pub crash_distance_m: f64,

    /// A change in lead distance between cycles larger than this is treated
    /// as a new lead.
    ///
    /// Units: meters
    pub lead_jump_threshold_m: f64,

    /// A change in ego speed between cycles larger than this discards the
    /// solver's guess.
    ///
    /// Units: meters/second
    pub reseed_speed_threshold_ms: f64,

    /// Minimum time between two divergence warnings.
    ///
    /// Units: seconds
    pub warning_period_s: f64,

    // ---- MISSING LEADS ----

    /// Distance at which a missing lead is placed.
    ///
    /// Units: meters
    pub fake_lead_distance_m: f64,

    /// How much faster than the ego a missing lead drives.
    ///
    /// Units: meters/second
    pub fake_lead_speed_margin_ms: f64,

    /// Acceleration decay constant of a missing lead.
    ///
    /// Units: 1/seconds^2
    pub default_lead_accel_tau: f64,

    // ---- CRUISE ----

    /// Cruise acceleration bounds used until the first cycle provides some.
    pub default_cruise_accel: AccelBounds,

    // ---- OPTIMISATION ----

    pub weights: Weights,

    pub solver: SolverSettings,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            horizon_num_steps: 32,
            horizon_duration_s: 10.0,
            min_accel_mss: -3.5,
            crash_distance_m: 1.5,
            lead_jump_threshold_m: 2.5,
            reseed_speed_threshold_ms: 1.0,
            warning_period_s: 5.0,
            fake_lead_distance_m: 50.0,
            fake_lead_speed_margin_ms: 10.0,
            default_lead_accel_tau: 1.5,
            default_cruise_accel: AccelBounds::new(-1.2, 1.2),
            weights: Weights::default(),
            solver: SolverSettings::default(),
        }
    }
}

impl Params {
    /// The horizon described by these parameters.
    pub fn horizon(&self) -> Result<Horizon, HorizonError> {
        Horizon::quadratic(self.horizon_num_steps, self.horizon_duration_s)
    }

    /// Check the parameters are consistent, returning the horizon if they
    /// are.
    pub fn validate(&self) -> Result<Horizon, LongCtrlError> {
        let horizon = self.horizon().map_err(LongCtrlError::InvalidHorizon)?;

        let invalid = |msg: &str| Err(LongCtrlError::InvalidParams(msg.into()));

        if !(self.min_accel_mss < 0.0) {
            return invalid("min_accel_mss must be negative");
        }
        if !(self.crash_distance_m >= 0.0) {
            return invalid("crash_distance_m must not be negative");
        }
        if !(self.lead_jump_threshold_m > 0.0) || !(self.reseed_speed_threshold_ms > 0.0) {
            return invalid("lead and speed jump thresholds must be positive");
        }
        if !(self.warning_period_s >= 0.0) {
            return invalid("warning_period_s must not be negative");
        }
        if !(self.default_cruise_accel.min_mss <= self.default_cruise_accel.max_mss) {
            return invalid("default_cruise_accel min is above max");
        }
        if self.solver.max_iterations == 0 {
            return invalid("solver.max_iterations must be at least 1");
        }

        let w = &self.weights;
        let all_weights = [
            w.x_ego,
            w.a_ego,
            w.j_ego,
            w.terminal_scale,
            w.danger_zone,
            w.v_min_penalty,
            w.a_min_penalty,
            w.a_max_penalty,
        ];
        if all_weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return invalid("weights must be finite and not negative");
        }

        Ok(horizon)
    }
}
