//! # Lead vehicles
//!
//! Lead measurements arrive from the tracker as a relative distance, relative
//! velocity and an absolute acceleration estimate which decays over time.
//! This module cleans those measurements up and extrapolates them over the
//! planning horizon.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::horizon::Horizon;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Lowest lead acceleration estimate that will be trusted.
pub const LEAD_ACCEL_MIN_MSS: f64 = -10.0;

/// Highest lead acceleration estimate that will be trusted.
pub const LEAD_ACCEL_MAX_MSS: f64 = 5.0;

/// Leads slower than this are treated as stopped.
const LEAD_STOPPED_SPEED_MS: f64 = 0.1;

/// Added to the seed's gap so the closing-speed estimate never divides by zero.
const SEED_GAP_EPSILON_M: f64 = 0.01;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A tracked lead vehicle as reported by perception.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadState {
    /// If false the remaining fields are meaningless.
    pub valid: bool,

    /// Distance from the ego to the lead.
    ///
    /// Units: meters
    pub rel_distance_m: f64,

    /// Lead speed minus ego speed, negative when closing.
    ///
    /// Units: meters/second
    pub rel_velocity_ms: f64,

    /// Estimated absolute acceleration of the lead.
    ///
    /// Units: meters/second^2
    pub abs_accel_mss: f64,

    /// Decay constant of the acceleration estimate.
    ///
    /// Units: 1/seconds^2
    pub accel_decay_tau: f64,
}

/// Initial conditions of a lead ready to be extrapolated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LeadKinematics {
    pub distance_m: f64,
    pub velocity_ms: f64,
    pub accel_mss: f64,
    pub accel_decay_tau: f64,
}

/// Result of cleaning up a valid lead measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessedLead {
    pub kinematics: LeadKinematics,

    /// Set if the lead was closer than the ego can still brake for and its
    /// distance had to be clamped.
    pub infeasible: bool,
}

/// Position and velocity of an obstacle at each node of the horizon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObstacleTrajectory {
    /// Units: meters
    pub x_m: Vec<f64>,

    /// Units: meters/second, never negative
    pub v_ms: Vec<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LeadState {
    /// A valid lead measurement.
    pub fn new(
        rel_distance_m: f64,
        rel_velocity_ms: f64,
        abs_accel_mss: f64,
        accel_decay_tau: f64,
    ) -> Self {
        Self {
            valid: true,
            rel_distance_m,
            rel_velocity_ms,
            abs_accel_mss,
            accel_decay_tau,
        }
    }

    /// An invalid (absent) lead.
    pub fn invalid() -> Self {
        Self::default()
    }

    /// Clean up the measurement for use in planning.
    ///
    /// - The lead speed (ego speed plus relative speed) is floored at zero and
    ///   the acceleration is clamped to a plausible range.
    /// - If the lead is closer than the minimum distance the ego could brake
    ///   for at `min_accel_mss`, the distance is clamped to that minimum and
    ///   the result is flagged as infeasible. An immediate, unavoidable crash
    ///   would otherwise leave the optimisation without a feasible point.
    /// - Nearly stopped leads, and leads braking hard enough to stop almost
    ///   at once, are treated as stationary.
    pub fn preprocess(&self, v_ego_ms: f64, min_accel_mss: f64) -> PreprocessedLead {
        let mut distance_m = self.rel_distance_m;
        let mut velocity_ms = (v_ego_ms + self.rel_velocity_ms).max(0.0);
        let mut accel_mss = self.abs_accel_mss.clamp(LEAD_ACCEL_MIN_MSS, LEAD_ACCEL_MAX_MSS);

        let min_distance_m = min_brakeable_distance(v_ego_ms, velocity_ms, min_accel_mss);
        let infeasible = distance_m < min_distance_m;
        if infeasible {
            distance_m = min_distance_m;
        }

        if velocity_ms < LEAD_STOPPED_SPEED_MS || -accel_mss / 2.0 > velocity_ms {
            velocity_ms = 0.0;
            accel_mss = 0.0;
        }

        PreprocessedLead {
            kinematics: LeadKinematics {
                distance_m,
                velocity_ms,
                accel_mss,
                accel_decay_tau: self.accel_decay_tau,
            },
            infeasible,
        }
    }
}

impl LeadKinematics {
    /// A synthetic lead placed well ahead and driving away from the ego.
    ///
    /// Used in place of a missing lead so that the optimisation always sees
    /// an obstacle, without that obstacle ever constraining the plan.
    pub fn fast_lead(
        v_ego_ms: f64,
        distance_m: f64,
        speed_margin_ms: f64,
        accel_decay_tau: f64,
    ) -> Self {
        Self {
            distance_m,
            velocity_ms: v_ego_ms + speed_margin_ms,
            accel_mss: 0.0,
            accel_decay_tau,
        }
    }
}

impl ObstacleTrajectory {
    pub fn len(&self) -> usize {
        self.x_m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_m.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Minimum gap to a lead that the ego can still brake for.
///
/// Zero or negative when the lead is not slower than the ego.
pub fn min_brakeable_distance(v_ego_ms: f64, v_lead_ms: f64, min_accel_mss: f64) -> f64 {
    ((v_ego_ms + v_lead_ms) / 2.0) * (v_ego_ms - v_lead_ms) / (-min_accel_mss * 2.0)
}

/// Extrapolate a lead over the horizon.
///
/// The acceleration decays as `a0 * exp(-tau * t^2 / 2)`. Velocity is floored
/// at zero, a stopped lead stays stopped.
pub fn extrapolate_lead(horizon: &Horizon, lead: &LeadKinematics) -> ObstacleTrajectory {
    let mut x_m = Vec::with_capacity(horizon.num_nodes());
    let mut v_ms = Vec::with_capacity(horizon.num_nodes());

    let mut x = lead.distance_m;
    let mut v = lead.velocity_ms;
    x_m.push(x);
    v_ms.push(v);

    let t = horizon.times();
    for i in 1..horizon.num_nodes() {
        let dt = t[i] - t[i - 1];
        let a = lead.accel_mss * (-lead.accel_decay_tau * t[i].powi(2) / 2.0).exp();

        x += v * dt;
        v = (v + a * dt).max(0.0);

        x_m.push(x);
        v_ms.push(v);
    }

    ObstacleTrajectory { x_m, v_ms }
}

/// Closing-speed estimate of the acceleration needed to settle behind a lead.
///
/// This is the constant deceleration that cancels the current closing speed
/// over the current gap, on top of the lead's own acceleration, and never
/// positive.
pub fn approach_accel(v_ego_ms: f64, lead_distance_m: f64, lead_velocity_ms: f64, lead_accel_mss: f64) -> f64 {
    let closing_ms = v_ego_ms - lead_velocity_ms;
    (-closing_ms * closing_ms / (2.0 * lead_distance_m + SEED_GAP_EPSILON_M) + lead_accel_mss).min(0.0)
}
