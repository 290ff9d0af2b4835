//! # Obstacle selection
//!
//! Every source that can limit the ego's speed is converted into the position
//! of an equivalent stationary obstacle. A moving lead at `x` with speed `v`
//! is as limiting as a wall at `x + stopping_equivalence(v)`, since that's
//! about where it would end up if it started braking now. The cruise speed is
//! turned into a virtual lead that runs away from the ego at the (rate
//! limited) cruise speed.
//!
//! At each node the closest of these obstacles is the one the plan has to
//! respect.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use serde::Serialize;
use util::maths::argmin;

use crate::{
    horizon::Horizon,
    lead::{extrapolate_lead, LeadKinematics, LeadState, ObstacleTrajectory},
    long_ctrl::Params,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Driver reaction time used in the following distance.
///
/// Units: seconds
pub const REACTION_TIME_S: f64 = 1.8;

/// Standard gravity.
///
/// Units: meters/second^2
pub const G_MSS: f64 = 9.81;

/// Distance always kept to a stopped obstacle.
///
/// Units: meters
pub const STOPPED_MARGIN_M: f64 = 4.0;

/// Fraction of the comfortable following distance below which the gap is
/// considered dangerous.
pub const DANGER_ZONE_RATIO: f64 = 7.0 / 8.0;

/// Constant part of how far below the ego speed the cruise target may sit.
const CRUISE_DECEL_OFFSET_MS: f64 = 1.0;

/// The cruise deceleration band grows with time at
/// `(v_ego + OFFSET) / SCALE` m/s^2, so faster cars may slow down sooner.
const CRUISE_DECEL_SPEED_OFFSET_MS: f64 = 15.0;
const CRUISE_DECEL_SPEED_SCALE_MS: f64 = 60.0;

/// Constant part of how far above the ego speed the cruise target may sit.
const CRUISE_ACCEL_OFFSET_MS: f64 = 0.7;

/// Growth of the cruise acceleration band with time.
const CRUISE_ACCEL_RATE_MSS: f64 = 0.7;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Which source produced the binding obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Source {
    Lead0,
    Lead1,
    Cruise,
}

/// A lead after preprocessing and extrapolation.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadPlan {
    /// False when the lead was missing and a synthetic fast lead stands in.
    pub valid: bool,

    pub kinematics: LeadKinematics,

    pub trajectory: ObstacleTrajectory,
}

/// Everything the controller needs to know about the obstacles this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ObstaclePlan {
    pub leads: [LeadPlan; 2],

    /// The binding obstacle position at each node.
    pub x_obstacle_m: Vec<f64>,

    /// Source of the binding obstacle at the first node.
    pub source: Source,

    /// Set if a lead's geometry was infeasible and had to be clamped.
    pub crashing: bool,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Distance a vehicle moving at `v_ms` still covers when it reacts and brakes
/// at 1 g.
pub fn stopping_equivalence(v_ms: f64) -> f64 {
    REACTION_TIME_S * v_ms + (v_ms * v_ms) / (2.0 * G_MSS)
}

/// Comfortable distance to keep from a stationary obstacle at ego speed
/// `v_ego_ms`.
pub fn safe_obstacle_distance(v_ego_ms: f64) -> f64 {
    2.0 * REACTION_TIME_S * v_ego_ms + (v_ego_ms * v_ego_ms) / (2.0 * G_MSS) + STOPPED_MARGIN_M
}

/// Distance at which the ego should follow a lead driving at `v_lead_ms`.
pub fn desired_follow_distance(v_ego_ms: f64, v_lead_ms: f64) -> f64 {
    safe_obstacle_distance(v_ego_ms) - stopping_equivalence(v_lead_ms)
}

/// Derivative of `safe_obstacle_distance` with respect to the ego speed.
pub fn safe_obstacle_distance_rate(v_ego_ms: f64) -> f64 {
    2.0 * REACTION_TIME_S + v_ego_ms / G_MSS
}

/// Equivalent stationary obstacle positions of an extrapolated lead.
pub fn lead_obstacle(trajectory: &ObstacleTrajectory) -> Vec<f64> {
    trajectory
        .x_m
        .iter()
        .zip(trajectory.v_ms.iter())
        .map(|(x, v)| x + stopping_equivalence(*v))
        .collect()
}

/// Equivalent stationary obstacle positions of the cruise target.
///
/// The cruise speed is first limited to a band around the current ego speed
/// which widens along the horizon, narrower on the deceleration side, so a
/// large change in set speed is tracked gradually.
pub fn cruise_obstacle(horizon: &Horizon, v_ego_ms: f64, v_cruise_ms: f64) -> Vec<f64> {
    horizon
        .times()
        .iter()
        .map(|t| {
            let lower = v_ego_ms
                - (CRUISE_DECEL_OFFSET_MS
                    + ((v_ego_ms + CRUISE_DECEL_SPEED_OFFSET_MS) / CRUISE_DECEL_SPEED_SCALE_MS) * t);
            let upper = v_ego_ms + (CRUISE_ACCEL_OFFSET_MS + CRUISE_ACCEL_RATE_MSS * t);
            let v_clipped = v_cruise_ms.max(lower).min(upper);

            t * v_clipped + safe_obstacle_distance(v_clipped)
        })
        .collect()
}

/// Pick the closest obstacle at each node.
///
/// Returns the binding positions and the source binding at the first node.
/// Ties go to the earlier source in `[Lead0, Lead1, Cruise]` order. A NaN at
/// the first node falls back to `Cruise`.
pub fn select(lead0: &[f64], lead1: &[f64], cruise: &[f64]) -> (Vec<f64>, Source) {
    let x_obstacle_m = lead0
        .iter()
        .zip(lead1.iter())
        .zip(cruise.iter())
        .map(|((l0, l1), c)| l0.min(*l1).min(*c))
        .collect();

    let source = match lead0
        .first()
        .zip(lead1.first())
        .zip(cruise.first())
        .and_then(|((l0, l1), c)| argmin(&[*l0, *l1, *c]))
    {
        Some(0) => Source::Lead0,
        Some(1) => Source::Lead1,
        _ => Source::Cruise,
    };

    (x_obstacle_m, source)
}

/// Run lead preprocessing, extrapolation and obstacle selection.
///
/// This is a pure function of its inputs, calling it twice with the same
/// arguments gives identical results.
pub fn plan_obstacles(
    params: &Params,
    horizon: &Horizon,
    v_ego_ms: f64,
    leads: &[LeadState; 2],
    v_cruise_ms: f64,
) -> ObstaclePlan {
    let mut crashing = false;

    let mut plan_lead = |lead: &LeadState| -> LeadPlan {
        let (valid, kinematics) = if lead.valid {
            let p = lead.preprocess(v_ego_ms, params.min_accel_mss);
            crashing |= p.infeasible;
            (true, p.kinematics)
        } else {
            (
                false,
                LeadKinematics::fast_lead(
                    v_ego_ms,
                    params.fake_lead_distance_m,
                    params.fake_lead_speed_margin_ms,
                    params.default_lead_accel_tau,
                ),
            )
        };

        LeadPlan {
            valid,
            kinematics,
            trajectory: extrapolate_lead(horizon, &kinematics),
        }
    };

    let leads = [plan_lead(&leads[0]), plan_lead(&leads[1])];

    let (x_obstacle_m, source) = select(
        &lead_obstacle(&leads[0].trajectory),
        &lead_obstacle(&leads[1].trajectory),
        &cruise_obstacle(horizon, v_ego_ms, v_cruise_ms),
    );

    trace!(
        "Obstacles: source {:?}, first {:.2} m, crashing {}",
        source,
        x_obstacle_m[0],
        crashing
    );

    ObstaclePlan {
        leads,
        x_obstacle_m,
        source,
        crashing,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_distances() {
        assert_eq!(stopping_equivalence(0.0), 0.0);
        assert_eq!(safe_obstacle_distance(0.0), STOPPED_MARGIN_M);

        let v = 20.0;
        assert!((stopping_equivalence(v) - (36.0 + 400.0 / 19.62)).abs() < 1e-9);
        assert!((safe_obstacle_distance(v) - (72.0 + 400.0 / 19.62 + 4.0)).abs() < 1e-9);

        // Following a lead at the ego's own speed leaves one reaction time
        // plus the margin
        assert!((desired_follow_distance(v, v) - (36.0 + 4.0)).abs() < 1e-9);
    }

    #[test]
    fn test_cruise_obstacle_band() {
        let h = Horizon::quadratic(32, 10.0).unwrap();

        // At t = 0 a far away set speed is limited to ego + 0.7
        let obs = cruise_obstacle(&h, 20.0, 40.0);
        assert!((obs[0] - safe_obstacle_distance(20.7)).abs() < 1e-9);

        // And a much lower set speed to ego - 1.0
        let obs = cruise_obstacle(&h, 20.0, 0.0);
        assert!((obs[0] - safe_obstacle_distance(19.0)).abs() < 1e-9);

        // Once inside the band the set speed itself is used
        let obs = cruise_obstacle(&h, 20.0, 25.0);
        assert!((obs[32] - (10.0 * 25.0 + safe_obstacle_distance(25.0))).abs() < 1e-9);
    }

    #[test]
    fn test_select() {
        let lead0 = [5.0, 9.0, 20.0];
        let lead1 = [7.0, 8.0, 30.0];
        let cruise = [6.0, 10.0, 10.0];

        let (x, source) = select(&lead0, &lead1, &cruise);
        assert_eq!(x, vec![5.0, 8.0, 10.0]);
        assert_eq!(source, Source::Lead0);

        // Only the first node decides the source
        let (_, source) = select(&[6.0, 1.0], &[6.0, 1.0], &[5.0, 20.0]);
        assert_eq!(source, Source::Cruise);

        // Ties go to the earlier source
        let (_, source) = select(&[6.0], &[5.0], &[5.0]);
        assert_eq!(source, Source::Lead1);
    }

    #[test]
    fn test_plan_no_leads() {
        let params = Params::default();
        let h = params.horizon().unwrap();

        let plan = plan_obstacles(&params, &h, 20.0, &[LeadState::invalid(); 2], 25.0);

        assert_eq!(plan.source, Source::Cruise);
        assert!(!plan.crashing);
        assert!(!plan.leads[0].valid);
        assert_eq!(plan.leads[0].kinematics.distance_m, 50.0);
        assert_eq!(plan.leads[0].kinematics.velocity_ms, 30.0);
        assert_eq!(plan.x_obstacle_m.len(), h.num_nodes());
    }

    #[test]
    fn test_plan_close_lead() {
        let params = Params::default();
        let h = params.horizon().unwrap();

        let leads = [LeadState::new(20.0, -5.0, 0.0, 1.5), LeadState::invalid()];
        let plan = plan_obstacles(&params, &h, 25.0, &leads, 30.0);

        assert_eq!(plan.source, Source::Lead0);
        assert!(!plan.crashing);
        assert!((plan.x_obstacle_m[0] - (20.0 + stopping_equivalence(20.0))).abs() < 1e-9);
    }
}
