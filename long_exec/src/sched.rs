//! # Cost and constraint scheduling
//!
//! Defines the optimal control problem solved each cycle:
//!
//! - Stage costs penalise the following distance error (relative to
//!   `safe_obstacle_distance`), the acceleration and the jerk. Each term is
//!   normalised by `v + 10` so that errors weigh more at low speed, where the
//!   same distance error is a larger share of the gap.
//! - Soft constraints keep the speed non-negative, the acceleration within
//!   bounds and the gap out of the danger zone (`7/8` of the comfortable
//!   distance). They are enforced with large quadratic slack penalties, so
//!   the problem stays solvable when they can't all be met.
//!
//! The acceleration bounds are the only part re-derived every cycle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::{
    horizon::Horizon,
    obstacle::{safe_obstacle_distance, safe_obstacle_distance_rate, DANGER_ZONE_RATIO},
    solver::StageParams,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Speed offset of the cost normalisation.
///
/// Units: meters/second
pub const COST_SPEED_OFFSET_MS: f64 = 10.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Cost and penalty weights of the problem, fixed at initialisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    /// Following distance error weight
    pub x_ego: f64,

    /// Acceleration weight
    pub a_ego: f64,

    /// Jerk weight
    pub j_ego: f64,

    /// Scale applied to the distance and acceleration weights at the final
    /// node, which has no jerk term.
    pub terminal_scale: f64,

    /// Slack penalty of the danger zone constraint
    pub danger_zone: f64,

    /// Slack penalty of the non-negative speed constraint
    pub v_min_penalty: f64,

    /// Slack penalty of the acceleration lower bound
    pub a_min_penalty: f64,

    /// Slack penalty of the acceleration upper bound
    pub a_max_penalty: f64,
}

/// Acceleration bounds applied over the whole horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelBounds {
    /// Units: meters/second^2
    pub min_mss: f64,

    /// Units: meters/second^2
    pub max_mss: f64,
}

/// A scalar function of the stage state with its gradient with respect to
/// `[position, velocity, acceleration]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Term {
    pub value: f64,
    pub grad: [f64; 3],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Weights {
    fn default() -> Self {
        Self {
            x_ego: 80.0,
            a_ego: 0.1,
            j_ego: 0.2,
            terminal_scale: 3.0 / 5.0,
            danger_zone: 1e3,
            v_min_penalty: 1e8,
            a_min_penalty: 1e6,
            a_max_penalty: 1e6,
        }
    }
}

impl AccelBounds {
    pub fn new(min_mss: f64, max_mss: f64) -> Self {
        Self { min_mss, max_mss }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Acceleration bounds for this cycle.
///
/// With no valid lead the cruise bounds apply unchanged. With a lead the
/// lower bound drops to the hard braking limit `min_accel_mss`, so the ego
/// can brake for the lead harder than it would for a lower set speed.
pub fn accel_bounds(any_lead_valid: bool, cruise: AccelBounds, min_accel_mss: f64) -> AccelBounds {
    AccelBounds {
        min_mss: if any_lead_valid { min_accel_mss } else { cruise.min_mss },
        max_mss: cruise.max_mss,
    }
}

/// Per-node parameters for the solver.
pub fn stage_parameters(horizon: &Horizon, bounds: AccelBounds, x_obstacle_m: &[f64]) -> Vec<StageParams> {
    x_obstacle_m
        .iter()
        .take(horizon.num_nodes())
        .map(|x| StageParams {
            a_min_mss: bounds.min_mss,
            a_max_mss: bounds.max_mss,
            x_obstacle_m: *x,
        })
        .collect()
}

/// Following distance error, `((x_obs - x) - safe(v)) / (v + 10)`.
pub fn distance_cost(x_m: f64, v_ms: f64, x_obstacle_m: f64) -> Term {
    gap_term(x_m, v_ms, x_obstacle_m, 1.0)
}

/// Danger zone constraint, `((x_obs - x) - 7/8 safe(v)) / (v + 10) >= 0`.
pub fn danger_zone(x_m: f64, v_ms: f64, x_obstacle_m: f64) -> Term {
    gap_term(x_m, v_ms, x_obstacle_m, DANGER_ZONE_RATIO)
}

/// Acceleration cost, `a * (v + 10)`.
pub fn accel_cost(v_ms: f64, a_mss: f64) -> Term {
    Term {
        value: a_mss * (v_ms + COST_SPEED_OFFSET_MS),
        grad: [0.0, a_mss, v_ms + COST_SPEED_OFFSET_MS],
    }
}

/// Jerk cost, `j * (v + 10)`.
///
/// Returns the value and its derivatives with respect to the speed and the
/// jerk.
pub fn jerk_cost(v_ms: f64, j_msss: f64) -> (f64, f64, f64) {
    (
        j_msss * (v_ms + COST_SPEED_OFFSET_MS),
        j_msss,
        v_ms + COST_SPEED_OFFSET_MS,
    )
}

/// Speed constraint, `v >= 0`.
pub fn speed_lower(v_ms: f64) -> Term {
    Term {
        value: v_ms,
        grad: [0.0, 1.0, 0.0],
    }
}

/// Acceleration lower bound constraint, `a - a_min >= 0`.
pub fn accel_lower(a_mss: f64, a_min_mss: f64) -> Term {
    Term {
        value: a_mss - a_min_mss,
        grad: [0.0, 0.0, 1.0],
    }
}

/// Acceleration upper bound constraint, `a_max - a >= 0`.
pub fn accel_upper(a_mss: f64, a_max_mss: f64) -> Term {
    Term {
        value: a_max_mss - a_mss,
        grad: [0.0, 0.0, -1.0],
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn gap_term(x_m: f64, v_ms: f64, x_obstacle_m: f64, ratio: f64) -> Term {
    let den = v_ms + COST_SPEED_OFFSET_MS;
    let err = (x_obstacle_m - x_m) - ratio * safe_obstacle_distance(v_ms);
    let d_err_dv = -ratio * safe_obstacle_distance_rate(v_ms);

    Term {
        value: err / den,
        grad: [-1.0 / den, (d_err_dv * den - err) / (den * den), 0.0],
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// Central difference check of a term's gradient
    fn check_grad<F: Fn(f64, f64, f64) -> Term>(f: F, state: [f64; 3]) {
        let h = 1e-6;
        let t = f(state[0], state[1], state[2]);
        for i in 0..3 {
            let mut up = state;
            let mut down = state;
            up[i] += h;
            down[i] -= h;
            let fd = (f(up[0], up[1], up[2]).value - f(down[0], down[1], down[2]).value) / (2.0 * h);
            assert!(
                (fd - t.grad[i]).abs() < 1e-5,
                "component {}: finite difference {} vs analytic {}",
                i,
                fd,
                t.grad[i]
            );
        }
    }

    #[test]
    fn test_gradients() {
        let state = [3.0, 17.0, -0.8];
        check_grad(|x, v, _| distance_cost(x, v, 95.0), state);
        check_grad(|x, v, _| danger_zone(x, v, 40.0), state);
        check_grad(|_, v, a| accel_cost(v, a), state);
        check_grad(|_, v, _| speed_lower(v), state);
        check_grad(|_, _, a| accel_lower(a, -3.5), state);
        check_grad(|_, _, a| accel_upper(a, 1.2), state);
    }

    #[test]
    fn test_distance_cost_sign() {
        // Exactly at the comfortable distance there is no error
        let v = 20.0;
        let t = distance_cost(0.0, v, safe_obstacle_distance(v));
        assert!(t.value.abs() < 1e-12);

        // Too close is negative, and the danger zone starts closer still
        let x_obs = 0.9 * safe_obstacle_distance(v);
        assert!(distance_cost(0.0, v, x_obs).value < 0.0);
        assert!(danger_zone(0.0, v, x_obs).value > 0.0);
    }

    #[test]
    fn test_accel_bounds() {
        let cruise = AccelBounds::new(-1.2, 1.2);

        assert_eq!(accel_bounds(false, cruise, -3.5), AccelBounds::new(-1.2, 1.2));
        assert_eq!(accel_bounds(true, cruise, -3.5), AccelBounds::new(-3.5, 1.2));
    }

    #[test]
    fn test_stage_parameters() {
        let h = Horizon::quadratic(4, 1.0).unwrap();
        let params = stage_parameters(&h, AccelBounds::new(-2.0, 1.0), &[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(params.len(), 5);
        assert_eq!(params[3].x_obstacle_m, 4.0);
        assert!(params.iter().all(|p| p.a_min_mss == -2.0 && p.a_max_mss == 1.0));
    }
}
