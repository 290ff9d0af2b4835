//! # Gauss-Newton solver
//!
//! A small real-time solver for the longitudinal problem.
//!
//! The ego is modelled as a triple integrator driven by jerk. Over each
//! interval the jerk is held constant, so the state at every node is an exact
//! affine function of the initial state and the jerk sequence. Taking the
//! jerks as the only decision variables turns the problem into an
//! unconstrained nonlinear least squares problem: the costs are residuals and
//! each soft constraint contributes a residual while it is violated.
//!
//! Every call to `solve` runs a bounded number of damped Gauss-Newton steps
//! with a backtracking line search, starting from the current guess. This
//! keeps the worst case execution time fixed while successive cycles keep
//! refining the plan.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::warn;
use nalgebra::{DMatrix, DVector, Matrix3, Matrix3xX, Vector3};
use serde::{Deserialize, Serialize};

use super::{
    OcpSolver, Solution, StageParams, StatusCode, STATUS_LINEAR_SOLVE_FAILURE,
    STATUS_NAN_DETECTED, STATUS_SUCCESS,
};
use crate::{
    ego::EgoState,
    horizon::Horizon,
    sched::{self, Term, Weights},
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Residuals at a node that has a jerk input.
const RESIDUALS_PER_STAGE: usize = 7;

/// Residuals at the final node, which has no jerk.
const RESIDUALS_TERMINAL: usize = 6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Settings bounding the work done per solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Maximum Gauss-Newton steps per call to `solve`.
    pub max_iterations: usize,

    /// Stop once the largest jerk change of a step is below this.
    ///
    /// Units: meters/second^3
    pub step_tolerance: f64,

    /// Added to the diagonal of the normal equations.
    pub levenberg_damping: f64,

    /// Maximum halvings of a step before it is abandoned.
    pub max_backtracks: usize,
}

/// Damped Gauss-Newton solver over the jerk sequence.
pub struct GaussNewtonSolver {
    horizon: Horizon,
    weights: Weights,
    settings: SolverSettings,

    /// Pinned initial state
    x0: Vector3<f64>,

    params: Vec<StageParams>,

    /// State guess at each node, the next solve starts from it.
    guess: Vec<EgoState>,

    /// State transition matrix of each interval
    transitions: Vec<Matrix3<f64>>,

    /// Effect of the interval's jerk on the state at its end
    input_gains: Vec<Vector3<f64>>,

    /// Derivative of the state at each node with respect to all jerks
    sensitivities: Vec<Matrix3xX<f64>>,

    solution: Solution,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            step_tolerance: 1e-3,
            levenberg_damping: 1e-6,
            max_backtracks: 8,
        }
    }
}

impl GaussNewtonSolver {
    pub fn new(horizon: Horizon, weights: Weights, settings: SolverSettings) -> Self {
        let n = horizon.num_steps();

        let mut transitions = Vec::with_capacity(n);
        let mut input_gains = Vec::with_capacity(n);
        for dt in horizon.dts() {
            transitions.push(Matrix3::new(
                1.0, dt, dt * dt / 2.0,
                0.0, 1.0, dt,
                0.0, 0.0, 1.0,
            ));
            input_gains.push(Vector3::new(dt.powi(3) / 6.0, dt * dt / 2.0, dt));
        }

        // The dynamics are linear so the sensitivities never change. The jerk
        // of interval k only affects the nodes after it.
        let mut sensitivities = Vec::with_capacity(n + 1);
        let mut s = Matrix3xX::<f64>::zeros(n);
        sensitivities.push(s.clone());
        for k in 0..n {
            s = transitions[k] * s;
            s.set_column(k, &input_gains[k]);
            sensitivities.push(s.clone());
        }

        Self {
            weights,
            settings,
            x0: Vector3::zeros(),
            params: vec![StageParams::default(); n + 1],
            guess: vec![EgoState::default(); n + 1],
            transitions,
            input_gains,
            sensitivities,
            solution: Solution::zeros(n),
            horizon,
        }
    }

    /// Total number of residuals.
    fn num_residuals(&self) -> usize {
        RESIDUALS_PER_STAGE * self.horizon.num_steps() + RESIDUALS_TERMINAL
    }

    /// Jerk sequence reproducing the guessed accelerations from the pinned
    /// initial state.
    fn jerks_from_guess(&self) -> DVector<f64> {
        let mut a_prev = self.x0[2];
        DVector::from_iterator(
            self.horizon.num_steps(),
            self.horizon.dts().enumerate().map(|(k, dt)| {
                let a_next = self.guess[k + 1].accel_mss;
                let j = (a_next - a_prev) / dt;
                a_prev = a_next;
                j
            }),
        )
    }

    /// State at every node for the given jerks.
    fn rollout(&self, u: &DVector<f64>) -> Vec<Vector3<f64>> {
        let mut states = Vec::with_capacity(self.horizon.num_nodes());
        let mut x = self.x0;
        states.push(x);
        for k in 0..self.horizon.num_steps() {
            x = self.transitions[k] * x + self.input_gains[k] * u[k];
            states.push(x);
        }
        states
    }

    /// Evaluate the residuals, and fill in their Jacobian if one is given.
    ///
    /// The Jacobian must be zeroed and of size `num_residuals x N`.
    fn evaluate(&self, u: &DVector<f64>, mut jac: Option<&mut DMatrix<f64>>) -> DVector<f64> {
        let n = self.horizon.num_steps();
        let w = &self.weights;
        let mut r = DVector::zeros(self.num_residuals());
        let mut row = 0;

        for (k, state) in self.rollout(u).iter().enumerate() {
            let p = &self.params[k];
            let (x, v, a) = (state[0], state[1], state[2]);
            let scale = if k == n { w.terminal_scale } else { 1.0 };

            self.put(k, row, w.x_ego * scale, sched::distance_cost(x, v, p.x_obstacle_m), &mut r, &mut jac);
            row += 1;
            self.put(k, row, w.a_ego * scale, sched::accel_cost(v, a), &mut r, &mut jac);
            row += 1;

            if k < n {
                let sqrt_w = w.j_ego.sqrt();
                let (value, d_dv, d_dj) = sched::jerk_cost(v, u[k]);
                r[row] = sqrt_w * value;
                if let Some(j) = jac.as_deref_mut() {
                    let mut grad = self.sensitivities[k].row(1).transpose() * d_dv;
                    grad[k] += d_dj;
                    j.row_mut(row).copy_from(&(grad * sqrt_w).transpose());
                }
                row += 1;
            }

            self.put_hinge(k, row, w.v_min_penalty, sched::speed_lower(v), &mut r, &mut jac);
            row += 1;
            self.put_hinge(k, row, w.a_min_penalty, sched::accel_lower(a, p.a_min_mss), &mut r, &mut jac);
            row += 1;
            self.put_hinge(k, row, w.a_max_penalty, sched::accel_upper(a, p.a_max_mss), &mut r, &mut jac);
            row += 1;
            self.put_hinge(k, row, w.danger_zone, sched::danger_zone(x, v, p.x_obstacle_m), &mut r, &mut jac);
            row += 1;
        }

        r
    }

    /// Write a weighted residual and its Jacobian row.
    fn put(
        &self,
        k: usize,
        row: usize,
        weight: f64,
        term: Term,
        r: &mut DVector<f64>,
        jac: &mut Option<&mut DMatrix<f64>>,
    ) {
        let sqrt_w = weight.sqrt();
        r[row] = sqrt_w * term.value;

        if let Some(j) = jac.as_deref_mut() {
            let grad = Vector3::from(term.grad) * sqrt_w;
            j.row_mut(row)
                .copy_from(&self.sensitivities[k].tr_mul(&grad).transpose());
        }
    }

    /// Soft constraint `term >= 0`, contributing only while violated.
    fn put_hinge(
        &self,
        k: usize,
        row: usize,
        weight: f64,
        term: Term,
        r: &mut DVector<f64>,
        jac: &mut Option<&mut DMatrix<f64>>,
    ) {
        if term.value < 0.0 {
            self.put(k, row, weight, term, r, jac);
        }
    }

    fn cost(&self, u: &DVector<f64>) -> f64 {
        0.5 * self.evaluate(u, None).norm_squared()
    }

    fn to_solution(&self, u: &DVector<f64>) -> Solution {
        let states = self.rollout(u);
        Solution {
            x_m: states.iter().map(|s| s[0]).collect(),
            v_ms: states.iter().map(|s| s[1]).collect(),
            a_mss: states.iter().map(|s| s[2]).collect(),
            j_msss: u.iter().copied().collect(),
        }
    }

    /// Run the Gauss-Newton iterations from `u`, returning the final jerks
    /// and the status.
    fn iterate(&self, mut u: DVector<f64>) -> (DVector<f64>, StatusCode) {
        let n = self.horizon.num_steps();

        for _ in 0..self.settings.max_iterations {
            let mut jac = DMatrix::zeros(self.num_residuals(), n);
            let r = self.evaluate(&u, Some(&mut jac));
            let cost = 0.5 * r.norm_squared();

            if !cost.is_finite() || jac.iter().any(|v| !v.is_finite()) {
                return (u, STATUS_NAN_DETECTED);
            }

            // Normal equations of the linearised problem
            let mut hess = jac.tr_mul(&jac);
            for i in 0..n {
                hess[(i, i)] += self.settings.levenberg_damping;
            }
            let grad = jac.tr_mul(&r);

            let step = match hess.cholesky() {
                Some(c) => -c.solve(&grad),
                None => return (u, STATUS_LINEAR_SOLVE_FAILURE),
            };
            if step.iter().any(|v| !v.is_finite()) {
                return (u, STATUS_NAN_DETECTED);
            }

            // The hinges make the cost only piecewise quadratic, so the full
            // step can overshoot
            let mut alpha = 1.0;
            let mut accepted = None;
            for _ in 0..=self.settings.max_backtracks {
                let candidate = &u + &step * alpha;
                if self.cost(&candidate) <= cost {
                    accepted = Some(candidate);
                    break;
                }
                alpha *= 0.5;
            }

            match accepted {
                Some(candidate) => u = candidate,
                None => break,
            }

            if alpha * step.amax() < self.settings.step_tolerance {
                break;
            }
        }

        (u, STATUS_SUCCESS)
    }
}

impl OcpSolver for GaussNewtonSolver {
    fn set_initial_state(&mut self, x0: &EgoState) {
        self.x0 = x0.to_vector();
    }

    fn set_stage_parameters(&mut self, step: usize, params: StageParams) {
        match self.params.get_mut(step) {
            Some(p) => *p = params,
            None => warn!(
                "Ignoring parameters for node {}, the horizon only has {} nodes",
                step,
                self.params.len()
            ),
        }
    }

    fn warm_start(&mut self, trajectory: &[EgoState]) {
        if trajectory.len() != self.guess.len() {
            warn!(
                "Ignoring warm start of {} nodes, expected {}",
                trajectory.len(),
                self.guess.len()
            );
            return;
        }
        self.guess.copy_from_slice(trajectory);
    }

    fn solve(&mut self) -> StatusCode {
        let u0 = self.jerks_from_guess();

        let (u, status) = if u0.iter().all(|v| v.is_finite()) && self.x0.iter().all(|v| v.is_finite()) {
            self.iterate(u0)
        } else {
            (u0, STATUS_NAN_DETECTED)
        };

        self.solution = self.to_solution(&u);

        let finite = self
            .solution
            .states()
            .iter()
            .all(|s| s.is_finite());
        if !finite {
            return STATUS_NAN_DETECTED;
        }

        // Continue from this solution next time
        self.guess = self.solution.states();

        status
    }

    fn get_solution(&self) -> Solution {
        self.solution.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::obstacle::safe_obstacle_distance;

    fn solver() -> GaussNewtonSolver {
        GaussNewtonSolver::new(
            Horizon::quadratic(32, 10.0).unwrap(),
            Weights::default(),
            SolverSettings::default(),
        )
    }

    /// Obstacle ahead moving at `v_obs` from `x_obs0`
    fn set_moving_obstacle(s: &mut GaussNewtonSolver, x_obs0: f64, v_obs: f64, a_min: f64, a_max: f64) {
        let times = s.horizon.times().to_vec();
        for (i, t) in times.iter().enumerate() {
            s.set_stage_parameters(
                i,
                StageParams {
                    a_min_mss: a_min,
                    a_max_mss: a_max,
                    x_obstacle_m: x_obs0 + v_obs * t,
                },
            );
        }
    }

    #[test]
    fn test_solution_is_dynamically_consistent() {
        let mut s = solver();
        let x0 = EgoState::new(0.0, 15.0, 0.3);
        s.set_initial_state(&x0);
        s.warm_start(&vec![x0; 33]);
        set_moving_obstacle(&mut s, 80.0, 15.0, -1.2, 1.2);

        assert_eq!(s.solve(), STATUS_SUCCESS);
        let sol = s.get_solution();

        assert_eq!(sol.num_nodes(), 33);
        assert_eq!(sol.j_msss.len(), 32);
        assert_eq!(sol.state(0), Some(x0));

        for k in 0..32 {
            let dt = s.horizon.dt(k);
            let j = sol.j_msss[k];
            let v_pred = sol.v_ms[k] + sol.a_mss[k] * dt + j * dt * dt / 2.0;
            let a_pred = sol.a_mss[k] + j * dt;
            assert!((sol.v_ms[k + 1] - v_pred).abs() < 1e-9);
            assert!((sol.a_mss[k + 1] - a_pred).abs() < 1e-9);
        }
    }

    #[test]
    fn test_accelerates_within_bounds() {
        let mut s = solver();
        let x0 = EgoState::new(0.0, 10.0, 0.0);
        s.set_initial_state(&x0);
        s.warm_start(&vec![x0; 33]);

        // Obstacle running away faster than the ego, beyond the comfortable
        // distance
        set_moving_obstacle(&mut s, safe_obstacle_distance(10.0) + 15.0, 14.0, -1.2, 0.5);

        assert_eq!(s.solve(), STATUS_SUCCESS);
        let sol = s.get_solution();

        assert!(sol.v_ms[32] > 10.0);
        assert!(sol.a_mss.iter().all(|a| *a <= 0.5 + 0.05));
        assert!(sol.v_ms.iter().all(|v| *v >= -0.01));
    }

    #[test]
    fn test_brakes_for_stopped_obstacle() {
        let mut s = solver();
        let x0 = EgoState::new(0.0, 15.0, 0.0);
        s.set_initial_state(&x0);
        s.warm_start(&vec![x0; 33]);
        set_moving_obstacle(&mut s, 60.0, 0.0, -3.5, 1.2);

        assert_eq!(s.solve(), STATUS_SUCCESS);
        let sol = s.get_solution();

        assert!(sol.a_mss[5] < 0.0);
        assert!(sol.v_ms[32] < 5.0);
        assert!(sol.x_m.iter().all(|x| *x < 60.0));
    }

    #[test]
    fn test_nan_detected() {
        let mut s = solver();
        s.set_initial_state(&EgoState::new(0.0, f64::NAN, 0.0));
        set_moving_obstacle(&mut s, 80.0, 15.0, -1.2, 1.2);

        assert_eq!(s.solve(), STATUS_NAN_DETECTED);
    }

    #[test]
    fn test_bad_warm_start_ignored() {
        let mut s = solver();
        let x0 = EgoState::new(0.0, 15.0, 0.0);
        s.warm_start(&vec![x0; 33]);
        s.warm_start(&[EgoState::default(); 3]);

        assert_eq!(s.guess.len(), 33);
        assert_eq!(s.guess[10], x0);
    }
}
