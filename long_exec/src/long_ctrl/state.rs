//! Implementations for the LongCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

// Internal
use super::{init_with_sim, LongCtrlError, Params};
use crate::{
    ego::EgoState,
    horizon::Horizon,
    lead::LeadState,
    obstacle::{plan_obstacles, LeadPlan, Source},
    sched::{accel_bounds, stage_parameters, AccelBounds},
    solver::{GaussNewtonSolver, OcpSolver, Solution, StatusCode, STATUS_SUCCESS},
};
use util::{
    archive::{ArchiveError, Archived, Archiver},
    module::State,
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Longitudinal control module state.
pub struct LongCtrl<S: OcpSolver> {
    params: Params,

    horizon: Horizon,

    solver: S,

    state: CtrlState,

    warn_limiter: WarnLimiter,

    report: StatusReport,
    arch_report: Archiver,

    plan_record: PlanRecord,
    arch_plan: Archiver,
}

/// Everything the controller carries from one cycle to the next.
///
/// After a solver failure this is returned to its `cold` value.
#[derive(Debug, Clone, PartialEq)]
pub struct CtrlState {
    /// The pinned first state of the plan.
    pub x0: EgoState,

    /// The most recent solution.
    pub solution: Solution,

    pub solver_status: StatusCode,

    /// Source of the binding obstacle at the first node.
    pub source: Source,

    /// A crash with the first lead is predicted, or a lead was closer than
    /// could be braked for.
    pub crashing: bool,

    /// Acceleration bounds requested by cruise control.
    pub cruise_accel: AccelBounds,

    pub leads: [LeadHistory; 2],
}

/// What was known about a lead slot last cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LeadHistory {
    pub prev_valid: bool,

    /// Distance after preprocessing.
    ///
    /// Units: meters
    pub prev_distance_m: f64,
}

/// Limits how often a warning can be raised.
///
/// Driven by the caller's clock rather than the system one, so that scripted
/// and simulated runs behave the same as live ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarnLimiter {
    period_s: f64,
    last_warn_s: Option<f64>,
}

/// Input data to Longitudinal Control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputData {
    /// Monotonic time of this cycle.
    ///
    /// Units: seconds
    pub time_s: f64,

    /// Units: meters/second
    pub v_ego_ms: f64,

    /// Units: meters/second^2
    pub a_ego_mss: f64,

    pub leads: [LeadState; 2],

    /// Driver set speed.
    ///
    /// Units: meters/second
    pub v_cruise_ms: f64,

    /// Acceleration bounds requested by cruise control.
    pub accel_limits: AccelBounds,
}

/// Output of Longitudinal Control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputData {
    /// The planned trajectory. Node 0 is the current ego state.
    pub solution: Solution,
}

/// Status report for LongCtrl processing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusReport {
    pub time_s: f64,

    pub solver_status: StatusCode,

    pub source: Source,

    pub crashing: bool,

    /// The solver was seeded for a new lead 0
    pub new_lead_0: bool,

    /// The solver was seeded for a new lead 1
    pub new_lead_1: bool,

    /// The solve failed and the controller was reset after this cycle
    pub reset: bool,
}

/// First step of the plan, for archiving.
#[derive(Debug, Clone, Copy, Default, Serialize)]
struct PlanRecord {
    time_s: f64,
    v_ego_ms: f64,
    a_ego_mss: f64,
    v_cruise_ms: f64,
    x_obstacle_m: f64,
    a_min_mss: f64,
    a_max_mss: f64,
    v_plan_ms: f64,
    a_plan_mss: f64,
    j_plan_msss: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CtrlState {
    /// The state at construction.
    pub fn cold(params: &Params, horizon: &Horizon) -> Self {
        Self {
            x0: EgoState::default(),
            solution: Solution::zeros(horizon.num_steps()),
            solver_status: STATUS_SUCCESS,
            source: Source::Cruise,
            crashing: false,
            cruise_accel: params.default_cruise_accel,
            leads: [LeadHistory::default(); 2],
        }
    }
}

impl WarnLimiter {
    pub fn new(period_s: f64) -> Self {
        Self {
            period_s,
            last_warn_s: None,
        }
    }

    /// Returns true if a warning may be raised at `time_s`, in which case it
    /// counts as raised.
    pub fn ready(&mut self, time_s: f64) -> bool {
        let ready = match self.last_warn_s {
            Some(last) => time_s - last >= self.period_s,
            None => true,
        };

        if ready {
            self.last_warn_s = Some(time_s);
        }

        ready
    }
}

impl Default for StatusReport {
    fn default() -> Self {
        Self {
            time_s: 0.0,
            solver_status: STATUS_SUCCESS,
            source: Source::Cruise,
            crashing: false,
            new_lead_0: false,
            new_lead_1: false,
            reset: false,
        }
    }
}

impl LongCtrl<GaussNewtonSolver> {
    /// Create a controller using the built in solver.
    pub fn from_params(params: Params) -> Result<Self, LongCtrlError> {
        let horizon = params.validate()?;
        let solver = GaussNewtonSolver::new(horizon, params.weights, params.solver);
        Self::new(params, solver)
    }
}

impl State for LongCtrl<GaussNewtonSolver> {
    type InitData = &'static str;
    type InitError = LongCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = LongCtrlError;

    /// Initialise the LongCtrl module.
    ///
    /// Expected init data is the path to the parameter file.
    fn init(init_data: Self::InitData, session: &Session) -> Result<Self, Self::InitError> {
        let params = params::load(init_data).map_err(LongCtrlError::ParamLoadError)?;

        let mut long_ctrl = Self::from_params(params)?;

        long_ctrl.arch_report = Archiver::from_path(session, "long_ctrl/status_report.csv")
            .map_err(LongCtrlError::ArchiveError)?;
        long_ctrl.arch_plan = Archiver::from_path(session, "long_ctrl/plan.csv")
            .map_err(LongCtrlError::ArchiveError)?;

        Ok(long_ctrl)
    }

    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        self.step(input_data)
    }
}

impl<S: OcpSolver> Archived for LongCtrl<S> {
    fn write(&mut self) -> Result<(), ArchiveError> {
        self.arch_report.serialise(self.report)?;
        self.arch_plan.serialise(self.plan_record)?;

        Ok(())
    }
}

impl<S: OcpSolver> LongCtrl<S> {
    /// Create a controller around the given solver.
    ///
    /// The solver must have been built for the horizon described by `params`.
    /// Archives are disabled until set up by `init`.
    pub fn new(params: Params, solver: S) -> Result<Self, LongCtrlError> {
        let horizon = params.validate()?;

        let mut long_ctrl = Self {
            state: CtrlState::cold(&params, &horizon),
            warn_limiter: WarnLimiter::new(params.warning_period_s),
            report: StatusReport::default(),
            arch_report: Archiver::default(),
            plan_record: PlanRecord::default(),
            arch_plan: Archiver::default(),
            params,
            horizon,
            solver,
        };

        long_ctrl.reinitialize();

        Ok(long_ctrl)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn horizon(&self) -> &Horizon {
        &self.horizon
    }

    pub fn state(&self) -> &CtrlState {
        &self.state
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// The most recent solution.
    pub fn solution(&self) -> &Solution {
        &self.state.solution
    }

    /// Return to the cold state and prime the solver with a zero guess.
    ///
    /// The warning rate limit is kept.
    pub fn reinitialize(&mut self) {
        self.state = CtrlState::cold(&self.params, &self.horizon);

        self.solver.set_initial_state(&self.state.x0);
        self.solver
            .warm_start(&vec![EgoState::default(); self.horizon.num_nodes()]);
    }

    /// Run one control cycle.
    ///
    /// Recoverable problems (solver failure, leads too close to brake for,
    /// missing leads) are reported through the status report and never
    /// returned as errors. Only non-finite ego or cruise inputs are rejected.
    pub fn step(&mut self, input: &InputData) -> Result<(OutputData, StatusReport), LongCtrlError> {
        check_finite("time_s", input.time_s)?;
        check_finite("v_ego_ms", input.v_ego_ms)?;
        check_finite("a_ego_mss", input.a_ego_mss)?;
        check_finite("v_cruise_ms", input.v_cruise_ms)?;
        check_finite("accel_limits.min_mss", input.accel_limits.min_mss)?;
        check_finite("accel_limits.max_mss", input.accel_limits.max_mss)?;

        self.report = StatusReport {
            time_s: input.time_s,
            ..Default::default()
        };

        self.set_cur_state(input.v_ego_ms, input.a_ego_mss);
        self.state.cruise_accel = input.accel_limits;

        let leads = [sanitise_lead(&input.leads[0]), sanitise_lead(&input.leads[1])];

        let plan = plan_obstacles(
            &self.params,
            &self.horizon,
            input.v_ego_ms,
            &leads,
            input.v_cruise_ms,
        );
        self.state.crashing = plan.crashing;

        self.report.new_lead_0 = self.update_lead(0, &plan.leads[0], input.v_ego_ms);
        self.report.new_lead_1 = self.update_lead(1, &plan.leads[1], input.v_ego_ms);

        let bounds = accel_bounds(
            plan.leads.iter().any(|l| l.valid),
            self.state.cruise_accel,
            self.params.min_accel_mss,
        );

        self.state.source = plan.source;
        for (i, p) in stage_parameters(&self.horizon, bounds, &plan.x_obstacle_m)
            .into_iter()
            .enumerate()
        {
            self.solver.set_stage_parameters(i, p);
        }
        self.solver.set_initial_state(&self.state.x0);

        self.state.solver_status = self.solver.solve();
        self.state.solution = self.solver.get_solution();

        // Only lead 0 is checked against the plan
        let lead0 = &plan.leads[0].trajectory;
        if lead0
            .x_m
            .iter()
            .zip(self.state.solution.x_m.iter())
            .any(|(x_lead, x_ego)| x_lead - x_ego < self.params.crash_distance_m)
        {
            self.state.crashing = true;
        }

        self.report.solver_status = self.state.solver_status;
        self.report.source = self.state.source;
        self.report.crashing = self.state.crashing;

        self.plan_record = PlanRecord {
            time_s: input.time_s,
            v_ego_ms: input.v_ego_ms,
            a_ego_mss: input.a_ego_mss,
            v_cruise_ms: input.v_cruise_ms,
            x_obstacle_m: plan.x_obstacle_m[0],
            a_min_mss: bounds.min_mss,
            a_max_mss: bounds.max_mss,
            v_plan_ms: self.state.solution.v_ms.get(1).copied().unwrap_or(f64::NAN),
            a_plan_mss: self.state.solution.a_mss.get(1).copied().unwrap_or(f64::NAN),
            j_plan_msss: self.state.solution.j_msss.get(0).copied().unwrap_or(f64::NAN),
        };

        trace!(
            "LongCtrl: source {:?}, status {}, crashing {}, a_plan {:.3} m/s^2",
            self.report.source,
            self.report.solver_status,
            self.report.crashing,
            self.plan_record.a_plan_mss
        );

        if self.state.solver_status != STATUS_SUCCESS {
            if self.warn_limiter.ready(input.time_s) {
                warn!(
                    "Longitudinal MPC reset, solver status {}",
                    self.state.solver_status
                );
            }
            self.report.reset = true;
            self.reinitialize();
        }

        // A failed cycle hands out the cold solution, only the report carries
        // the failure
        let output = OutputData {
            solution: self.state.solution.clone(),
        };

        Ok((output, self.report))
    }

    /// Update the pinned first state.
    ///
    /// A large change in speed leaves the previous solution far from the new
    /// optimum, so the guess is replaced by the new state at every node.
    fn set_cur_state(&mut self, v_ego_ms: f64, a_ego_mss: f64) {
        let speed_jump = (self.state.x0.velocity_ms - v_ego_ms).abs() > self.params.reseed_speed_threshold_ms;

        self.state.x0 = EgoState::new(0.0, v_ego_ms, a_ego_mss);

        if speed_jump {
            debug!("Ego speed jumped to {:.2} m/s, reseeding", v_ego_ms);
            self.solver
                .warm_start(&vec![self.state.x0; self.horizon.num_nodes()]);
        }
    }

    /// Track a lead slot, reseeding the solver if the lead is new.
    ///
    /// Returns true if the solver was reseeded.
    fn update_lead(&mut self, slot: usize, lead: &LeadPlan, v_ego_ms: f64) -> bool {
        let history = &mut self.state.leads[slot];
        let distance_m = lead.kinematics.distance_m;

        let mut new_lead = false;
        if lead.valid {
            let jumped = (distance_m - history.prev_distance_m).abs() > self.params.lead_jump_threshold_m;

            if !history.prev_valid || jumped {
                debug!(
                    "New lead {} at {:.2} m (previously {}), reseeding",
                    slot,
                    distance_m,
                    if history.prev_valid { "valid" } else { "invalid" }
                );
                let seed = init_with_sim(&self.horizon, v_ego_ms, &lead.kinematics);
                self.solver.warm_start(&seed);
                new_lead = true;
            }

            history.prev_valid = true;
            history.prev_distance_m = distance_m;
        } else {
            history.prev_valid = false;
        }

        new_lead
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn check_finite(name: &'static str, value: f64) -> Result<(), LongCtrlError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(LongCtrlError::NonFiniteInput(name, value))
    }
}

/// A lead with non-finite measurements is treated as missing.
fn sanitise_lead(lead: &LeadState) -> LeadState {
    let finite = lead.rel_distance_m.is_finite()
        && lead.rel_velocity_ms.is_finite()
        && lead.abs_accel_mss.is_finite()
        && lead.accel_decay_tau.is_finite();

    if lead.valid && !finite {
        debug!("Lead measurement is not finite, ignoring it: {:?}", lead);
        LeadState::invalid()
    } else {
        *lead
    }
}
