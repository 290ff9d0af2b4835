//! # Scenario simulation
//!
//! A minimal closed loop plant for exercising the controller without a car.
//! The ego tracks the planned acceleration perfectly and the leads follow
//! whatever acceleration they were last given. Scenarios are driven by
//! `ScenarioEvent`s, usually read from a script.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use util::maths::interp;

use crate::{
    ego::EgoState,
    horizon::Horizon,
    lead::LeadState,
    long_ctrl::InputData,
    sched::AccelBounds,
    solver::Solution,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A simulated lead vehicle, in absolute coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimLead {
    pub position_m: f64,
    pub speed_ms: f64,
    pub accel_mss: f64,
}

/// The simulated world.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSim {
    time_s: f64,

    /// Ego state, with the position measured from where the run started.
    ego: EgoState,

    leads: [Option<SimLead>; 2],

    v_cruise_ms: f64,

    accel_limits: AccelBounds,

    /// Acceleration decay constant reported with every lead.
    lead_accel_tau: f64,

    /// Smallest gap to any lead seen so far.
    min_gap_m: Option<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Events which change the scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScenarioEvent {
    SetCruise {
        speed_ms: f64,
    },
    SetAccelLimits {
        min_mss: f64,
        max_mss: f64,
    },
    /// Place a lead in a slot, replacing any lead already there.
    SpawnLead {
        slot: usize,
        rel_distance_m: f64,
        speed_ms: f64,
        accel_mss: f64,
    },
    RemoveLead {
        slot: usize,
    },
    SetLeadAccel {
        slot: usize,
        accel_mss: f64,
    },
    /// Teleport the ego to a new speed, as after a measurement glitch.
    SetEgoSpeed {
        speed_ms: f64,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error("Lead slot {0} doesn't exist, there are only 2")]
    InvalidSlot(usize),

    #[error("There is no lead in slot {0}")]
    EmptySlot(usize),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScenarioSim {
    pub fn new(v_ego_ms: f64, v_cruise_ms: f64, accel_limits: AccelBounds, lead_accel_tau: f64) -> Self {
        Self {
            time_s: 0.0,
            ego: EgoState::new(0.0, v_ego_ms, 0.0),
            leads: [None, None],
            v_cruise_ms,
            accel_limits,
            lead_accel_tau,
            min_gap_m: None,
        }
    }

    pub fn time_s(&self) -> f64 {
        self.time_s
    }

    pub fn ego(&self) -> &EgoState {
        &self.ego
    }

    pub fn lead(&self, slot: usize) -> Option<&SimLead> {
        self.leads.get(slot).and_then(|l| l.as_ref())
    }

    /// Current distance from the ego to the lead in `slot`.
    pub fn gap_m(&self, slot: usize) -> Option<f64> {
        self.lead(slot).map(|l| l.position_m - self.ego.position_m)
    }

    /// Smallest gap to any lead over the run so far.
    pub fn min_gap_m(&self) -> Option<f64> {
        self.min_gap_m
    }

    /// True if the ego has ever reached a lead.
    pub fn collided(&self) -> bool {
        matches!(self.min_gap_m, Some(g) if g <= 0.0)
    }

    /// Apply a scenario event.
    pub fn apply(&mut self, event: &ScenarioEvent) -> Result<(), SimError> {
        debug!("Sim event at {:.2} s: {:?}", self.time_s, event);

        match *event {
            ScenarioEvent::SetCruise { speed_ms } => {
                self.v_cruise_ms = non_negative("speed_ms", speed_ms)?;
            }
            ScenarioEvent::SetAccelLimits { min_mss, max_mss } => {
                if !(min_mss <= max_mss) {
                    return Err(SimError::InvalidValue("min_mss", min_mss));
                }
                self.accel_limits = AccelBounds::new(min_mss, max_mss);
            }
            ScenarioEvent::SpawnLead {
                slot,
                rel_distance_m,
                speed_ms,
                accel_mss,
            } => {
                let position_m = self.ego.position_m + finite("rel_distance_m", rel_distance_m)?;
                *self.slot_mut(slot)? = Some(SimLead {
                    position_m,
                    speed_ms: non_negative("speed_ms", speed_ms)?,
                    accel_mss: finite("accel_mss", accel_mss)?,
                });
                self.update_min_gap();
            }
            ScenarioEvent::RemoveLead { slot } => {
                *self.slot_mut(slot)? = None;
            }
            ScenarioEvent::SetLeadAccel { slot, accel_mss } => {
                let accel_mss = finite("accel_mss", accel_mss)?;
                match self.slot_mut(slot)? {
                    Some(l) => l.accel_mss = accel_mss,
                    None => return Err(SimError::EmptySlot(slot)),
                }
            }
            ScenarioEvent::SetEgoSpeed { speed_ms } => {
                self.ego.velocity_ms = non_negative("speed_ms", speed_ms)?;
            }
        }

        Ok(())
    }

    /// Controller input describing the current state of the world.
    pub fn input(&self) -> InputData {
        let lead_state = |lead: &Option<SimLead>| match lead {
            Some(l) => LeadState::new(
                l.position_m - self.ego.position_m,
                l.speed_ms - self.ego.velocity_ms,
                l.accel_mss,
                self.lead_accel_tau,
            ),
            None => LeadState::invalid(),
        };

        InputData {
            time_s: self.time_s,
            v_ego_ms: self.ego.velocity_ms,
            a_ego_mss: self.ego.accel_mss,
            leads: [lead_state(&self.leads[0]), lead_state(&self.leads[1])],
            v_cruise_ms: self.v_cruise_ms,
            accel_limits: self.accel_limits,
        }
    }

    /// Advance the world by `dt_s`, with the ego following `plan`.
    ///
    /// The ego holds the planned acceleration at `dt_s` into the plan, which
    /// is what it would be tracking by the end of the step.
    pub fn advance(&mut self, plan: &Solution, horizon: &Horizon, dt_s: f64) {
        if let Some(a) = interp(dt_s, horizon.times(), &plan.a_mss) {
            if a.is_finite() {
                self.ego.accel_mss = a;
            }
        }

        self.ego = propagate(&self.ego, dt_s);

        for lead in self.leads.iter_mut().flatten() {
            let next = propagate(&EgoState::new(lead.position_m, lead.speed_ms, lead.accel_mss), dt_s);
            lead.position_m = next.position_m;
            lead.speed_ms = next.velocity_ms;
            lead.accel_mss = next.accel_mss;
        }

        self.time_s += dt_s;
        self.update_min_gap();

        if self.collided() {
            info!("Sim: ego reached a lead at {:.2} s", self.time_s);
        }
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut Option<SimLead>, SimError> {
        self.leads.get_mut(slot).ok_or(SimError::InvalidSlot(slot))
    }

    fn update_min_gap(&mut self) {
        for slot in 0..2 {
            if let Some(g) = self.gap_m(slot) {
                self.min_gap_m = Some(self.min_gap_m.map_or(g, |m| m.min(g)));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Constant acceleration motion over `dt_s`, stopping rather than reversing.
fn propagate(state: &EgoState, dt_s: f64) -> EgoState {
    let v = state.velocity_ms;
    let a = state.accel_mss;

    if a < 0.0 && v + a * dt_s <= 0.0 {
        return EgoState::new(state.position_m + v * v / (-2.0 * a), 0.0, 0.0);
    }

    let transition = Matrix3::new(
        1.0, dt_s, dt_s * dt_s / 2.0,
        0.0, 1.0, dt_s,
        0.0, 0.0, 1.0,
    );
    EgoState::from_vector(&(transition * state.to_vector()))
}

fn finite(name: &'static str, value: f64) -> Result<f64, SimError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SimError::InvalidValue(name, value))
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<f64, SimError> {
    match finite(name, value)? {
        v if v >= 0.0 => Ok(v),
        v => Err(SimError::InvalidValue(name, v)),
    }
}
