//! # Longitudinal control executable
//!
//! Runs the longitudinal controller in closed loop against the scenario
//! simulation. The scenario is given by a script of `ScenarioEvent`s, for
//! example
//!
//! ```text
//! 0.0: {"SetEgoSpeed": {"speed_ms": 20.0}};
//! 0.0: {"SetCruise": {"speed_ms": 25.0}};
//! 5.0: {"SpawnLead": {"slot": 0, "rel_distance_m": 40.0, "speed_ms": 15.0, "accel_mss": 0.0}};
//! ```
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging and LongCtrl
//!     - Main loop:
//!         - Scenario event processing
//!         - Longitudinal control processing
//!         - Archiving
//!         - Simulation step
//!     - Save the final plan and a summary of the run

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use log::{debug, info, warn};
use serde::Serialize;
use std::env;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use long_lib::{
    long_ctrl::{LongCtrl, OutputData},
    sim::{ScenarioEvent, ScenarioSim},
    solver::GaussNewtonSolver,
};
use util::{
    host,
    logger::{level_from_env, logger_init, LevelFilter},
    module::State,
    script_interpreter::{Pending, ScriptInterpreter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.05;

/// Time to keep running after the last scripted event.
const SETTLE_PERIOD_S: f64 = 10.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Summary of a run, saved at the end of the session.
#[derive(Serialize)]
struct RunSummary {
    num_cycles: u64,
    num_cycle_overruns: u64,
    num_resets: u64,
    num_crash_cycles: u64,
    min_gap_m: Option<f64>,
    collided: bool,
}

// ---------------------------------------------------------------------------
// MAIN
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("long_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    let log_level = level_from_env(LevelFilter::Debug).wrap_err("Invalid log level")?;
    logger_init(log_level, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Longitudinal Control Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- INITIALISE SCENARIO SCRIPT ----

    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    // If we have a single argument use it as the script path
    let mut script: ScriptInterpreter<ScenarioEvent> = if args.len() == 2 {
        info!("Loading script from \"{}\"", &args[1]);

        let s = ScriptInterpreter::new(&args[1]).wrap_err("Failed to load script")?;

        info!(
            "Loaded script lasts {:.02} s and contains {} events\n",
            s.get_duration(),
            s.get_num_events()
        );

        s
    } else {
        return Err(eyre!("Expected path to scenario script as only argument"));
    };

    // ---- MODULE INIT ----

    let mut long_ctrl: LongCtrl<GaussNewtonSolver> =
        LongCtrl::init("long_ctrl.toml", &session).wrap_err("Failed to initialise LongCtrl")?;
    info!("LongCtrl init complete");

    let mut sim = ScenarioSim::new(
        0.0,
        0.0,
        long_ctrl.params().default_cruise_accel,
        long_ctrl.params().default_lead_accel_tau,
    );

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut summary = RunSummary {
        num_cycles: 0,
        num_cycle_overruns: 0,
        num_resets: 0,
        num_crash_cycles: 0,
        min_gap_m: None,
        collided: false,
    };
    let mut end_time_s: Option<f64> = None;
    let mut last_output: Option<OutputData> = None;

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // ---- SCENARIO PROCESSING ----

        if end_time_s.is_none() {
            match script.get_pending(sim.time_s()) {
                Pending::None => (),
                Pending::Some(events) => {
                    for event in events.iter() {
                        sim.apply(event)
                            .wrap_err_with(|| format!("Invalid scenario event {:?}", event))?;
                    }
                }
                Pending::EndOfScript => {
                    info!(
                        "End of script reached, settling for {:.1} s",
                        SETTLE_PERIOD_S
                    );
                    end_time_s = Some(sim.time_s() + SETTLE_PERIOD_S);
                }
            }
        }

        // ---- CONTROL PROCESSING ----

        let (output, report) = long_ctrl
            .proc_archived(&sim.input())
            .wrap_err("Error processing LongCtrl")?;

        if report.reset {
            summary.num_resets += 1;
        }
        if report.crashing {
            summary.num_crash_cycles += 1;
        }

        // ---- SIMULATION ----

        sim.advance(&output.solution, long_ctrl.horizon(), CYCLE_PERIOD_S);
        last_output = Some(output);

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(CYCLE_PERIOD_S).checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
                );
                summary.num_cycle_overruns += 1;
            }
        }

        // Increment cycle counter
        summary.num_cycles += 1;

        if let Some(t) = end_time_s {
            if sim.time_s() >= t {
                info!("Settling period over, exiting");
                break;
            }
        }
    }

    // ---- SHUTDOWN ----

    summary.min_gap_m = sim.min_gap_m();
    summary.collided = sim.collided();

    info!(
        "Ran {} cycles ({} overruns), {} resets, {} cycles with a predicted crash",
        summary.num_cycles, summary.num_cycle_overruns, summary.num_resets, summary.num_crash_cycles
    );
    match summary.min_gap_m {
        Some(g) => info!("Minimum gap to a lead: {:.2} m", g),
        None => info!("No leads during the run"),
    }
    if summary.collided {
        warn!("The ego collided with a lead");
    }

    if let Some(output) = last_output {
        session.save("final_plan.json", output.solution);
    }
    session.save("summary.json", summary);

    session.exit();

    Ok(())
}
