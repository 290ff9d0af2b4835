//! End to end scenarios of the controller with the built in solver.

use long_lib::{
    lead::LeadState,
    long_ctrl::{InputData, LongCtrl, Params},
    obstacle::{desired_follow_distance, Source},
    sched::AccelBounds,
    sim::{ScenarioEvent, ScenarioSim},
    solver::{GaussNewtonSolver, STATUS_SUCCESS},
};
use util::script_interpreter::{Pending, ScriptInterpreter};

const CYCLE_PERIOD_S: f64 = 0.05;

fn ctrl() -> LongCtrl<GaussNewtonSolver> {
    LongCtrl::from_params(Params::default()).unwrap()
}

fn input(v_ego_ms: f64, leads: [LeadState; 2], v_cruise_ms: f64) -> InputData {
    InputData {
        time_s: 0.0,
        v_ego_ms,
        a_ego_mss: 0.0,
        leads,
        v_cruise_ms,
        accel_limits: AccelBounds::new(-1.2, 1.2),
    }
}

/// Run the controller against the simulation for `duration_s`.
fn run(ctrl: &mut LongCtrl<GaussNewtonSolver>, sim: &mut ScenarioSim, duration_s: f64) {
    let num_cycles = (duration_s / CYCLE_PERIOD_S).round() as usize;
    for _ in 0..num_cycles {
        let (output, report) = ctrl.step(&sim.input()).unwrap();
        assert_eq!(
            report.solver_status, STATUS_SUCCESS,
            "solver failed at {:.2} s",
            sim.time_s()
        );
        sim.advance(&output.solution, ctrl.horizon(), CYCLE_PERIOD_S);
    }
}

#[test]
fn test_cruise_no_leads() {
    let mut c = ctrl();

    let (output, report) = c
        .step(&input(20.0, [LeadState::invalid(); 2], 25.0))
        .unwrap();
    let sol = output.solution;

    assert_eq!(report.solver_status, STATUS_SUCCESS);
    assert_eq!(report.source, Source::Cruise);
    assert!(!report.crashing);

    assert_eq!(sol.v_ms[0], 20.0);
    assert!(sol.v_ms[32] > 20.5);
    assert!(sol.a_mss.iter().all(|a| *a <= 1.2 + 0.05));
}

#[test]
fn test_closing_lead() {
    let mut c = ctrl();
    let lead = LeadState::new(20.0, -5.0, 0.0, 1.5);

    let (output, report) = c
        .step(&input(25.0, [lead, LeadState::invalid()], 25.0))
        .unwrap();
    let sol = output.solution;

    assert_eq!(report.solver_status, STATUS_SUCCESS);
    assert_eq!(report.source, Source::Lead0);
    assert!(report.new_lead_0);
    assert!(!report.crashing);

    // Braking straight away, dropping below the lead's speed to open the gap
    assert!(sol.a_mss[1..8].iter().all(|a| *a < 0.0));
    assert!(sol.v_ms.iter().any(|v| *v < 20.0));

    // The planned gap never gets close
    for (i, t) in c.horizon().times().iter().enumerate() {
        assert!(20.0 + 20.0 * t - sol.x_m[i] > 1.5);
    }
}

#[test]
fn test_infeasible_lead() {
    let mut c = ctrl();
    let lead = LeadState::new(1.0, -10.0, 0.0, 1.5);

    let (_, report) = c
        .step(&input(20.0, [lead, LeadState::invalid()], 25.0))
        .unwrap();

    assert!(report.crashing);
    assert_eq!(report.source, Source::Lead0);
}

#[test]
fn test_closed_loop_cruise() {
    let params = Params::default();
    let mut c = ctrl();
    let mut sim = ScenarioSim::new(20.0, 25.0, params.default_cruise_accel, params.default_lead_accel_tau);

    run(&mut c, &mut sim, 40.0);

    assert!((sim.ego().velocity_ms - 25.0).abs() < 1.0);
}

#[test]
fn test_closed_loop_follow() {
    let params = Params::default();
    let mut c = ctrl();
    let mut sim = ScenarioSim::new(20.0, 25.0, params.default_cruise_accel, params.default_lead_accel_tau);
    sim.apply(&ScenarioEvent::SpawnLead {
        slot: 0,
        rel_distance_m: 60.0,
        speed_ms: 18.0,
        accel_mss: 0.0,
    })
    .unwrap();

    run(&mut c, &mut sim, 60.0);

    assert!(!sim.collided());

    // Settled behind the lead at its speed
    let gap = sim.gap_m(0).unwrap();
    let target = desired_follow_distance(18.0, 18.0);
    assert!((sim.ego().velocity_ms - 18.0).abs() < 1.0);
    assert!((gap - target).abs() < 10.0, "gap {:.2} m, target {:.2} m", gap, target);
}

#[test]
fn test_scripted_stop() {
    let params = Params::default();
    let mut c = ctrl();
    let mut sim = ScenarioSim::new(0.0, 0.0, params.default_cruise_accel, params.default_lead_accel_tau);

    // A lead ahead brakes to a stop
    let mut script: ScriptInterpreter<ScenarioEvent> = ScriptInterpreter::from_script(
        r#"
        0.0: {"SetEgoSpeed": {"speed_ms": 15.0}};
        0.0: {"SetCruise": {"speed_ms": 15.0}};
        0.0: {"SpawnLead": {"slot": 0, "rel_distance_m": 40.0, "speed_ms": 15.0, "accel_mss": 0.0}};
        5.0: {"SetLeadAccel": {"slot": 0, "accel_mss": -1.5}};
        "#,
    )
    .unwrap();

    for _ in 0..(30.0 / CYCLE_PERIOD_S) as usize {
        if let Pending::Some(events) = script.get_pending(sim.time_s()) {
            for e in events.iter() {
                sim.apply(e).unwrap();
            }
        }

        let (output, _) = c.step(&sim.input()).unwrap();
        sim.advance(&output.solution, c.horizon(), CYCLE_PERIOD_S);
    }

    assert_eq!(sim.lead(0).unwrap().speed_ms, 0.0);
    assert!(!sim.collided());
    assert!(sim.ego().velocity_ms < 0.5);
    assert!(sim.gap_m(0).unwrap() > 2.0);
}
