//! Property tests of the obstacle geometry and the controller.

use long_lib::{
    lead::LeadState,
    long_ctrl::{InputData, LongCtrl, Params},
    obstacle::{
        desired_follow_distance, plan_obstacles, safe_obstacle_distance, stopping_equivalence,
        Source, REACTION_TIME_S, STOPPED_MARGIN_M,
    },
    sched::AccelBounds,
};
use proptest::prelude::*;

fn lead_strategy() -> impl Strategy<Value = LeadState> {
    (
        any::<bool>(),
        0.0f64..150.0,
        -20.0f64..20.0,
        -12.0f64..6.0,
        0.0f64..3.0,
    )
        .prop_map(|(valid, d, rv, a, tau)| LeadState {
            valid,
            rel_distance_m: d,
            rel_velocity_ms: rv,
            abs_accel_mss: a,
            accel_decay_tau: tau,
        })
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(500))]

    /// A faster vehicle always needs more room to stop, and never a negative
    /// amount.
    #[test]
    fn prop_stopping_equivalence_monotonic(v1 in 0.0f64..60.0, dv in 0.01f64..60.0) {
        prop_assert!(stopping_equivalence(v1) >= 0.0);
        prop_assert!(stopping_equivalence(v1) < stopping_equivalence(v1 + dv));
    }

    /// The safe distance grows with the ego speed.
    #[test]
    fn prop_safe_distance_monotonic(v1 in 0.0f64..60.0, dv in 0.01f64..60.0) {
        prop_assert!(safe_obstacle_distance(v1) < safe_obstacle_distance(v1 + dv));
    }

    /// The follow distance is the ego's safe distance less the room the lead
    /// still needs to stop.
    #[test]
    fn prop_follow_distance_identity(v_ego in 0.0f64..60.0, v_lead in 0.0f64..60.0) {
        let expected = safe_obstacle_distance(v_ego) - stopping_equivalence(v_lead);
        prop_assert!((desired_follow_distance(v_ego, v_lead) - expected).abs() < 1e-9);
    }

    /// Following a lead at the same speed leaves one reaction time plus the
    /// stopped margin.
    #[test]
    fn prop_follow_distance_same_speed(v in 0.0f64..60.0) {
        let expected = REACTION_TIME_S * v + STOPPED_MARGIN_M;
        prop_assert!((desired_follow_distance(v, v) - expected).abs() < 1e-9);
    }

    /// Obstacle planning is a pure function of its inputs.
    #[test]
    fn prop_plan_obstacles_idempotent(
        v_ego in 0.0f64..40.0,
        v_cruise in 0.0f64..40.0,
        lead0 in lead_strategy(),
        lead1 in lead_strategy(),
    ) {
        let params = Params::default();
        let h = params.horizon().unwrap();
        let leads = [lead0, lead1];

        let a = plan_obstacles(&params, &h, v_ego, &leads, v_cruise);
        let b = plan_obstacles(&params, &h, v_ego, &leads, v_cruise);
        prop_assert_eq!(a, b);
    }

    /// Extrapolated leads never move backwards.
    #[test]
    fn prop_lead_speed_non_negative(v_ego in 0.0f64..40.0, lead in lead_strategy()) {
        let params = Params::default();
        let h = params.horizon().unwrap();

        let plan = plan_obstacles(&params, &h, v_ego, &[lead, LeadState::invalid()], 20.0);
        prop_assert!(plan.leads[0].trajectory.v_ms.iter().all(|v| *v >= 0.0));
        prop_assert_eq!(plan.x_obstacle_m.len(), h.num_nodes());
    }

    /// Without leads the cruise target always binds and nothing crashes.
    #[test]
    fn prop_no_leads_cruise(v_ego in 0.0f64..40.0, v_cruise in 0.0f64..40.0) {
        let params = Params::default();
        let h = params.horizon().unwrap();

        let plan = plan_obstacles(&params, &h, v_ego, &[LeadState::invalid(); 2], v_cruise);
        prop_assert_eq!(plan.source, Source::Cruise);
        prop_assert!(!plan.crashing);
    }
}

proptest! {
    // Each case runs the full solver
    #![proptest_config(proptest::test_runner::Config::with_cases(32))]

    /// The controller agrees with the obstacle planner when there are no
    /// leads, and the fake leads never trigger the crash check.
    #[test]
    fn prop_controller_no_leads(v_ego in 0.0f64..40.0, v_cruise in 0.0f64..40.0) {
        let mut ctrl = LongCtrl::from_params(Params::default()).unwrap();

        let (output, report) = ctrl
            .step(&InputData {
                time_s: 0.0,
                v_ego_ms: v_ego,
                a_ego_mss: 0.0,
                leads: [LeadState::invalid(); 2],
                v_cruise_ms: v_cruise,
                accel_limits: AccelBounds::new(-1.2, 1.2),
            })
            .unwrap();

        prop_assert_eq!(report.source, Source::Cruise);
        prop_assert!(!report.crashing);
        prop_assert_eq!(output.solution.num_nodes(), 33);
    }
}
