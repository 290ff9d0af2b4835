//! # Longitudinal Control Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use long_lib::{
    lead::LeadState,
    long_ctrl::{InputData, LongCtrl, Params},
    obstacle::plan_obstacles,
    sched::AccelBounds,
};

fn long_ctrl_benchmark(c: &mut Criterion) {
    let params = Params::default();
    let horizon = params.horizon().unwrap();

    let leads = [
        LeadState::new(35.0, -3.0, -0.5, 1.5),
        LeadState::new(70.0, 1.0, 0.0, 1.5),
    ];

    let input = InputData {
        time_s: 0.0,
        v_ego_ms: 22.0,
        a_ego_mss: 0.0,
        leads,
        v_cruise_ms: 27.0,
        accel_limits: AccelBounds::new(-1.2, 1.2),
    };

    // Obstacle planning alone
    c.bench_function("plan_obstacles", |b| {
        b.iter(|| plan_obstacles(&params, &horizon, 22.0, &leads, 27.0))
    });

    // A full warm cycle, as in steady state following
    let mut long_ctrl = LongCtrl::from_params(params.clone()).unwrap();
    long_ctrl.step(&input).unwrap();
    c.bench_function("LongCtrl::step::warm", |b| {
        b.iter(|| long_ctrl.step(&input).unwrap())
    });

    // A cold cycle, with the leads seen for the first time
    c.bench_function("LongCtrl::step::cold", |b| {
        b.iter(|| {
            long_ctrl.reinitialize();
            long_ctrl.step(&input).unwrap()
        })
    });
}

criterion_group!(benches, long_ctrl_benchmark);
criterion_main!(benches);
