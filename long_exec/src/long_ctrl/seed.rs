//! Solver seeding for newly appeared leads

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::{
    ego::EgoState,
    horizon::Horizon,
    lead::{approach_accel, LeadKinematics},
};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Seed trajectory for a lead the previous solution knows nothing about.
///
/// The ego holds the constant acceleration from `approach_accel` until it
/// stops, after which it stays stopped. This lands the solver close enough to
/// the new optimum to converge, where the previous solution might not.
pub fn init_with_sim(horizon: &Horizon, v_ego_ms: f64, lead: &LeadKinematics) -> Vec<EgoState> {
    let mut a = approach_accel(v_ego_ms, lead.distance_m, lead.velocity_ms, lead.accel_mss);

    let mut x = 0.0;
    let mut v = v_ego_ms;
    let mut seed = Vec::with_capacity(horizon.num_nodes());
    seed.push(EgoState::new(x, v, a));

    for dt in horizon.dts() {
        v += a * dt;
        if v < 0.0 {
            v = 0.0;
            a = 0.0;
        }
        x += v * dt;
        seed.push(EgoState::new(x, v, a));
    }

    seed
}

#[cfg(test)]
mod test {
    use super::*;

    fn lead(distance_m: f64, velocity_ms: f64) -> LeadKinematics {
        LeadKinematics {
            distance_m,
            velocity_ms,
            accel_mss: 0.0,
            accel_decay_tau: 1.5,
        }
    }

    #[test]
    fn test_faster_lead_coasts() {
        let h = Horizon::quadratic(32, 10.0).unwrap();
        let seed = init_with_sim(&h, 20.0, &lead(30.0, 25.0));

        assert_eq!(seed.len(), 33);
        // A lead pulling away still gives a small braking estimate from the
        // squared closing speed, so check the seed doesn't speed up
        assert!(seed.iter().all(|s| s.velocity_ms <= 20.0));
        assert_eq!(seed[0].position_m, 0.0);
        assert!(seed.windows(2).all(|w| w[1].position_m >= w[0].position_m));
    }

    #[test]
    fn test_stops_behind_stopped_lead() {
        let h = Horizon::quadratic(32, 10.0).unwrap();
        let seed = init_with_sim(&h, 15.0, &lead(25.0, 0.0));

        // Brakes at 225 / 50.01 m/s^2 and stops within the horizon
        assert!((seed[0].accel_mss + 225.0 / 50.01).abs() < 1e-9);
        let last = seed[32];
        assert_eq!(last.velocity_ms, 0.0);
        assert_eq!(last.accel_mss, 0.0);
        assert!(seed.iter().all(|s| s.velocity_ms >= 0.0));
        assert!(last.position_m < 30.0);
    }
}
