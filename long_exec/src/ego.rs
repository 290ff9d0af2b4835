//! Ego vehicle state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Longitudinal state of the ego vehicle.
///
/// The position is measured along the ego's path from where it was when the
/// cycle started, so the step-0 position is always zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EgoState {
    /// Units: meters
    pub position_m: f64,

    /// Units: meters/second
    pub velocity_ms: f64,

    /// Units: meters/second^2
    pub accel_mss: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl EgoState {
    pub fn new(position_m: f64, velocity_ms: f64, accel_mss: f64) -> Self {
        Self {
            position_m,
            velocity_ms,
            accel_mss,
        }
    }

    /// The state as a `[position, velocity, acceleration]` column vector.
    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.position_m, self.velocity_ms, self.accel_mss)
    }

    pub fn from_vector(vec: &Vector3<f64>) -> Self {
        Self::new(vec[0], vec[1], vec[2])
    }

    /// True if all fields are finite.
    pub fn is_finite(&self) -> bool {
        self.position_m.is_finite() && self.velocity_ms.is_finite() && self.accel_mss.is_finite()
    }
}
