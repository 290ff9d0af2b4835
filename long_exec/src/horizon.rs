//! # Planning horizon
//!
//! The horizon is the fixed sequence of future time offsets the trajectory is
//! planned over. It is shared by the lead extrapolation, the obstacle
//! selection, the simulated seeds and the solver, so it is built once and
//! passed around by reference.
//!
//! The default schedule is quadratic, `t_i = T * (i / N)^2`, which packs the
//! nodes close together near the present where the plan is executed and
//! spreads them out towards the end of the horizon.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A non-uniform, strictly increasing planning horizon starting at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Horizon {
    t_s: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum HorizonError {
    #[error("A horizon needs at least one step")]
    NoSteps,

    #[error("The horizon duration must be positive and finite, found {0}")]
    InvalidDuration(f64),

    #[error("The horizon must start at 0 s, found {0}")]
    NonZeroStart(f64),

    #[error("The horizon must be strictly increasing, but node {0} is not after node {1}")]
    NotIncreasing(usize, usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Horizon {
    /// Build the quadratic schedule with `num_steps` intervals over
    /// `duration_s` seconds.
    pub fn quadratic(num_steps: usize, duration_s: f64) -> Result<Self, HorizonError> {
        if num_steps == 0 {
            return Err(HorizonError::NoSteps);
        }
        if !(duration_s.is_finite() && duration_s > 0.0) {
            return Err(HorizonError::InvalidDuration(duration_s));
        }

        let n = num_steps as f64;
        let t_s = (0..=num_steps)
            .map(|i| duration_s * (i as f64 / n).powi(2))
            .collect();

        Ok(Self { t_s })
    }

    /// Build a horizon from explicit node times.
    pub fn from_times(t_s: Vec<f64>) -> Result<Self, HorizonError> {
        if t_s.len() < 2 {
            return Err(HorizonError::NoSteps);
        }
        if t_s[0] != 0.0 {
            return Err(HorizonError::NonZeroStart(t_s[0]));
        }
        for i in 1..t_s.len() {
            // Written this way round so that NaNs are rejected too
            if !(t_s[i] > t_s[i - 1]) {
                return Err(HorizonError::NotIncreasing(i, i - 1));
            }
        }

        Ok(Self { t_s })
    }

    /// Number of intervals, `N`.
    pub fn num_steps(&self) -> usize {
        self.t_s.len() - 1
    }

    /// Number of nodes, `N + 1`.
    pub fn num_nodes(&self) -> usize {
        self.t_s.len()
    }

    /// Node times in seconds.
    pub fn times(&self) -> &[f64] {
        &self.t_s
    }

    /// Duration of the interval between node `i` and `i + 1`.
    ///
    /// # Panics
    /// - If `i >= self.num_steps()`.
    pub fn dt(&self, i: usize) -> f64 {
        self.t_s[i + 1] - self.t_s[i]
    }

    /// Iterate over all interval durations.
    pub fn dts(&self) -> impl Iterator<Item = f64> + '_ {
        self.t_s.windows(2).map(|w| w[1] - w[0])
    }

    /// Final node time.
    pub fn duration_s(&self) -> f64 {
        self.t_s[self.t_s.len() - 1]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_quadratic() {
        let h = Horizon::quadratic(32, 10.0).unwrap();

        assert_eq!(h.num_steps(), 32);
        assert_eq!(h.num_nodes(), 33);
        assert_eq!(h.times()[0], 0.0);
        assert!((h.duration_s() - 10.0).abs() < 1e-12);
        assert!((h.times()[16] - 2.5).abs() < 1e-12);

        // Intervals grow along the horizon
        let dts: Vec<f64> = h.dts().collect();
        assert_eq!(dts.len(), 32);
        assert!(dts.windows(2).all(|w| w[1] > w[0]));
        assert!((h.dt(0) - 10.0 / 1024.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid() {
        assert_eq!(Horizon::quadratic(0, 10.0), Err(HorizonError::NoSteps));
        assert_eq!(
            Horizon::quadratic(4, -1.0),
            Err(HorizonError::InvalidDuration(-1.0))
        );
        assert_eq!(
            Horizon::from_times(vec![0.5, 1.0]),
            Err(HorizonError::NonZeroStart(0.5))
        );
        assert_eq!(
            Horizon::from_times(vec![0.0, 1.0, 1.0]),
            Err(HorizonError::NotIncreasing(2, 1))
        );
        assert!(Horizon::from_times(vec![0.0, 0.1, 0.5]).is_ok());
    }
}
