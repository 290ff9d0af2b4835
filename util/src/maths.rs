//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Piecewise linear interpolation of `value` over the breakpoints `xs` with
/// values `ys`.
///
/// `xs` must be increasing. Values outside the breakpoints are held at the
/// first or last value. Returns `None` if the slices are empty or of
/// different lengths.
pub fn interp<T>(value: T, xs: &[T], ys: &[T]) -> Option<T>
where
    T: Float
{
    if xs.is_empty() || xs.len() != ys.len() {
        return None;
    }

    let last = xs.len() - 1;

    if value <= xs[0] {
        return Some(ys[0]);
    }
    if value >= xs[last] {
        return Some(ys[last]);
    }

    // Find the segment containing the value
    let idx = xs.iter().position(|x| *x > value)?;

    Some(lin_map((xs[idx - 1], xs[idx]), (ys[idx - 1], ys[idx]), value))
}

/// Return the index of the smallest element, the first one in case of ties.
///
/// Returns `None` for an empty slice or if any element is NaN.
pub fn argmin<T>(values: &[T]) -> Option<usize>
where
    T: Float
{
    let mut best: Option<(usize, T)> = None;

    for (i, v) in values.iter().enumerate() {
        if v.is_nan() {
            return None;
        }
        match best {
            Some((_, b)) if *v >= b => (),
            _ => best = Some((i, *v))
        }
    }

    best.map(|(i, _)| i)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0f64, 1f64), (-1f64, 1f64), 0.5), 0.0);
        assert_eq!(lin_map((0f64, 2f64), (0f64, 10f64), 1.0), 5.0);
    }

    #[test]
    fn test_interp() {
        let xs = [0f64, 1.0, 3.0];
        let ys = [0f64, 10.0, 30.0];

        assert_eq!(interp(-1.0, &xs, &ys), Some(0.0));
        assert_eq!(interp(0.5, &xs, &ys), Some(5.0));
        assert_eq!(interp(2.0, &xs, &ys), Some(20.0));
        assert_eq!(interp(1.0, &xs, &ys), Some(10.0));
        assert_eq!(interp(4.0, &xs, &ys), Some(30.0));
        assert_eq!(interp(1.0, &xs, &ys[..2]), None);
        assert_eq!(interp::<f64>(1.0, &[], &[]), None);
    }

    #[test]
    fn test_argmin() {
        assert_eq!(argmin(&[3f64, 1.0, 2.0]), Some(1));
        assert_eq!(argmin(&[1f64, 1.0, 2.0]), Some(0));
        assert_eq!(argmin::<f64>(&[]), None);
        assert_eq!(argmin(&[1f64, f64::NAN]), None);
    }
}
