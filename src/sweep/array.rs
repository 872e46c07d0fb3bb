//! Sweep array generation.

use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::error::{AppResult, DaqError};

/// Hard cap on the number of points in one sweep array.
pub const MAX_SWEEP_POINTS: usize = 10_000_000;

/// Relative tolerance (in units of `step`) under which a computed point counts as the endpoint.
const ENDPOINT_TOLERANCE: f64 = 1e-9;

/// Ordered, immutable setpoints for one sweep axis.
///
/// Non-empty, finite and strictly monotonic; the first and last elements are the
/// requested endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SweepArray(Vec<f64>);

impl SweepArray {
    /// Validate user-supplied setpoints.
    pub fn from_values(values: Vec<f64>) -> AppResult<Self> {
        let reject = |reason: &str| {
            Err(DaqError::InvalidRange {
                start: values.first().copied().unwrap_or(f64::NAN),
                stop: values.last().copied().unwrap_or(f64::NAN),
                step: f64::NAN,
                reason: reason.to_string(),
            })
        };
        if values.is_empty() {
            return reject("sweep array is empty");
        }
        if values.len() > MAX_SWEEP_POINTS {
            return reject("sweep array is too long");
        }
        if values.iter().any(|v| !v.is_finite()) {
            return reject("sweep array contains non-finite values");
        }
        let ascending = values.windows(2).all(|w| w[0] < w[1]);
        let descending = values.windows(2).all(|w| w[0] > w[1]);
        if !(ascending || descending) {
            return reject("sweep array is not strictly monotonic");
        }
        Ok(Self(values))
    }

    /// First setpoint.
    pub fn first_value(&self) -> f64 {
        self.0[0]
    }

    /// Last setpoint.
    pub fn last_value(&self) -> f64 {
        self.0[self.0.len() - 1]
    }

    /// The setpoints as a slice.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl Deref for SweepArray {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl<'de> Deserialize<'de> for SweepArray {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let values = Vec::<f64>::deserialize(deserializer)?;
        SweepArray::from_values(values).map_err(serde::de::Error::custom)
    }
}

/// Generate the setpoints from `start` to `stop` inclusive, `step` apart.
///
/// The direction follows the sign of `stop - start`. The last interval is shortened
/// so the array ends exactly at `stop`.
///
/// ```
/// use meso_daq::sweep::generate_sweep_array;
///
/// let values = generate_sweep_array(0.0, 1.0, 0.3).unwrap();
/// assert_eq!(values.len(), 5);
/// assert_eq!(values.last_value(), 1.0);
/// ```
pub fn generate_sweep_array(start: f64, stop: f64, step: f64) -> AppResult<SweepArray> {
    let invalid = |reason: &str| DaqError::InvalidRange {
        start,
        stop,
        step,
        reason: reason.to_string(),
    };
    if !(start.is_finite() && stop.is_finite() && step.is_finite()) {
        return Err(invalid("start, stop and step must be finite"));
    }
    if step <= 0.0 {
        return Err(invalid("step must be positive"));
    }

    let span = stop - start;
    let direction = span.signum();
    let intervals = (span.abs() / step + ENDPOINT_TOLERANCE).floor();
    if intervals + 2.0 > MAX_SWEEP_POINTS as f64 {
        return Err(invalid("too many points"));
    }
    let intervals = intervals as usize;

    let mut values: Vec<f64> = (0..=intervals)
        .map(|i| start + direction * step * i as f64)
        .collect();

    // Snap a point that lands on the endpoint, otherwise append the short last step.
    // The first point always stays at `start`.
    let last = values.len() - 1;
    if start == stop {
        return Ok(SweepArray(values));
    }
    if last > 0 && (values[last] - stop).abs() <= step * ENDPOINT_TOLERANCE {
        values[last] = stop;
    } else {
        values.push(stop);
    }

    Ok(SweepArray(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn shortened_last_step_hits_endpoint() {
        let values = generate_sweep_array(0.0, 1.0, 0.3).unwrap();
        assert_close(&values, &[0.0, 0.3, 0.6, 0.9, 1.0]);
        assert_eq!(values.last_value(), 1.0);
    }

    #[test]
    fn exact_multiple_has_no_duplicate_endpoint() {
        let values = generate_sweep_array(0.0, 1.0, 0.2).unwrap();
        assert_close(&values, &[0.0, 0.2, 0.4, 0.6, 0.8, 1.0]);
        assert_eq!(values.last_value(), 1.0);
    }

    #[test]
    fn descending_sweep() {
        let values = generate_sweep_array(1.0, -0.5, 0.5).unwrap();
        assert_close(&values, &[1.0, 0.5, 0.0, -0.5]);
    }

    #[test]
    fn equal_endpoints_give_single_point() {
        let values = generate_sweep_array(0.7, 0.7, 0.1).unwrap();
        assert_eq!(values.as_slice(), &[0.7]);
    }

    #[test]
    fn step_larger_than_span() {
        let values = generate_sweep_array(0.0, 0.1, 1.0).unwrap();
        assert_eq!(values.as_slice(), &[0.0, 0.1]);
    }

    #[test]
    fn span_below_tolerance_keeps_both_endpoints() {
        let values = generate_sweep_array(0.0, 1e-10, 1.0).unwrap();
        assert_eq!(values.as_slice(), &[0.0, 1e-10]);
    }

    #[test]
    fn non_positive_step_is_rejected() {
        for step in [0.0, -0.1, f64::NAN] {
            assert!(matches!(
                generate_sweep_array(0.0, 1.0, step),
                Err(DaqError::InvalidRange { .. })
            ));
        }
    }

    #[test]
    fn oversized_request_is_rejected() {
        assert!(generate_sweep_array(0.0, 1.0, 1e-12).is_err());
    }

    #[test]
    fn monotonic_and_exact_endpoints_over_many_inputs() {
        let cases = [
            (-3.0, 2.5, 0.07),
            (2.5, -3.0, 0.07),
            (0.0, 1e-3, 1e-5),
            (10.0, 9.0, 0.333),
            (-1.0, 1.0, 2.0 / 3.0),
            (0.0, 1e-10, 1.0),
            (0.5, 0.5 - 1e-12, 0.1),
        ];
        for (start, stop, step) in cases {
            let values = generate_sweep_array(start, stop, step).unwrap();
            assert_eq!(values.first_value(), start);
            assert_eq!(values.last_value(), stop);
            let ascending = stop > start;
            for w in values.windows(2) {
                assert!(if ascending { w[0] < w[1] } else { w[0] > w[1] });
                assert!((w[1] - w[0]).abs() <= step * (1.0 + 1e-9));
            }
            assert!(SweepArray::from_values(values.to_vec()).is_ok());
        }
    }

    #[test]
    fn from_values_validates() {
        assert!(SweepArray::from_values(vec![]).is_err());
        assert!(SweepArray::from_values(vec![0.0, 1.0, 1.0]).is_err());
        assert!(SweepArray::from_values(vec![0.0, 2.0, 1.0]).is_err());
        assert!(SweepArray::from_values(vec![0.0, f64::INFINITY]).is_err());
        assert!(SweepArray::from_values(vec![3.0]).is_ok());
        assert!(SweepArray::from_values(vec![3.0, 2.0, -1.0]).is_ok());
    }
}
