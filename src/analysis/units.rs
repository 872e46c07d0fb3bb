//! SI-prefix rescaling of plot axes: 0.001 V becomes 1 mV.

/// Units never given an SI prefix.
const UNSCALED_UNITS: [&str; 5] = ["", "%", "deg", "rad", "dB"];

const PREFIXES: [(i32, &str); 10] = [
    (-15, "f"),
    (-12, "p"),
    (-9, "n"),
    (-6, "μ"),
    (-3, "m"),
    (0, ""),
    (3, "k"),
    (6, "M"),
    (9, "G"),
    (12, "T"),
];

/// Multiplier and prefixed unit for an axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Rescaled {
    /// Factor the raw values are multiplied by.
    pub factor: f64,
    /// Prefixed unit, e.g. `"mV"`.
    pub unit: String,
}

impl Rescaled {
    /// No rescaling.
    pub fn identity(unit: &str) -> Self {
        Self {
            factor: 1.0,
            unit: unit.to_string(),
        }
    }

    /// Multiply `values` by the factor in place.
    pub fn apply(&self, values: &mut [f64]) {
        values.iter_mut().for_each(|v| *v *= self.factor);
    }
}

/// Pick the SI prefix that brings the largest finite magnitude of `values`
/// into `[1, 1000)`.
///
/// Empty, all-zero or all-NaN inputs, and units in the unscaled list, get factor 1.
/// Magnitudes outside femto..tera are clamped to the nearest prefix.
pub fn rescale(values: &[f64], unit: &str) -> Rescaled {
    if UNSCALED_UNITS.contains(&unit) {
        return Rescaled::identity(unit);
    }
    let max = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .map(f64::abs)
        .fold(0.0, f64::max);
    if max == 0.0 {
        return Rescaled::identity(unit);
    }

    // Nudge so exact powers of ten such as 1e-3 are not floored one decade low.
    let exponent = (((max.log10() + 1e-9) / 3.0).floor() as i32 * 3).clamp(-15, 12);
    let prefix = PREFIXES
        .iter()
        .find(|(e, _)| *e == exponent)
        .map(|(_, p)| *p)
        .unwrap_or("");

    Rescaled {
        factor: 10f64.powi(-exponent),
        unit: format!("{prefix}{unit}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millivolts() {
        let rescaled = rescale(&[0.0, -0.0005, 0.001], "V");
        assert_eq!(rescaled.unit, "mV");
        assert_eq!(rescaled.factor, 1000.0);
        let mut values = [0.001];
        rescaled.apply(&mut values);
        assert!((values[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn prefixes_across_range() {
        assert_eq!(rescale(&[2.5e-9], "A").unit, "nA");
        assert_eq!(rescale(&[999.0], "V").unit, "V");
        assert_eq!(rescale(&[1500.0], "Hz").unit, "kHz");
        assert_eq!(rescale(&[3e-6], "V").unit, "μV");
        assert_eq!(rescale(&[1e-20], "A").unit, "fA");
    }

    #[test]
    fn unscaled_units_and_degenerate_input() {
        assert_eq!(rescale(&[0.001], "deg"), Rescaled::identity("deg"));
        assert_eq!(rescale(&[0.001], ""), Rescaled::identity(""));
        assert_eq!(rescale(&[], "V"), Rescaled::identity("V"));
        assert_eq!(rescale(&[f64::NAN, 0.0], "V"), Rescaled::identity("V"));
    }
}
