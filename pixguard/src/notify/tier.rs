use std::fmt;

use serde::{Deserialize, Serialize};

/// Deviation at or below this magnitude counts as zero.
pub const ZERO_EPSILON: f64 = 0.005;

/// Discrete alert level derived from a deviation percentage.
///
/// Ordered: `None < T10 < T20 < ... < T100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Tier {
    /// Below the base threshold.
    #[default]
    None,
    /// 10% band (also used for any value between the threshold and 20%).
    T10,
    /// 20% band.
    T20,
    /// 30% band.
    T30,
    /// 40% band.
    T40,
    /// 50% band.
    T50,
    /// 60% band.
    T60,
    /// 70% band.
    T70,
    /// 80% band.
    T80,
    /// 90% band.
    T90,
    /// 100% and above.
    T100,
}

const BANDS: [Tier; 10] = [
    Tier::T10,
    Tier::T20,
    Tier::T30,
    Tier::T40,
    Tier::T50,
    Tier::T60,
    Tier::T70,
    Tier::T80,
    Tier::T90,
    Tier::T100,
];

impl Tier {
    /// Tier for `value` given the base `threshold` (both in percent).
    ///
    /// Behavior:
    /// - below `threshold` is `None`
    /// - otherwise the 10% band containing `value`, capped at `T100`
    /// - a threshold under 20% still maps low values to `T10`
    #[must_use]
    pub fn calculate(value: f64, threshold: f64) -> Self {
        if value.is_nan() || value < threshold {
            return Self::None;
        }
        let band = (value / 10.0).floor().clamp(1.0, 10.0);
        // band is an integer in 1..=10 here
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = band as usize - 1;
        BANDS[idx]
    }

    /// Lower edge of the band in percent; `0` for `None`.
    #[must_use]
    pub fn floor_percent(self) -> u32 {
        BANDS
            .iter()
            .position(|t| *t == self)
            .map_or(0, |i| (i as u32 + 1) * 10)
    }

    /// Human-readable range label; `None` renders as "below {threshold}%".
    #[must_use]
    pub fn label(self, threshold: f64) -> String {
        match self {
            Self::None => format!("below {threshold:.0}%"),
            Self::T50 => "50% or more".to_owned(),
            other => format!("{}% range", other.floor_percent()),
        }
    }

    /// Presentation color as `0xRRGGBB`.
    #[must_use]
    pub const fn color(self) -> u32 {
        match self {
            Self::None => 0x80_80_80,
            Self::T10 => 0xFF_FF_00,
            Self::T20 => 0xFF_D7_00,
            Self::T30 => 0xFF_A5_00,
            Self::T40 | Self::T60 => 0xFF_45_00,
            Self::T50 => 0xFF_00_00,
            Self::T70 => 0xFF_30_30,
            Self::T80 => 0xDC_14_3C,
            Self::T90 => 0xB2_22_22,
            Self::T100 => 0x7F_00_00,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            other => write!(f, "T{}", other.floor_percent()),
        }
    }
}

/// True when `value` is within [`ZERO_EPSILON`] of zero.
#[must_use]
pub fn is_zero(value: f64) -> bool {
    value.abs() <= ZERO_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_follow_tens() {
        assert_eq!(Tier::calculate(5.0, 10.0), Tier::None);
        assert_eq!(Tier::calculate(10.0, 10.0), Tier::T10);
        assert_eq!(Tier::calculate(19.99, 10.0), Tier::T10);
        assert_eq!(Tier::calculate(22.0, 10.0), Tier::T20);
        assert_eq!(Tier::calculate(55.0, 10.0), Tier::T50);
        assert_eq!(Tier::calculate(99.9, 10.0), Tier::T90);
        assert_eq!(Tier::calculate(100.0, 10.0), Tier::T100);
        assert_eq!(Tier::calculate(250.0, 10.0), Tier::T100);
    }

    #[test]
    fn low_threshold_maps_to_first_band() {
        assert_eq!(Tier::calculate(3.0, 2.0), Tier::T10);
        assert_eq!(Tier::calculate(25.0, 30.0), Tier::None);
        assert_eq!(Tier::calculate(f64::NAN, 0.0), Tier::None);
    }

    #[test]
    fn labels_and_display() {
        assert_eq!(Tier::T30.floor_percent(), 30);
        assert_eq!(Tier::None.floor_percent(), 0);
        assert_eq!(Tier::T30.label(10.0), "30% range");
        assert_eq!(Tier::T50.label(10.0), "50% or more");
        assert_eq!(Tier::None.label(10.0), "below 10%");
        assert_eq!(Tier::T100.to_string(), "T100");
        assert!(Tier::T20 > Tier::T10);
    }

    #[test]
    fn zero_uses_epsilon() {
        assert!(is_zero(0.0));
        assert!(is_zero(0.005));
        assert!(is_zero(-0.004));
        assert!(!is_zero(0.006));
    }
}
