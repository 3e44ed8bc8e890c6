//! Physical constants and unit conversions.
//!
//! Everything in the crate is SI: metres, seconds, pascals, cubic metres per second.
//! The helpers here convert from the clinical units found in input files and on the
//! command line.
use std::f64::consts::PI;

/// One millimetre of mercury in pascals.
pub const MMHG: f64 = 133.322_387_415;

/// Dynamic viscosity of blood in Pa·s.
pub const BLOOD_VISCOSITY: f64 = 3.5e-3;

/// Pressure at the root of every normalized tree.
pub const INPUT_PRESSURE: f64 = 98.0 * MMHG;

/// Default pressure at a macrocell sink.
pub const DEFAULT_CELL_PRESSURE: f64 = 25.0 * MMHG;

/// Radius given to every terminal vessel by the normalizer.
pub const TERMINAL_RADIUS: f64 = 11.8e-6;

/// Radius of a freshly created vessel before normalization.
pub const NEW_VESSEL_RADIUS: f64 = 1e-3;

/// Default Murray exponent.
pub const DEFAULT_GAMMA: f64 = 2.7;

/// Default flow into the whole tree (400 mL/min).
pub const DEFAULT_TREE_FLOW: f64 = 400.0 * ML_PER_MINUTE;

/// One millilitre per minute in m³/s.
pub const ML_PER_MINUTE: f64 = 1e-6 / 60.0;

/// Tolerance used for geometric continuity between parent and child.
pub const CONTINUITY_EPS: f64 = 1e-11;

#[inline]
pub fn mm(v: f64) -> f64 {
    v * 1e-3
}

#[inline]
pub fn um(v: f64) -> f64 {
    v * 1e-6
}

#[inline]
pub fn mmhg(v: f64) -> f64 {
    v * MMHG
}

/// Hagen–Poiseuille pressure drop across a cylinder.
#[inline]
pub fn pressure_drop(flow: f64, radius: f64, length: f64) -> f64 {
    flow * 8.0 * BLOOD_VISCOSITY * length / (PI * radius.powi(4))
}

/// Relative difference `|2(a - b)/(a + b)|`, zero when the values are identical.
#[inline]
pub fn relative_difference(a: f64, b: f64) -> f64 {
    if a == b {
        return 0.0;
    }
    (2.0 * (a - b) / (a + b)).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressure_drop_scales_with_inverse_fourth_power() {
        let a = pressure_drop(1e-6, 1e-3, 1e-2);
        let b = pressure_drop(1e-6, 2e-3, 1e-2);
        assert!((a / b - 16.0).abs() < 1e-9);
    }

    #[test]
    fn relative_difference_is_symmetric_and_zero_for_equal() {
        assert_eq!(relative_difference(3.0, 3.0), 0.0);
        assert_eq!(relative_difference(0.0, 0.0), 0.0);
        let d = relative_difference(1.0, 1.1);
        assert!((d - relative_difference(1.1, 1.0)).abs() < 1e-15);
        assert!(relative_difference(1.0, f64::NAN).is_nan());
    }

    #[test]
    fn unit_helpers() {
        assert!((mm(1.5) - 1.5e-3).abs() < 1e-18);
        assert!((um(11.8) - TERMINAL_RADIUS).abs() < 1e-18);
        assert!((mmhg(98.0) - INPUT_PRESSURE).abs() < 1e-9);
    }
}
