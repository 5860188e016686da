/// Cubic tone curves.

use serde::{Deserialize, Serialize};

/// A 3rd order polynomial, coefficients ordered from highest to lowest power.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneCurve {
    pub coeffs: [f32; 4],
}

impl ToneCurve {
    /// Approximation of the ACR3 default tonemapping curve.
    pub const ACR3: ToneCurve = ToneCurve {
        coeffs: [-0.7836, 0.8469, 0.943, 0.0209],
    };

    /// ACR3 curve adjusted to map [0, 1] onto [0, 1].
    pub const ACR3_UNIT: ToneCurve = ToneCurve {
        coeffs: [-0.7836, 0.8469, 0.9367, 0.0],
    };

    pub const IDENTITY: ToneCurve = ToneCurve {
        coeffs: [0.0, 0.0, 1.0, 0.0],
    };

    pub fn new(coeffs: [f32; 4]) -> Self {
        Self { coeffs }
    }

    /// Evaluate at `x` (Horner's scheme, same evaluation order as the shader).
    pub fn evaluate(&self, x: f32) -> f32 {
        let [a, b, c, d] = self.coeffs;
        ((a * x + b) * x + c) * x + d
    }

    pub fn is_finite(&self) -> bool {
        self.coeffs.iter().all(|c| c.is_finite())
    }
}

impl Default for ToneCurve {
    fn default() -> Self {
        Self::ACR3_UNIT
    }
}

/// sRGB transfer function (linear → encoded), input clamped to [0, 1].
pub fn srgb_encode(linear: f32) -> f32 {
    let c = linear.clamp(0.0, 1.0);
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_curve_endpoints() {
        let curve = ToneCurve::default();
        assert_eq!(curve.evaluate(0.0), 0.0);
        assert!((curve.evaluate(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unit_curve_is_monotonic() {
        let curve = ToneCurve::ACR3_UNIT;
        let mut last = curve.evaluate(0.0);
        for i in 1..=100 {
            let v = curve.evaluate(i as f32 / 100.0);
            assert!(v > last, "not monotonic at {}", i);
            last = v;
        }
    }

    #[test]
    fn test_identity_curve() {
        for x in [0.0, 0.25, 0.5, 1.0] {
            assert_eq!(ToneCurve::IDENTITY.evaluate(x), x);
        }
    }

    #[test]
    fn test_srgb_encode() {
        assert_eq!(srgb_encode(0.0), 0.0);
        assert!((srgb_encode(1.0) - 1.0).abs() < 1e-6);
        assert!((srgb_encode(0.18) - 0.4614).abs() < 1e-3);
        assert_eq!(srgb_encode(-1.0), 0.0);
        assert!((srgb_encode(2.0) - 1.0).abs() < 1e-6);
    }
}
