/// DNG color calibration metadata.

use num_rational::Rational32;
use serde::{Deserialize, Serialize};

use crate::color::Vec3;
use crate::error::{ConvertError, Result};

/// Manufacturer calibration for the two reference illuminants, plus the
/// as-shot neutral. All matrices are 3x3, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMetadata {
    /// EXIF LightSource code of the first reference illuminant
    pub reference_illuminant1: u16,
    /// EXIF LightSource code of the second reference illuminant
    pub reference_illuminant2: u16,
    pub calibration_transform1: [f32; 9],
    pub calibration_transform2: [f32; 9],
    /// XYZ → camera, per illuminant
    pub color_matrix1: [f32; 9],
    pub color_matrix2: [f32; 9],
    /// White-balanced camera → XYZ (D50), per illuminant
    pub forward_transform1: [f32; 9],
    pub forward_transform2: [f32; 9],
    /// Camera response to a neutral scene element
    pub neutral_color_point: [Rational32; 3],
}

impl CalibrationMetadata {
    pub const IDENTITY: [f32; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

    /// Neutral point as floating point channel values.
    pub fn neutral_vector(&self) -> Vec3 {
        let [r, g, b] = self.neutral_color_point.map(|r| rational_to_f64(&r));
        Vec3::new(r, g, b)
    }

    /// Check that every value the solver reads is usable.
    pub fn validate(&self) -> Result<()> {
        let matrices = [
            ("CalibrationTransform1", &self.calibration_transform1),
            ("CalibrationTransform2", &self.calibration_transform2),
            ("ColorMatrix1", &self.color_matrix1),
            ("ColorMatrix2", &self.color_matrix2),
            ("ForwardTransform1", &self.forward_transform1),
            ("ForwardTransform2", &self.forward_transform2),
        ];
        for (name, m) in matrices {
            if !m.iter().all(|v| v.is_finite()) {
                return Err(ConvertError::invalid(format!("{} has non-finite entries", name)));
            }
        }
        for (i, channel) in self.neutral_color_point.iter().enumerate() {
            if *channel.denom() == 0 {
                return Err(ConvertError::invalid(format!(
                    "NeutralColorPoint channel {} has a zero denominator",
                    i
                )));
            }
            if rational_to_f64(channel) <= 0.0 {
                return Err(ConvertError::invalid(format!(
                    "NeutralColorPoint channel {} must be positive",
                    i
                )));
            }
        }
        Ok(())
    }
}

fn rational_to_f64(r: &Rational32) -> f64 {
    f64::from(*r.numer()) / f64::from(*r.denom())
}
