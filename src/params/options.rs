/// User-selectable processing options
///
/// These values come from the host's preferences and steer the second GPU
/// stage. They are serialized to JSON so hosts can persist them alongside
/// their own settings.

use serde::{Deserialize, Serialize};

use crate::color::ToneCurve;
use crate::error::{ConvertError, Result};

/// Post-processing presets offered to the user
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PostProcessMode {
    /// Tone mapping only, no sharpening or contrast enhancement
    Disabled,
    /// Mild sharpening and local contrast
    #[default]
    Natural,
    /// Strong sharpening and contrast
    Boosted,
}

/// All options for one conversion
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ProcessingOptions {
    // ========== Tone ==========

    /// Tone mapping curve applied per channel in the working space
    pub tone_curve: ToneCurve,

    /// Post-processing curve applied after tone mapping
    /// - `ToneCurve::IDENTITY` = no adjustment
    pub post_process_curve: ToneCurve,

    // ========== Detail ==========

    /// Unsharp mask strength on luminance
    /// - 0.0 = no sharpening
    pub sharpen_factor: f32,

    /// Blend toward the histogram-equalized luminance
    /// - 0.0 = no adjustment, 1.0 = full equalization
    pub histogram_factor: f32,

    // ========== Color ==========

    /// Use the DNG forward matrices when present
    /// - false = derive the camera transform from the color matrices
    pub use_forward_matrix: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self::preset(PostProcessMode::default())
    }
}

impl ProcessingOptions {
    /// Options for a post-processing preset
    pub fn preset(mode: PostProcessMode) -> Self {
        let (post_process_curve, sharpen_factor, histogram_factor) = match mode {
            PostProcessMode::Disabled => (ToneCurve::IDENTITY, 0.0, 0.0),
            PostProcessMode::Natural => (ToneCurve::new([-0.1, 0.1, 1.0, 0.0]), 0.25, 0.15),
            PostProcessMode::Boosted => (ToneCurve::new([-0.3, 0.3, 1.0, 0.0]), 0.5, 0.3),
        };
        Self {
            tone_curve: ToneCurve::default(),
            post_process_curve,
            sharpen_factor,
            histogram_factor,
            use_forward_matrix: true,
        }
    }

    /// Check every value is usable by the shaders
    pub fn validate(&self) -> Result<()> {
        if !self.tone_curve.is_finite() || !self.post_process_curve.is_finite() {
            return Err(ConvertError::invalid("Tone curve coefficients must be finite"));
        }
        if !self.sharpen_factor.is_finite() || !self.histogram_factor.is_finite() {
            return Err(ConvertError::invalid(
                "Sharpen and histogram factors must be finite",
            ));
        }
        Ok(())
    }

    /// Convert to JSON string for storage
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
