/// Adapter from decoded RAW files to conversion inputs
///
/// rawloader decodes most camera formats into sensor samples plus a single
/// D65 color matrix. This module reshapes that into a `RawFrame` and a
/// single-illuminant `CalibrationMetadata`, so non-DNG files can go through
/// the same pipeline.

use num_rational::Rational32;
use tracing::{debug, warn};

use super::frame::{CfaColor, CfaPattern, RawFrame};
use super::metadata::CalibrationMetadata;
use crate::color::Illuminant;
use crate::error::{ConvertError, Result};

/// Precision used when turning white balance gains into rationals
const NEUTRAL_DENOMINATOR: i32 = 10_000;

/// Build conversion inputs from a decoded RAW image.
pub fn from_decoded(image: &rawloader::RawImage) -> Result<(RawFrame, CalibrationMetadata)> {
    if image.cpp != 1 {
        return Err(ConvertError::invalid(format!(
            "Expected a Bayer mosaic, got {} components per pixel",
            image.cpp
        )));
    }

    let width = u32::try_from(image.width)
        .map_err(|_| ConvertError::invalid("Raw width out of range"))?;
    let height = u32::try_from(image.height)
        .map_err(|_| ConvertError::invalid("Raw height out of range"))?;

    let tile_colors = [
        image.cfa.color_at(0, 0),
        image.cfa.color_at(0, 1),
        image.cfa.color_at(1, 0),
        image.cfa.color_at(1, 1),
    ];
    let cfa = pattern_from_colors(tile_colors).ok_or_else(|| {
        ConvertError::invalid(format!("Unsupported CFA layout {:?}", tile_colors))
    })?;

    let (samples, black_level, white_level) = match &image.data {
        rawloader::RawImageData::Integer(values) => {
            // Black levels are stored per color, spread them over the tile sites
            let black_level = cfa
                .tile()
                .map(|color| i32::from(image.blacklevels[color as usize]));
            let white_level = image.whitelevels.iter().copied().max().unwrap_or(u16::MAX);
            (values.clone(), black_level, i32::from(white_level))
        }
        rawloader::RawImageData::Float(values) => {
            // Convert f32 (0.0-1.0) to u16 (0-65535)
            let samples = values
                .iter()
                .map(|&v| (v * 65535.0).clamp(0.0, 65535.0) as u16)
                .collect();
            (samples, [0; 4], i32::from(u16::MAX))
        }
    };

    let frame = RawFrame::packed(width, height, cfa, black_level, white_level, samples);
    frame.validate()?;

    let color_matrix = color_matrix_from(&image.xyz_to_cam);
    let neutral = neutral_from_wb(image.wb_coeffs);
    debug!(?cfa, ?black_level, white_level, ?neutral, "decoded raw adapted");

    let daylight = Illuminant::D65.code();
    let calibration = CalibrationMetadata {
        reference_illuminant1: daylight,
        reference_illuminant2: daylight,
        calibration_transform1: CalibrationMetadata::IDENTITY,
        calibration_transform2: CalibrationMetadata::IDENTITY,
        color_matrix1: color_matrix,
        color_matrix2: color_matrix,
        // No forward matrices: the solver derives the transform from the color matrix
        forward_transform1: [0.0; 9],
        forward_transform2: [0.0; 9],
        neutral_color_point: neutral.map(|v| {
            Rational32::new((v * NEUTRAL_DENOMINATOR as f32).round() as i32, NEUTRAL_DENOMINATOR)
        }),
    };

    Ok((frame, calibration))
}

/// Match rawloader color indices (0 = R, 1 = G, 2 = B) of the top-left tile
/// to a Bayer pattern.
pub fn pattern_from_colors(colors: [usize; 4]) -> Option<CfaPattern> {
    let mut tile = [CfaColor::Green; 4];
    for (site, color) in colors.iter().enumerate() {
        tile[site] = match color {
            0 => CfaColor::Red,
            1 => CfaColor::Green,
            2 => CfaColor::Blue,
            _ => return None,
        };
    }
    CfaPattern::from_tile(tile)
}

/// First three rows of rawloader's XYZ → camera matrix, row-major.
pub fn color_matrix_from(xyz_to_cam: &[[f32; 3]; 4]) -> [f32; 9] {
    let has_matrix = xyz_to_cam[..3].iter().flatten().any(|v| *v != 0.0);
    if !has_matrix {
        warn!("No color matrix found, using identity matrix");
        return CalibrationMetadata::IDENTITY;
    }
    let mut m = [0.0; 9];
    for (row, values) in xyz_to_cam[..3].iter().enumerate() {
        m[row * 3..row * 3 + 3].copy_from_slice(values);
    }
    m
}

/// Camera neutral from as-shot white balance multipliers, green = 1.
pub fn neutral_from_wb(wb_coeffs: [f32; 4]) -> [f32; 3] {
    let valid = |c: f32| c.is_finite() && c > 0.0;
    if !valid(wb_coeffs[0]) || !valid(wb_coeffs[1]) || !valid(wb_coeffs[2]) {
        warn!("No white balance data found, using neutral [1.0, 1.0, 1.0]");
        return [1.0, 1.0, 1.0];
    }
    let g = wb_coeffs[1];
    [g / wb_coeffs[0], 1.0, g / wb_coeffs[2]]
}
