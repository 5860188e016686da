/// Validation and assembly of the per-frame parameter set.
///
/// Everything that can be rejected is rejected here, before a GPU context is
/// touched. The builder borrows the destination bitmap immutably, so a failed
/// build can never modify it.

use tracing::debug;

use super::options::ProcessingOptions;
use crate::bitmap::Bitmap;
use crate::color::matrix;
use crate::color::solver::{self, ColorTransformSet};
use crate::color::{ToneCurve, XYZ_TO_PROPHOTO};
use crate::error::{ConvertError, Result};
use crate::raw::{CalibrationMetadata, CfaPattern, LensShadingMap, RawFrame};

/// Everything the caller supplies for one conversion, except the destination.
#[derive(Debug, Clone, Copy)]
pub struct ConversionRequest<'a> {
    pub frame: &'a RawFrame,
    pub calibration: &'a CalibrationMetadata,
    /// Consumed by stage 1 only; `None` means unit gain
    pub lens_shading: Option<&'a LensShadingMap>,
    /// Top-left corner of the output region in frame coordinates
    pub offset_x: i32,
    pub offset_y: i32,
    pub options: ProcessingOptions,
}

impl<'a> ConversionRequest<'a> {
    pub fn new(frame: &'a RawFrame, calibration: &'a CalibrationMetadata) -> Self {
        Self {
            frame,
            calibration,
            lens_shading: None,
            offset_x: 0,
            offset_y: 0,
            options: ProcessingOptions::default(),
        }
    }
}

/// The validated parameter bundle handed to the GPU stages.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameParams {
    // Stage 1
    pub cfa: CfaPattern,
    pub black_level: [i32; 4],
    pub white_level: i32,
    pub neutral: [f32; 3],
    pub sensor_to_xyz: [f32; 9],

    // Stage 2
    pub xyz_to_prophoto: [f32; 9],
    pub prophoto_to_srgb: [f32; 9],
    pub tone_curve: ToneCurve,
    pub post_process_curve: ToneCurve,
    pub sharpen_factor: f32,
    pub histogram_factor: f32,
    pub output_offset: (u32, u32),
    pub output_size: (u32, u32),

    pub transforms: ColorTransformSet,
}

impl FrameParams {
    /// Validate the request against the destination and solve the color
    /// transforms. Fails on the first violated invariant.
    pub fn build(request: &ConversionRequest<'_>, output: &Bitmap) -> Result<Self> {
        let frame = request.frame;

        output.validate()?;
        if request.offset_x < 0 || request.offset_y < 0 {
            return Err(ConvertError::invalid(format!(
                "Negative offset ({}, {})",
                request.offset_x, request.offset_y
            )));
        }
        frame.validate()?;

        let offset = (request.offset_x as u32, request.offset_y as u32);
        let fits_x = u64::from(output.width) + u64::from(offset.0) <= u64::from(frame.width);
        let fits_y = u64::from(output.height) + u64::from(offset.1) <= u64::from(frame.height);
        if !fits_x || !fits_y {
            return Err(ConvertError::invalid(format!(
                "Raw image with dimensions (w={}, h={}), cannot be converted into sRGB image \
                 with dimensions (w={}, h={}) at offset ({}, {})",
                frame.width, frame.height, output.width, output.height, offset.0, offset.1
            )));
        }

        if let Some(map) = request.lens_shading {
            map.validate()?;
        }
        request.options.validate()?;
        request.calibration.validate()?;

        log_request(request, output);

        let transforms = solver::solve(request.calibration, request.options.use_forward_matrix)?;
        let neutral = request.calibration.neutral_vector();

        let params = Self {
            cfa: frame.cfa,
            black_level: frame.black_level,
            white_level: frame.white_level,
            neutral: [neutral.x as f32, neutral.y as f32, neutral.z as f32],
            sensor_to_xyz: matrix::to_row_major_f32(&transforms.sensor_to_xyz),
            xyz_to_prophoto: XYZ_TO_PROPHOTO.map(|v| v as f32),
            prophoto_to_srgb: matrix::to_row_major_f32(&transforms.working_to_srgb),
            tone_curve: request.options.tone_curve,
            post_process_curve: request.options.post_process_curve,
            sharpen_factor: request.options.sharpen_factor,
            histogram_factor: request.options.histogram_factor,
            output_offset: offset,
            output_size: (output.width, output.height),
            transforms,
        };
        debug!(
            interpolation_factor = params.transforms.interpolation_factor,
            converged = params.transforms.converged,
            sensor_to_xyz = ?params.sensor_to_xyz,
            prophoto_to_srgb = ?params.prophoto_to_srgb,
            "frame parameters assembled"
        );
        Ok(params)
    }
}

fn log_request(request: &ConversionRequest<'_>, output: &Bitmap) {
    let frame = request.frame;
    let calibration = request.calibration;
    debug!(
        width = frame.width,
        height = frame.height,
        stride = frame.stride,
        cfa = ?frame.cfa,
        black_level = ?frame.black_level,
        white_level = frame.white_level,
        "input frame"
    );
    debug!(
        offset_x = request.offset_x,
        offset_y = request.offset_y,
        width = output.width,
        height = output.height,
        "output region"
    );
    debug!(
        illuminant1 = calibration.reference_illuminant1,
        illuminant2 = calibration.reference_illuminant2,
        calibration1 = ?calibration.calibration_transform1,
        calibration2 = ?calibration.calibration_transform2,
        color1 = ?calibration.color_matrix1,
        color2 = ?calibration.color_matrix2,
        forward1 = ?calibration.forward_transform1,
        forward2 = ?calibration.forward_transform2,
        neutral = ?calibration.neutral_color_point,
        "calibration metadata"
    );
    debug!(options = ?request.options, "processing options");
}
