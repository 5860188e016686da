/// Camera-to-XYZ solver for DNG dual-illuminant calibration.
///
/// A DNG carries calibration for two reference illuminants. The transform for
/// the actual scene is a blend of the two, weighted by how close the scene's
/// correlated color temperature is to each reference. The scene temperature
/// itself depends on the blend, so the weight is found iteratively.

use tracing::{debug, warn};

use super::illuminant::Illuminant;
use super::matrix::{self, Mat3, Vec3};
use super::{d50, BRADFORD, PROPHOTO_TO_XYZ, XYZ_TO_PROPHOTO, XYZ_TO_SRGB_BRADFORD};
use crate::error::{ConvertError, Result};
use crate::raw::CalibrationMetadata;

/// Starting guess for the interpolation factor.
pub const INITIAL_FACTOR: f64 = 0.5;
/// The search stops once a damped step is at most this large.
pub const FACTOR_TOLERANCE: f64 = 1e-4;
/// Upper bound on search iterations before settling for the current estimate.
pub const MAX_ITERATIONS: u32 = 30;

/// Outcome of the interpolation factor search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationSolution {
    /// Blend weight of the second reference illuminant, in [0, 1].
    pub factor: f64,
    /// Size of the last damped step.
    pub residual: f64,
    pub iterations: u32,
    /// False when the iteration budget ran out before reaching tolerance.
    pub converged: bool,
}

/// Every transform derived for one conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorTransformSet {
    /// White-balanced sensor RGB → CIE XYZ (D50).
    pub sensor_to_xyz: Mat3,
    /// White-balanced sensor RGB → linear ProPhoto RGB.
    pub sensor_to_working: Mat3,
    /// Linear ProPhoto RGB → linear sRGB (D65).
    pub working_to_srgb: Mat3,
    pub interpolation_factor: f64,
    pub converged: bool,
}

/// Rescale a DNG ColorMatrix so that D50 white maps to a maximum channel
/// value of exactly 1, removing headroom.
pub fn normalize_color_matrix(m: &Mat3) -> Mat3 {
    let white = matrix::map(m, d50());
    let max = matrix::max_component(white);
    if max > 0.0 {
        matrix::scale(1.0 / max, m)
    } else {
        *m
    }
}

/// Rescale a DNG ForwardMatrix so that sensor white [1, 1, 1] maps exactly to
/// D50 in XYZ.
pub fn normalize_forward_matrix(m: &Mat3) -> Mat3 {
    let xyz = matrix::map(m, Vec3::new(1.0, 1.0, 1.0));
    let unit = matrix::diagonal(Vec3::new(1.0 / xyz.x, 1.0 / xyz.y, 1.0 / xyz.z));
    let intermediate = matrix::multiply(&unit, m);
    matrix::multiply(&matrix::diagonal(d50()), &intermediate)
}

/// CIE 1931 xy chromaticity of an XYZ triple.
pub fn xy_chromaticity(xyz: Vec3) -> (f64, f64) {
    let sum = xyz.x + xyz.y + xyz.z;
    (xyz.x / sum, xyz.y / sum)
}

/// Correlated color temperature from xy chromaticity, using McCamy's cubic
/// approximation (Color Research & Application 17 (2): 142–144, 1992).
pub fn correlated_color_temperature(x: f64, y: f64) -> f64 {
    let n = (x - 0.332) / (y - 0.1858);
    -449.0 * n.powi(3) + 3525.0 * n.powi(2) - 6823.3 * n + 5520.33
}

fn lookup_temperature(slot: u8, code: u16) -> Result<f64> {
    Illuminant::from_code(code)
        .map(|i| f64::from(i.color_temperature()))
        .ok_or(ConvertError::UnknownIlluminant { slot, code })
}

/// Find the blend factor between the two reference illuminants that matches
/// the scene's neutral color point.
///
/// `color1`/`color2` must already be normalized with
/// [`normalize_color_matrix`]. A factor of 0 selects illuminant 1 and 1
/// selects illuminant 2.
#[allow(clippy::too_many_arguments)]
pub fn solve_interpolation_factor(
    illuminant1: u16,
    illuminant2: u16,
    calib1: &Mat3,
    calib2: &Mat3,
    color1: &Mat3,
    color2: &Mat3,
    neutral: Vec3,
) -> Result<InterpolationSolution> {
    let temperature1 = lookup_temperature(1, illuminant1)?;
    let temperature2 = lookup_temperature(2, illuminant2)?;
    debug!(temperature1, temperature2, "reference color temperatures");

    let xyz_to_camera1 = matrix::multiply(calib1, color1);
    let xyz_to_camera2 = matrix::multiply(calib2, color2);
    debug!(?xyz_to_camera1, ?xyz_to_camera2, "finding interpolation factor");

    let lower = temperature1.min(temperature2);
    let upper = temperature1.max(temperature2);

    let mut factor = INITIAL_FACTOR;
    let mut residual = f64::MAX;
    let mut iterations = 0;

    while residual > FACTOR_TOLERANCE && iterations < MAX_ITERATIONS {
        let xyz_to_camera = matrix::lerp(&xyz_to_camera1, &xyz_to_camera2, factor);
        let camera_to_xyz = matrix::invert(&xyz_to_camera)
            .ok_or(ConvertError::SingularMatrix("interpolated XYZ to camera matrix"))?;

        let neutral_guess = matrix::map(&camera_to_xyz, neutral);
        let (x, y) = xy_chromaticity(neutral_guess);
        if !x.is_finite() || !y.is_finite() {
            return Err(ConvertError::SingularMatrix("interpolated XYZ to camera matrix"));
        }
        let temperature = correlated_color_temperature(x, y);

        let mut next = if temperature <= lower {
            1.0
        } else if temperature >= upper {
            0.0
        } else {
            (1.0 / temperature - 1.0 / upper) / (1.0 / lower - 1.0 / upper)
        };
        // `next` weighs the lower temperature so far; make it the weight of illuminant 2
        if lower == temperature1 {
            next = 1.0 - next;
        }

        let damped = (next + factor) / 2.0;
        residual = (damped - factor).abs();
        factor = damped;
        iterations += 1;

        debug!(iterations, x, y, temperature, factor, "interpolation step");
    }

    let converged = residual <= FACTOR_TOLERANCE;
    if !converged {
        warn!(
            factor,
            residual, "could not converge on interpolation factor, using best estimate"
        );
    }

    Ok(InterpolationSolution {
        factor,
        residual,
        iterations,
        converged,
    })
}

/// Camera-to-XYZ(D50) transform from the DNG forward matrices.
///
/// The forward matrices must already be normalized with
/// [`normalize_forward_matrix`]. The result applies to camera values that
/// have been divided by the neutral point.
pub fn derive_sensor_to_xyz(
    forward1: &Mat3,
    forward2: &Mat3,
    calib1: &Mat3,
    calib2: &Mat3,
    neutral: Vec3,
    factor: f64,
) -> Result<Mat3> {
    let calib = matrix::lerp(calib1, calib2, factor);
    let calib_inverse = matrix::invert(&calib)
        .ok_or(ConvertError::SingularMatrix("interpolated calibration transform"))?;

    let reference_neutral = matrix::map(&calib_inverse, neutral);
    let max = matrix::max_component(reference_neutral);
    let d = matrix::diagonal(Vec3::new(
        max / reference_neutral.x,
        max / reference_neutral.y,
        max / reference_neutral.z,
    ));
    debug!(?reference_neutral, "reference neutral");

    let forward = matrix::lerp(forward1, forward2, factor);
    Ok(matrix::multiply(
        &forward,
        &matrix::multiply(&d, &calib_inverse),
    ))
}

/// Camera-to-XYZ(D50) transform for calibrations without usable forward
/// matrices.
///
/// Inverts the blended XYZ-to-camera matrix, re-applies the neutral gains the
/// first stage divides out, and Bradford-adapts the scene white to D50.
pub fn derive_sensor_to_xyz_without_forward(
    color1: &Mat3,
    color2: &Mat3,
    calib1: &Mat3,
    calib2: &Mat3,
    neutral: Vec3,
    factor: f64,
) -> Result<Mat3> {
    let xyz_to_camera = matrix::lerp(
        &matrix::multiply(calib1, color1),
        &matrix::multiply(calib2, color2),
        factor,
    );
    let camera_to_xyz = matrix::invert(&xyz_to_camera)
        .ok_or(ConvertError::SingularMatrix("interpolated XYZ to camera matrix"))?;

    let balanced_to_xyz = matrix::multiply(&camera_to_xyz, &matrix::diagonal(neutral));
    let scene_white = matrix::map(&balanced_to_xyz, Vec3::new(1.0, 1.0, 1.0));
    let adapt = bradford_adaptation(scene_white, d50())?;
    let adapted = matrix::multiply(&adapt, &balanced_to_xyz);

    // Pin the neutral exactly on D50 after adaptation rounding
    let white = matrix::map(&adapted, Vec3::new(1.0, 1.0, 1.0));
    let fix = matrix::diagonal(Vec3::new(
        super::D50_XYZ[0] / white.x,
        super::D50_XYZ[1] / white.y,
        super::D50_XYZ[2] / white.z,
    ));
    Ok(matrix::multiply(&fix, &adapted))
}

/// Bradford chromatic adaptation from `source` white to `target` white.
fn bradford_adaptation(source: Vec3, target: Vec3) -> Result<Mat3> {
    let cone = matrix::from_row_major(BRADFORD);
    let cone_inverse =
        matrix::invert(&cone).ok_or(ConvertError::SingularMatrix("Bradford cone matrix"))?;
    let s = matrix::map(&cone, source);
    let t = matrix::map(&cone, target);
    let gains = matrix::diagonal(Vec3::new(t.x / s.x, t.y / s.y, t.z / s.z));
    Ok(matrix::multiply(
        &cone_inverse,
        &matrix::multiply(&gains, &cone),
    ))
}

/// Compose the working-space transforms around a solved sensor-to-XYZ matrix.
///
/// Returns `(sensor_to_working, working_to_srgb)`.
pub fn compose_working_transforms(sensor_to_xyz: &Mat3) -> (Mat3, Mat3) {
    let sensor_to_working =
        matrix::multiply(&matrix::from_row_major(XYZ_TO_PROPHOTO), sensor_to_xyz);
    let working_to_srgb = matrix::multiply(
        &matrix::from_row_major(XYZ_TO_SRGB_BRADFORD),
        &matrix::from_row_major(PROPHOTO_TO_XYZ),
    );
    (sensor_to_working, working_to_srgb)
}

/// A forward matrix of all zeros marks a DNG without ForwardMatrix tags.
fn is_absent(m: &Mat3) -> bool {
    matrix::to_row_major(m).iter().all(|v| *v == 0.0)
}

/// Run the full solver for one set of calibration metadata.
pub fn solve(
    calibration: &CalibrationMetadata,
    use_forward_matrix: bool,
) -> Result<ColorTransformSet> {
    let neutral = calibration.neutral_vector();
    let calib1 = matrix::from_row_major_f32(calibration.calibration_transform1);
    let calib2 = matrix::from_row_major_f32(calibration.calibration_transform2);
    let color1 = normalize_color_matrix(&matrix::from_row_major_f32(calibration.color_matrix1));
    let color2 = normalize_color_matrix(&matrix::from_row_major_f32(calibration.color_matrix2));
    debug!(?color1, ?color2, "normalized color matrices");

    let solution = solve_interpolation_factor(
        calibration.reference_illuminant1,
        calibration.reference_illuminant2,
        &calib1,
        &calib2,
        &color1,
        &color2,
        neutral,
    )?;
    debug!(factor = solution.factor, "interpolation factor used");

    let forward1 = matrix::from_row_major_f32(calibration.forward_transform1);
    let forward2 = matrix::from_row_major_f32(calibration.forward_transform2);
    let has_forward = !is_absent(&forward1) && !is_absent(&forward2);
    if use_forward_matrix && !has_forward {
        warn!("forward matrices missing, deriving camera transform from color matrices");
    }

    let sensor_to_xyz = if use_forward_matrix && has_forward {
        let forward1 = normalize_forward_matrix(&forward1);
        let forward2 = normalize_forward_matrix(&forward2);
        debug!(?forward1, ?forward2, "normalized forward matrices");
        derive_sensor_to_xyz(&forward1, &forward2, &calib1, &calib2, neutral, solution.factor)?
    } else {
        derive_sensor_to_xyz_without_forward(
            &color1,
            &color2,
            &calib1,
            &calib2,
            neutral,
            solution.factor,
        )?
    };
    if !matrix::is_finite(&sensor_to_xyz) {
        return Err(ConvertError::SingularMatrix("sensor to XYZ transform"));
    }
    debug!(?sensor_to_xyz, "sensor to XYZ transform used");

    let (sensor_to_working, working_to_srgb) = compose_working_transforms(&sensor_to_xyz);
    debug!(?sensor_to_working, "sensor to ProPhoto transform used");

    Ok(ColorTransformSet {
        sensor_to_xyz,
        sensor_to_working,
        working_to_srgb,
        interpolation_factor: solution.factor,
        converged: solution.converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::D50_XYZ;
    use cgmath::SquareMatrix;
    use num_rational::Rational32;

    fn identity() -> Mat3 {
        Mat3::identity()
    }

    fn assert_vec_close(v: Vec3, expected: [f64; 3], tolerance: f64) {
        assert!((v.x - expected[0]).abs() < tolerance, "x: {} vs {}", v.x, expected[0]);
        assert!((v.y - expected[1]).abs() < tolerance, "y: {} vs {}", v.y, expected[1]);
        assert!((v.z - expected[2]).abs() < tolerance, "z: {} vs {}", v.z, expected[2]);
    }

    // A plausible daylight-ish color matrix (XYZ -> camera)
    fn sample_color_matrix() -> Mat3 {
        matrix::from_row_major([
            0.6722, -0.0635, -0.0963, -0.4287, 1.2460, 0.2028, -0.0908, 0.2162, 0.5668,
        ])
    }

    fn sample_forward_matrix() -> Mat3 {
        matrix::from_row_major([
            0.7978, 0.1352, 0.0313, 0.2880, 0.7119, 0.0001, 0.0, 0.0, 0.8251,
        ])
    }

    #[test]
    fn test_normalize_forward_matrix_maps_white_to_d50() {
        let m = normalize_forward_matrix(&sample_forward_matrix());
        let white = matrix::map(&m, Vec3::new(1.0, 1.0, 1.0));
        assert_vec_close(white, D50_XYZ, 1e-9);
    }

    #[test]
    fn test_normalize_color_matrix_max_is_one() {
        let m = normalize_color_matrix(&matrix::scale(3.7, &sample_color_matrix()));
        let v = matrix::map(&m, d50());
        assert!((matrix::max_component(v) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_color_matrix_keeps_non_positive() {
        let m = matrix::scale(-1.0, &identity());
        assert_eq!(normalize_color_matrix(&m), m);
    }

    #[test]
    fn test_mccamy_d65() {
        // D65 chromaticity is about 6504K
        let cct = correlated_color_temperature(0.31271, 0.32902);
        assert!((cct - 6504.0).abs() < 20.0, "cct = {}", cct);
    }

    #[test]
    fn test_identical_illuminants_give_finite_factor() {
        let color = normalize_color_matrix(&sample_color_matrix());
        let solution = solve_interpolation_factor(
            21,
            21,
            &identity(),
            &identity(),
            &color,
            &color,
            Vec3::new(0.5, 1.0, 0.6),
        )
        .unwrap();
        assert!(solution.factor.is_finite());
        assert!((0.0..=1.0).contains(&solution.factor));
    }

    #[test]
    fn test_sensor_to_xyz_invariant_to_factor_for_identical_endpoints() {
        let forward = normalize_forward_matrix(&sample_forward_matrix());
        let calib = matrix::from_row_major([1.02, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.97]);
        let neutral = Vec3::new(0.45, 1.0, 0.7);
        let a = derive_sensor_to_xyz(&forward, &forward, &calib, &calib, neutral, 0.1).unwrap();
        let b = derive_sensor_to_xyz(&forward, &forward, &calib, &calib, neutral, 0.9).unwrap();
        let (a, b) = (matrix::to_row_major(&a), matrix::to_row_major(&b));
        for i in 0..9 {
            assert!((a[i] - b[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unknown_illuminant_is_rejected() {
        let err = solve_interpolation_factor(
            21,
            99,
            &identity(),
            &identity(),
            &identity(),
            &identity(),
            Vec3::new(1.0, 1.0, 1.0),
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::UnknownIlluminant { slot: 2, code: 99 }));
    }

    #[test]
    fn test_singular_calibration_is_rejected() {
        let zero = matrix::scale(0.0, &identity());
        let err = derive_sensor_to_xyz(
            &identity(),
            &identity(),
            &zero,
            &zero,
            Vec3::new(1.0, 1.0, 1.0),
            0.5,
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::SingularMatrix(_)));

        let err = solve_interpolation_factor(
            21,
            17,
            &zero,
            &zero,
            &identity(),
            &identity(),
            Vec3::new(1.0, 1.0, 1.0),
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::SingularMatrix(_)));
    }

    #[test]
    fn test_factor_tracks_scene_temperature() {
        // Illuminant 1 = Standard A (2856K), illuminant 2 = D65 (6504K).
        // With identity matrices the neutral point is the scene white in XYZ.
        let solve_for = |xyz: [f64; 3]| {
            solve_interpolation_factor(
                17,
                21,
                &identity(),
                &identity(),
                &identity(),
                &identity(),
                Vec3::new(xyz[0], xyz[1], xyz[2]),
            )
            .unwrap()
        };
        // D65 white in XYZ
        let daylight = solve_for([0.95047, 1.0, 1.08883]);
        // Standard A white in XYZ
        let tungsten = solve_for([1.09850, 1.0, 0.35585]);
        assert!(daylight.converged && tungsten.converged);
        assert!(daylight.factor > 0.95, "daylight factor {}", daylight.factor);
        assert!(tungsten.factor < 0.05, "tungsten factor {}", tungsten.factor);
    }

    #[test]
    fn test_oscillating_search_stops_at_iteration_cap() {
        // The scene temperature lands below 2856K at a factor of 1/3 and above
        // 6504K at 2/3, so the damped search bounces between the two.
        let color1 = matrix::diagonal(Vec3::new(-3.0, 1.0, -3.0));
        let color2 = matrix::diagonal(Vec3::new(-3.0, 1.0, 1.25));
        let solution = solve_interpolation_factor(
            17,
            21,
            &identity(),
            &identity(),
            &color1,
            &color2,
            Vec3::new(1.0, 1.0, 1.0),
        )
        .unwrap();
        assert!(!solution.converged);
        assert_eq!(solution.iterations, MAX_ITERATIONS);
        assert!(solution.factor.is_finite());
        assert!(solution.residual > 0.3, "residual {}", solution.residual);
    }

    #[test]
    fn test_zero_neutral_is_rejected_in_search() {
        let err = solve_interpolation_factor(
            17,
            21,
            &identity(),
            &identity(),
            &identity(),
            &identity(),
            Vec3::new(0.0, 0.0, 0.0),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConvertError::SingularMatrix("interpolated XYZ to camera matrix")
        ));
    }

    #[test]
    fn test_without_forward_maps_neutral_to_d50() {
        let color = normalize_color_matrix(&sample_color_matrix());
        let neutral = Vec3::new(0.48, 1.0, 0.66);
        let m = derive_sensor_to_xyz_without_forward(
            &color,
            &color,
            &identity(),
            &identity(),
            neutral,
            0.5,
        )
        .unwrap();
        let white = matrix::map(&m, Vec3::new(1.0, 1.0, 1.0));
        assert_vec_close(white, D50_XYZ, 1e-9);
    }

    #[test]
    fn test_solve_identity_calibration() {
        let calibration = CalibrationMetadata {
            reference_illuminant1: 21,
            reference_illuminant2: 21,
            calibration_transform1: CalibrationMetadata::IDENTITY,
            calibration_transform2: CalibrationMetadata::IDENTITY,
            color_matrix1: CalibrationMetadata::IDENTITY,
            color_matrix2: CalibrationMetadata::IDENTITY,
            forward_transform1: CalibrationMetadata::IDENTITY,
            forward_transform2: CalibrationMetadata::IDENTITY,
            neutral_color_point: [Rational32::new(1, 1); 3],
        };
        let set = solve(&calibration, true).unwrap();
        // Forward normalization turns the identity into diag(D50)
        let m = matrix::to_row_major(&set.sensor_to_xyz);
        assert!((m[0] - D50_XYZ[0]).abs() < 1e-6);
        assert!((m[4] - D50_XYZ[1]).abs() < 1e-6);
        assert!((m[8] - D50_XYZ[2]).abs() < 1e-6);
        assert!(m[1].abs() < 1e-9 && m[3].abs() < 1e-9);
        // ProPhoto white is D50, so sensor white lands near [1, 1, 1]
        let working = matrix::map(&set.sensor_to_working, Vec3::new(1.0, 1.0, 1.0));
        assert_vec_close(working, [1.0, 1.0, 1.0], 1e-3);
    }

    #[test]
    fn test_solve_falls_back_without_forward_matrices() {
        let calibration = CalibrationMetadata {
            reference_illuminant1: 17,
            reference_illuminant2: 21,
            calibration_transform1: CalibrationMetadata::IDENTITY,
            calibration_transform2: CalibrationMetadata::IDENTITY,
            color_matrix1: CalibrationMetadata::IDENTITY,
            color_matrix2: CalibrationMetadata::IDENTITY,
            forward_transform1: [0.0; 9],
            forward_transform2: [0.0; 9],
            neutral_color_point: [
                Rational32::new(1, 2),
                Rational32::new(1, 1),
                Rational32::new(2, 3),
            ],
        };
        let set = solve(&calibration, true).unwrap();
        let white = matrix::map(&set.sensor_to_xyz, Vec3::new(1.0, 1.0, 1.0));
        assert_vec_close(white, D50_XYZ, 1e-9);
    }
}
