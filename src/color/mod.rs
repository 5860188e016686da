/// Color science for DNG RAW conversion
///
/// This module handles conversion between the color spaces involved:
/// - Camera RGB (sensor-native color space)
/// - CIE XYZ with a D50 whitepoint (device-independent color space)
/// - ProPhoto RGB (wide-gamut working space for tone mapping)
/// - sRGB (standard display color space)
///
/// Architecture:
/// - `matrix.rs` - 3x3 matrix kernel
/// - `illuminant.rs` - standard reference illuminants
/// - `solver.rs` - per-scene camera-to-XYZ solver
/// - `tone.rs` - tone curves and the sRGB transfer function

pub mod illuminant;
pub mod matrix;
pub mod solver;
pub mod tone;

pub use illuminant::Illuminant;
pub use matrix::{Mat3, Vec3};
pub use solver::{ColorTransformSet, InterpolationSolution};
pub use tone::ToneCurve;

/// Matrix to convert from CIE XYZ colorspace to sRGB, Bradford-adapted to D65.
pub const XYZ_TO_SRGB_BRADFORD: [f64; 9] = [
     3.1338561, -1.6168667, -0.4906146,
    -0.9787684,  1.9161415,  0.0334540,
     0.0719453, -0.2289914,  1.4052427,
];

/// Matrix to convert from the ProPhoto RGB colorspace to CIE XYZ colorspace.
pub const PROPHOTO_TO_XYZ: [f64; 9] = [
    0.797779, 0.135213, 0.031303,
    0.288000, 0.711900, 0.000100,
    0.000000, 0.000000, 0.825105,
];

/// Matrix to convert from CIE XYZ colorspace to ProPhoto RGB colorspace.
pub const XYZ_TO_PROPHOTO: [f64; 9] = [
     1.345753, -0.255603, -0.051025,
    -0.544426,  1.508096,  0.020472,
     0.000000,  0.000000,  1.211968,
];

/// The D50 whitepoint in CIE XYZ.
pub const D50_XYZ: [f64; 3] = [0.9642, 1.0, 0.8249];

/// Bradford cone response matrix, used for chromatic adaptation.
pub const BRADFORD: [f64; 9] = [
     0.8951,  0.2664, -0.1614,
    -0.7502,  1.7135,  0.0367,
     0.0389, -0.0685,  1.0296,
];

/// D50 whitepoint as a vector
pub fn d50() -> Vec3 {
    Vec3::new(D50_XYZ[0], D50_XYZ[1], D50_XYZ[2])
}
