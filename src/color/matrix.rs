/// 3x3 matrix kernel for the color solver
///
/// Thin free functions over cgmath's `Matrix3<f64>`. DNG metadata and the GPU
/// uniforms both use row-major flat arrays, while cgmath stores columns, so
/// every conversion between the two goes through `from_row_major` /
/// `to_row_major`.

use cgmath::{Matrix, Matrix3, SquareMatrix, Vector3};

pub type Mat3 = Matrix3<f64>;
pub type Vec3 = Vector3<f64>;

/// Determinant magnitude below which a matrix is treated as singular.
///
/// Scale dependent: calibration data with unusual magnitudes is accepted or
/// rejected purely on this value.
pub const SINGULARITY_THRESHOLD: f64 = 1e-9;

/// Build a matrix from 9 row-major values
pub fn from_row_major(m: [f64; 9]) -> Mat3 {
    // cgmath's constructor takes columns
    Matrix3::new(
        m[0], m[3], m[6], // Column 0
        m[1], m[4], m[7], // Column 1
        m[2], m[5], m[8], // Column 2
    )
}

/// Build a matrix from 9 row-major `f32` values (DNG tag precision)
pub fn from_row_major_f32(m: [f32; 9]) -> Mat3 {
    from_row_major(m.map(f64::from))
}

/// Flatten back to row-major order
pub fn to_row_major(m: &Mat3) -> [f64; 9] {
    [
        m[0][0], m[1][0], m[2][0], // Row 0
        m[0][1], m[1][1], m[2][1], // Row 1
        m[0][2], m[1][2], m[2][2], // Row 2
    ]
}

/// Flatten to row-major `f32` for GPU upload
pub fn to_row_major_f32(m: &Mat3) -> [f32; 9] {
    to_row_major(m).map(|v| v as f32)
}

/// A · B
pub fn multiply(a: &Mat3, b: &Mat3) -> Mat3 {
    a * b
}

/// Inverse of `m`, or `None` when |det(m)| < [`SINGULARITY_THRESHOLD`].
pub fn invert(m: &Mat3) -> Option<Mat3> {
    if m.determinant().abs() < SINGULARITY_THRESHOLD {
        return None;
    }
    m.invert()
}

pub fn transpose(m: &Mat3) -> Mat3 {
    m.transpose()
}

/// Element-wise scale
pub fn scale(factor: f64, m: &Mat3) -> Mat3 {
    m * factor
}

/// Element-wise `(1 - f)·a + f·b`.
///
/// `f` is not clamped, values outside [0, 1] extrapolate.
pub fn lerp(a: &Mat3, b: &Mat3, f: f64) -> Mat3 {
    a * (1.0 - f) + b * f
}

/// Matrix-vector product M · v
pub fn map(m: &Mat3, v: Vec3) -> Vec3 {
    m * v
}

/// Diagonal matrix with `v` on the diagonal
pub fn diagonal(v: Vec3) -> Mat3 {
    Matrix3::from_diagonal(v)
}

/// Largest of the three components
pub fn max_component(v: Vec3) -> f64 {
    v.x.max(v.y).max(v.z)
}

/// True when all nine entries are finite
pub fn is_finite(m: &Mat3) -> bool {
    to_row_major(m).iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_close(a: &Mat3, b: &Mat3, tolerance: f64) {
        let (a, b) = (to_row_major(a), to_row_major(b));
        for i in 0..9 {
            assert!(
                (a[i] - b[i]).abs() <= tolerance,
                "element {} differs: {} vs {}",
                i,
                a[i],
                b[i]
            );
        }
    }

    #[test]
    fn test_row_major_round_trip_keeps_layout() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let m = from_row_major(values);
        // First row maps (1, 0, 0) to the first column of values
        let v = map(&m, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!((v.x, v.y, v.z), (1.0, 4.0, 7.0));
        assert_eq!(to_row_major(&m), values);
    }

    #[test]
    fn test_multiply_matches_hand_computation() {
        let a = from_row_major([1.0, 2.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0]);
        let b = from_row_major([1.0, 0.0, 0.0, 3.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let c = multiply(&a, &b);
        assert_eq!(
            to_row_major(&c),
            [7.0, 2.0, 0.0, 3.0, 1.0, 0.0, 0.0, 0.0, 2.0]
        );
    }

    #[test]
    fn test_invert_rejects_singular() {
        let zero = from_row_major([0.0; 9]);
        assert!(invert(&zero).is_none());

        let rank_two = from_row_major([1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 1.0, 1.0]);
        assert!(invert(&rank_two).is_none());
    }

    #[test]
    fn test_invert_threshold_is_absolute() {
        // det = 1e-12, below the threshold even though well conditioned
        let tiny = scale(1e-4, &Mat3::identity());
        assert!(invert(&tiny).is_none());
        let small = scale(1e-2, &Mat3::identity());
        assert!(invert(&small).is_some());
    }

    #[test]
    fn test_transpose() {
        let m = from_row_major([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(
            to_row_major(&transpose(&m)),
            [1.0, 4.0, 7.0, 2.0, 5.0, 8.0, 3.0, 6.0, 9.0]
        );
    }

    #[test]
    fn test_lerp_endpoints() {
        let a = from_row_major([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0]);
        let b = from_row_major([0.5, 0.0, -1.0, 2.0, 1.0, 0.0, 3.0, 0.25, 1.0]);
        assert_eq!(lerp(&a, &b, 0.0), a);
        assert_eq!(lerp(&a, &b, 1.0), b);
        assert_close(&lerp(&a, &a, 0.37), &a, 1e-12);
    }

    #[test]
    fn test_lerp_extrapolates() {
        let a = Mat3::identity();
        let b = scale(2.0, &Mat3::identity());
        assert_close(&lerp(&a, &b, 2.0), &scale(3.0, &Mat3::identity()), 1e-12);
        assert_close(&lerp(&a, &b, -1.0), &Mat3::from_value(0.0), 1e-12);
    }

    #[test]
    fn test_diagonal_and_max() {
        let d = diagonal(Vec3::new(2.0, 3.0, 4.0));
        let v = map(&d, Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(max_component(v), 4.0);
        assert!(is_finite(&d));
        assert!(!is_finite(&scale(f64::INFINITY, &d)));
    }

    fn well_conditioned() -> impl Strategy<Value = Mat3> {
        // Diagonally dominant matrices are always invertible
        prop::array::uniform9(-1.0f64..1.0).prop_map(|mut m| {
            m[0] += 4.0;
            m[4] += 4.0;
            m[8] += 4.0;
            from_row_major(m)
        })
    }

    proptest! {
        #[test]
        fn prop_double_inverse_is_identity(m in well_conditioned()) {
            let inv = invert(&m).unwrap();
            let back = invert(&inv).unwrap();
            assert_close(&back, &m, 1e-9);
        }

        #[test]
        fn prop_product_with_inverse_is_identity(m in well_conditioned()) {
            let inv = invert(&m).unwrap();
            assert_close(&multiply(&m, &inv), &Mat3::identity(), 1e-9);
        }

        #[test]
        fn prop_lerp_of_equal_matrices(m in well_conditioned(), f in -3.0f64..3.0) {
            assert_close(&lerp(&m, &m, f), &m, 1e-9);
        }
    }
}
