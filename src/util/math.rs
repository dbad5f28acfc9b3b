//! Geometric helpers shared by feature extraction and verification.

/// Clamps a signed pixel coordinate into `[0, len - 1]`.
///
/// `len` must be non-zero.
#[inline]
pub(crate) fn clamp_coord(v: i32, len: u32) -> u32 {
    v.clamp(0, len as i32 - 1) as u32
}

/// Twice the signed area of the triangle `(a, b, c)`.
#[inline]
pub(crate) fn cross2(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// Returns true if any three of the four points are (nearly) collinear.
pub(crate) fn has_collinear_triple(pts: &[[f64; 2]; 4], eps: f64) -> bool {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    TRIPLES
        .iter()
        .any(|t| cross2(pts[t[0]], pts[t[1]], pts[t[2]]).abs() <= eps)
}

#[cfg(test)]
mod tests {
    use super::{clamp_coord, cross2, has_collinear_triple};

    #[test]
    fn clamp_coord_saturates_both_ends() {
        assert_eq!(clamp_coord(-5, 10), 0);
        assert_eq!(clamp_coord(4, 10), 4);
        assert_eq!(clamp_coord(25, 10), 9);
    }

    #[test]
    fn cross2_sign_follows_orientation() {
        let ccw = cross2([0.0, 0.0], [1.0, 0.0], [0.0, 1.0]);
        let cw = cross2([0.0, 0.0], [0.0, 1.0], [1.0, 0.0]);
        assert!((ccw - 1.0).abs() < 1e-12);
        assert!((cw + 1.0).abs() < 1e-12);
    }

    #[test]
    fn collinear_triple_detected() {
        let line = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [5.0, 0.0]];
        let square = [[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]];
        assert!(has_collinear_triple(&line, 1e-9));
        assert!(!has_collinear_triple(&square, 1e-9));
    }
}
