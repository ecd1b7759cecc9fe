// Top-down view -> original field coordinates.
//
// The top-down canvas is stitched from two calibrated field halves. A point
// right of the midpoint belongs to the right half and was drawn shifted by the
// midpoint, so the shift is undone before the inverse homography is applied.

use crate::error::{CoreError, CoreResult};
use crate::overlay::types::Point;
use nalgebra::{Matrix3, Vector3};
use serde::Serialize;

/// Boundary between the two halves of the 752-wide top-down canvas.
/// Empirical value tied to the current calibration; validate it against new
/// calibration data rather than deriving it from the canvas width.
pub const TOPDOWN_MIDPOINT_X: f64 = 347.0;

/// Perspective divides below this magnitude are treated as degenerate.
const MIN_HOMOGENEOUS_W: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldPoint {
    pub is_right_half: bool,
    pub point: Point,
}

/// Holds the inverses of the two per-half homographies.
#[derive(Debug, Clone)]
pub struct ReverseHomographyMapper {
    right_inv: Matrix3<f64>,
    left_inv: Matrix3<f64>,
}

fn invert(h: &Matrix3<f64>, which: &str) -> CoreResult<Matrix3<f64>> {
    let inv = h.try_inverse().ok_or_else(|| {
        CoreError::SingularTransform(format!("{} homography is not invertible", which))
    })?;
    if inv.iter().any(|v| !v.is_finite()) {
        return Err(CoreError::SingularTransform(format!(
            "{} homography inverse is not finite",
            which
        )));
    }
    Ok(inv)
}

impl ReverseHomographyMapper {
    /// `right` maps the right field half onto the top-down view, `left` the left half.
    pub fn new(right: Matrix3<f64>, left: Matrix3<f64>) -> CoreResult<Self> {
        Ok(Self {
            right_inv: invert(&right, "right")?,
            left_inv: invert(&left, "left")?,
        })
    }

    pub fn from_rows(right: [[f64; 3]; 3], left: [[f64; 3]; 3]) -> CoreResult<Self> {
        Self::new(
            Matrix3::from_row_slice(&right.concat()),
            Matrix3::from_row_slice(&left.concat()),
        )
    }

    pub fn reverse(&self, p: Point) -> CoreResult<FieldPoint> {
        let is_right_half = p.x > TOPDOWN_MIDPOINT_X;
        let (inv, x) = if is_right_half {
            (&self.right_inv, p.x - TOPDOWN_MIDPOINT_X)
        } else {
            (&self.left_inv, p.x)
        };

        let orig = inv * Vector3::new(x, p.y, 1.0);
        let w = orig[2];
        if !w.is_finite() || w.abs() < MIN_HOMOGENEOUS_W {
            return Err(CoreError::SingularTransform(format!(
                "perspective divide by {:e} at ({}, {})",
                w, p.x, p.y
            )));
        }

        Ok(FieldPoint {
            is_right_half,
            point: Point::new(orig[0] / w, orig[1] / w),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_right_half_is_shifted_before_inverse() {
        let mapper = ReverseHomographyMapper::from_rows(IDENTITY, IDENTITY).unwrap();
        let out = mapper.reverse(Point::new(400.0, 200.0)).unwrap();
        assert!(out.is_right_half);
        assert!(approx(out.point.x, 53.0));
        assert!(approx(out.point.y, 200.0));
    }

    #[test]
    fn test_boundary_belongs_to_left_half() {
        let mapper = ReverseHomographyMapper::from_rows(IDENTITY, IDENTITY).unwrap();
        let out = mapper.reverse(Point::new(347.0, 10.0)).unwrap();
        assert!(!out.is_right_half);
        assert!(approx(out.point.x, 347.0));
    }

    #[test]
    fn test_selects_matrix_per_half() {
        // right half maps field -> topdown by doubling, left half by translating
        let right = [[2.0, 0.0, 0.0], [0.0, 2.0, 0.0], [0.0, 0.0, 1.0]];
        let left = [[1.0, 0.0, 5.0], [0.0, 1.0, -5.0], [0.0, 0.0, 1.0]];
        let mapper = ReverseHomographyMapper::from_rows(right, left).unwrap();

        let r = mapper.reverse(Point::new(447.0, 80.0)).unwrap();
        assert!(approx(r.point.x, 50.0));
        assert!(approx(r.point.y, 40.0));

        let l = mapper.reverse(Point::new(105.0, 95.0)).unwrap();
        assert!(!l.is_right_half);
        assert!(approx(l.point.x, 100.0));
        assert!(approx(l.point.y, 100.0));
    }

    #[test]
    fn test_perspective_normalization() {
        // H scales w by 2; the inverse halves it back and the divide undoes it
        let h = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 2.0]];
        let mapper = ReverseHomographyMapper::from_rows(h, h).unwrap();
        let out = mapper.reverse(Point::new(10.0, 20.0)).unwrap();
        assert!(approx(out.point.x, 20.0));
        assert!(approx(out.point.y, 40.0));
    }

    #[test]
    fn test_singular_matrix_rejected() {
        let singular = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]];
        assert!(matches!(
            ReverseHomographyMapper::from_rows(singular, IDENTITY),
            Err(CoreError::SingularTransform(_))
        ));
    }

    #[test]
    fn test_degenerate_divide_fails_instead_of_inf() {
        let h = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 1.0]];
        let mapper = ReverseHomographyMapper::from_rows(IDENTITY, h).unwrap();
        // inv(h) bottom row is [-1, -1, 1], so w = 0 at (1, 0)
        let err = mapper.reverse(Point::new(1.0, 0.0)).unwrap_err();
        assert!(matches!(err, CoreError::SingularTransform(_)));
    }
}
