//! Principal-axis orientation of a contour.

use imageproc::point::Point;
use nalgebra::{Matrix2, SymmetricEigen};

const MIN_POINTS: usize = 5;

/// Angle in degrees of the dominant spread direction of `points`, folded
/// into `(-90, 90]`.
///
/// `None` when there are fewer than five points or the covariance has no
/// dominant direction. A genuine 0 degree result is `Some(0.0)`.
pub fn principal_axis_angle(points: &[Point<i32>]) -> Option<f64> {
    if points.len() < MIN_POINTS {
        return None;
    }

    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| {
        (sx + f64::from(p.x), sy + f64::from(p.y))
    });
    let (mx, my) = (sx / n, sy / n);

    let (mut cxx, mut cxy, mut cyy) = (0.0, 0.0, 0.0);
    for p in points {
        let dx = f64::from(p.x) - mx;
        let dy = f64::from(p.y) - my;
        cxx += dx * dx;
        cxy += dx * dy;
        cyy += dy * dy;
    }
    let denom = n - 1.0;
    let cov = Matrix2::new(cxx / denom, cxy / denom, cxy / denom, cyy / denom);

    let eigen = SymmetricEigen::new(cov);
    let major = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] { 0 } else { 1 };
    let lambda = eigen.eigenvalues[major];
    if !lambda.is_finite() || lambda <= 1e-12 {
        return None;
    }

    let v = eigen.eigenvectors.column(major);
    let mut angle = v[1].atan2(v[0]).to_degrees();
    if angle <= -90.0 {
        angle += 180.0;
    } else if angle > 90.0 {
        angle -= 180.0;
    }
    Some(angle)
}

/// Principal-axis angle, or `fallback_angle` (the enclosing rectangle's
/// angle) when it is unavailable.
pub fn orientation(points: &[Point<i32>], fallback_angle: f64) -> f64 {
    principal_axis_angle(points).unwrap_or(fallback_angle)
}
