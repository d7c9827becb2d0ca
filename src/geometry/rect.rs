use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use serde::Serialize;

/// Axis-aligned box in integer pixel coordinates (TLWH).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BoundingBox {
    /// Top-left x coordinate
    pub x: i32,
    /// Top-left y coordinate
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    #[inline]
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Square box of side `size` centered on `(cx, cy)`.
    ///
    /// The origin is floored, the same rule [`RotatedRect::bounding_box`] uses.
    #[inline]
    pub fn centered(cx: f64, cy: f64, size: u32) -> Self {
        let half = f64::from(size) / 2.0;
        Self::new(
            (cx - half).floor() as i32,
            (cy - half).floor() as i32,
            size,
            size,
        )
    }

    /// Geometric center, half a side in from the origin.
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (
            f64::from(self.x) + f64::from(self.width) / 2.0,
            f64::from(self.y) + f64::from(self.height) / 2.0,
        )
    }

}

/// Rotated rectangle: center, side lengths and rotation in degrees.
///
/// `angle` lies in `[0, 90)` and gives the direction of the `width` side,
/// measured from the +x axis towards +y (image coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RotatedRect {
    pub center: (f64, f64),
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl RotatedRect {
    #[inline]
    pub fn new(center: (f64, f64), width: f64, height: f64, angle: f64) -> Self {
        Self {
            center,
            width,
            height,
            angle,
        }
    }

    /// Minimum-area rectangle enclosing `points` (rotating calipers over
    /// the convex hull). Returns `None` for an empty point set.
    pub fn enclosing(points: &[Point<i32>]) -> Option<Self> {
        let hull = convex_hull(points);
        match hull.len() {
            0 => None,
            1 => Some(Self::new(
                (f64::from(hull[0].x), f64::from(hull[0].y)),
                0.0,
                0.0,
                0.0,
            )),
            n => {
                let pts: Vec<(f64, f64)> = hull
                    .iter()
                    .map(|p| (f64::from(p.x), f64::from(p.y)))
                    .collect();
                let mut best: Option<(f64, Self)> = None;

                for i in 0..n {
                    let (ax, ay) = pts[i];
                    let (bx, by) = pts[(i + 1) % n];
                    let len = ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt();
                    if len == 0.0 {
                        continue;
                    }
                    let u = ((bx - ax) / len, (by - ay) / len);
                    let v = (-u.1, u.0);

                    let (mut min_u, mut max_u) = (f64::INFINITY, f64::NEG_INFINITY);
                    let (mut min_v, mut max_v) = (f64::INFINITY, f64::NEG_INFINITY);
                    for &(px, py) in &pts {
                        let pu = px * u.0 + py * u.1;
                        let pv = px * v.0 + py * v.1;
                        min_u = min_u.min(pu);
                        max_u = max_u.max(pu);
                        min_v = min_v.min(pv);
                        max_v = max_v.max(pv);
                    }

                    let width = max_u - min_u;
                    let height = max_v - min_v;
                    let area = width * height;
                    if best.as_ref().is_some_and(|(a, _)| *a <= area) {
                        continue;
                    }

                    let mid_u = (min_u + max_u) / 2.0;
                    let mid_v = (min_v + max_v) / 2.0;
                    let center = (mid_u * u.0 + mid_v * v.0, mid_u * u.1 + mid_v * v.1);
                    let angle = u.1.atan2(u.0).to_degrees();
                    best = Some((area, Self::new(center, width, height, angle).normalized()));
                }

                best.map(|(_, rect)| rect)
            }
        }
    }

    /// Fold the angle into `[0, 90)`, swapping sides when needed.
    fn normalized(mut self) -> Self {
        let mut angle = self.angle.rem_euclid(180.0);
        if angle >= 90.0 {
            angle -= 90.0;
            std::mem::swap(&mut self.width, &mut self.height);
        }
        // rem_euclid can round up to exactly 180
        if angle >= 90.0 {
            angle = 0.0;
        }
        self.angle = angle;
        self
    }

    /// Longer of the two sides.
    #[inline]
    pub fn long_side(&self) -> f64 {
        self.width.max(self.height)
    }

    /// Shorter of the two sides.
    #[inline]
    pub fn short_side(&self) -> f64 {
        self.width.min(self.height)
    }

    /// Long side over short side, with a small epsilon so thin slivers
    /// do not divide by zero.
    #[inline]
    pub fn aspect_ratio(&self) -> f64 {
        self.long_side() / (self.short_side() + 1e-6)
    }

    /// True when either side is under one pixel, so the floored box
    /// would be empty.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.width < 1.0 || self.height < 1.0
    }

    /// Same size and angle, moved to a new center.
    #[inline]
    pub fn recentered(&self, center: (f64, f64)) -> Self {
        Self { center, ..*self }
    }

    /// Axis-aligned box built from the center and the rotated side lengths.
    ///
    /// Origin and sides are floored (truncation toward the top-left, never
    /// nearest-integer rounding) so every stage produces identical pixels.
    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        let (cx, cy) = self.center;
        BoundingBox::new(
            (cx - self.width / 2.0).floor() as i32,
            (cy - self.height / 2.0).floor() as i32,
            self.width.max(0.0).floor() as u32,
            self.height.max(0.0).floor() as u32,
        )
    }
}
