//! Local sparse optical flow around the tracked object.
//!
//! Corners are seeded inside an expanded box around the object, followed
//! frame to frame with pyramidal Lucas-Kanade, and reduced to a single
//! displacement: the median inlier motion of a RANSAC affine fit when there
//! are enough correspondences, the plain median otherwise.

use image::GrayImage;
use image::imageops::{self, FilterType};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use nalgebra::{Matrix3, Vector3};
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use tracing::{debug, trace};

use crate::config::TrackerConfig;
use crate::geometry::RotatedRect;

/// Minimum normalized eigenvalue of the LK gradient matrix.
const MIN_EIGEN: f32 = 1e-2;
const RANSAC_SEED: u64 = 0x0b47_f10e;

/// Feature budget and solver settings for [`OpticalFlowTracker`].
#[derive(Debug, Clone)]
pub struct FlowParams {
    pub max_corners: usize,
    pub quality: f32,
    pub min_distance: f32,
    pub min_points: usize,
    pub refresh_interval: u32,
    pub expand: f32,
    pub window: usize,
    pub pyramid_levels: usize,
    pub max_iterations: usize,
    pub epsilon: f32,
    pub affine_min_points: usize,
    pub ransac_threshold: f32,
    pub ransac_iterations: usize,
    pub max_residual: f32,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self::from(&TrackerConfig::default())
    }
}

impl From<&TrackerConfig> for FlowParams {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            max_corners: config.flow_max_corners,
            quality: config.flow_quality,
            min_distance: config.flow_min_distance,
            min_points: config.flow_min_points,
            refresh_interval: config.flow_refresh_interval,
            expand: config.flow_expand,
            window: config.flow_window,
            pyramid_levels: config.flow_pyramid_levels,
            max_iterations: config.flow_max_iterations,
            epsilon: config.flow_epsilon,
            affine_min_points: config.flow_affine_min_points,
            ransac_threshold: config.flow_ransac_threshold,
            ransac_iterations: config.flow_ransac_iterations,
            max_residual: config.flow_max_residual,
        }
    }
}

/// Tracked points plus the frame they live in.
#[derive(Debug, Clone)]
struct FlowPatch {
    points: Vec<(f32, f32)>,
    reference: Pyramid,
    seeded_count: usize,
    frames_since_seed: u32,
}

/// Sparse LK tracker holding at most one patch of points.
#[derive(Debug, Clone)]
pub struct OpticalFlowTracker {
    params: FlowParams,
    patch: Option<FlowPatch>,
}

impl OpticalFlowTracker {
    /// Tracker with no active patch.
    pub fn new(params: FlowParams) -> Self {
        Self {
            params,
            patch: None,
        }
    }

    /// Whether a patch is being followed.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.patch.is_some()
    }

    /// Points currently tracked, 0 without a patch.
    pub fn point_count(&self) -> usize {
        self.patch.as_ref().map_or(0, |p| p.points.len())
    }

    /// Drop the patch.
    pub fn reset(&mut self) {
        self.patch = None;
    }

    /// Seed features inside the expanded `rect`. On failure (empty ROI or
    /// too few corners) the tracker is left without a patch.
    pub fn init(&mut self, gray: &GrayImage, rect: &RotatedRect) -> bool {
        let pyramid = self.build_pyramid(gray);
        self.init_with(gray, pyramid, rect)
    }

    /// Track the patch into `gray` and return the object's displacement.
    ///
    /// `rect` is the object's current box when one is known; it is used to
    /// re-seed when tracking degrades.
    pub fn step(&mut self, gray: &GrayImage, rect: Option<&RotatedRect>) -> Option<(f64, f64)> {
        let patch = self.patch.take()?;
        let current = self.build_pyramid(gray);

        let (prev, next): (Vec<_>, Vec<_>) = patch
            .points
            .iter()
            .filter_map(|&p| self.track_point(&patch.reference, &current, p).map(|n| (p, n)))
            .unzip();
        trace!(tracked = next.len(), seeded = patch.points.len(), "flow step");

        if next.len() < self.params.min_points {
            if let Some(rect) = rect {
                if self.init_with(gray, current, rect) {
                    return Some((0.0, 0.0));
                }
            }
            debug!(survivors = next.len(), "optical flow lost");
            return None;
        }

        let displacement = self.estimate_displacement(&prev, &next);
        let frames_since_seed = patch.frames_since_seed + 1;
        let degraded = next.len() * 2 < patch.seeded_count;

        if frames_since_seed >= self.params.refresh_interval || degraded {
            if let Some(rect) = rect {
                if let Some(points) = self.seed_features(gray, rect) {
                    debug!(points = points.len(), degraded, "re-seeded flow patch");
                    self.patch = Some(FlowPatch {
                        seeded_count: points.len(),
                        points,
                        reference: current,
                        frames_since_seed: 0,
                    });
                    return Some(displacement);
                }
            }
        }

        self.patch = Some(FlowPatch {
            points: next,
            reference: current,
            seeded_count: patch.seeded_count,
            frames_since_seed,
        });
        Some(displacement)
    }

    fn init_with(&mut self, gray: &GrayImage, pyramid: Pyramid, rect: &RotatedRect) -> bool {
        match self.seed_features(gray, rect) {
            Some(points) => {
                debug!(points = points.len(), "seeded flow patch");
                self.patch = Some(FlowPatch {
                    seeded_count: points.len(),
                    points,
                    reference: pyramid,
                    frames_since_seed: 0,
                });
                true
            }
            None => {
                self.patch = None;
                false
            }
        }
    }

    fn seed_features(&self, gray: &GrayImage, rect: &RotatedRect) -> Option<Vec<(f32, f32)>> {
        let (x0, y0, x1, y1) = roi(rect, self.params.expand, gray.width(), gray.height())?;
        let points = good_features(gray, (x0, y0, x1, y1), &self.params);
        (points.len() >= self.params.min_points).then_some(points)
    }

    fn build_pyramid(&self, gray: &GrayImage) -> Pyramid {
        Pyramid::build(gray, self.params.pyramid_levels, self.params.window as u32)
    }

    /// Pyramidal Lucas-Kanade for one point, coarse to fine.
    fn track_point(&self, prev: &Pyramid, curr: &Pyramid, pt: (f32, f32)) -> Option<(f32, f32)> {
        let half = (self.params.window / 2) as i32;
        let area = (self.params.window * self.params.window) as f32;
        let eps2 = self.params.epsilon * self.params.epsilon;
        let top = prev.levels.len().min(curr.levels.len()) - 1;

        let mut template = Vec::with_capacity(self.params.window * self.params.window);
        let mut guess = (0.0f32, 0.0f32);

        for level in (0..=top).rev() {
            let scale = (1u32 << level) as f32;
            let (px, py) = (pt.0 / scale, pt.1 / scale);
            let pl = &prev.levels[level];
            let cl = &curr.levels[level];

            template.clear();
            let (mut g11, mut g12, mut g22) = (0.0f32, 0.0f32, 0.0f32);
            for wy in -half..=half {
                for wx in -half..=half {
                    let (x, y) = (px + wx as f32, py + wy as f32);
                    let ix = sample(&pl.grad_x, x, y);
                    let iy = sample(&pl.grad_y, x, y);
                    template.push((wx as f32, wy as f32, sample(&pl.image, x, y), ix, iy));
                    g11 += ix * ix;
                    g12 += ix * iy;
                    g22 += iy * iy;
                }
            }

            let det = g11 * g22 - g12 * g12;
            let min_eig = (g11 + g22 - ((g11 - g22).powi(2) + 4.0 * g12 * g12).sqrt()) / (2.0 * area);
            let mut d = guess;

            if min_eig < MIN_EIGEN || det.abs() < f32::EPSILON {
                if level == 0 {
                    return None;
                }
            } else {
                for _ in 0..self.params.max_iterations {
                    let (cx, cy) = (px + d.0, py + d.1);
                    if !cl.contains(cx, cy) {
                        return None;
                    }
                    let (mut bx, mut by) = (0.0f32, 0.0f32);
                    for &(wx, wy, value, ix, iy) in &template {
                        let diff = value - sample(&cl.image, cx + wx, cy + wy);
                        bx += diff * ix;
                        by += diff * iy;
                    }
                    let ddx = (g22 * bx - g12 * by) / det;
                    let ddy = (g11 * by - g12 * bx) / det;
                    d.0 += ddx;
                    d.1 += ddy;
                    if ddx * ddx + ddy * ddy < eps2 {
                        break;
                    }
                }
            }

            if level == 0 {
                // reject matches that landed on something that does not look like the patch
                let residual = template
                    .iter()
                    .map(|&(wx, wy, value, _, _)| (value - sample(&cl.image, px + d.0 + wx, py + d.1 + wy)).abs())
                    .sum::<f32>()
                    / area;
                if residual > self.params.max_residual {
                    return None;
                }
            }

            guess = if level > 0 { (d.0 * 2.0, d.1 * 2.0) } else { d };
        }

        let next = (pt.0 + guess.0, pt.1 + guess.1);
        curr.levels[0].contains(next.0, next.1).then_some(next)
    }

    fn estimate_displacement(&self, prev: &[(f32, f32)], next: &[(f32, f32)]) -> (f64, f64) {
        let inliers = if prev.len() >= self.params.affine_min_points {
            ransac_affine_inliers(
                prev,
                next,
                self.params.ransac_threshold,
                self.params.ransac_iterations,
            )
        } else {
            None
        };

        let pairs: Vec<usize> = inliers.unwrap_or_else(|| (0..prev.len()).collect());
        let dx: Vec<f64> = pairs.iter().map(|&i| f64::from(next[i].0 - prev[i].0)).collect();
        let dy: Vec<f64> = pairs.iter().map(|&i| f64::from(next[i].1 - prev[i].1)).collect();
        (median(dx), median(dy))
    }
}

/// Integer ROI `(x0, y0, x1, y1)` of the square of side
/// `max(w, h) * expand` around the rect, clipped to the frame.
fn roi(rect: &RotatedRect, expand: f32, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let (cx, cy) = rect.center;
    let size = (rect.long_side() * f64::from(expand)).floor();
    let half = size / 2.0;
    let x0 = (cx - half).max(0.0) as u32;
    let y0 = (cy - half).max(0.0) as u32;
    let x1 = (cx + half).min(f64::from(width)).max(0.0) as u32;
    let y1 = (cy + half).min(f64::from(height)).max(0.0) as u32;
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

/// Shi-Tomasi corners inside the ROI, strongest first, in frame coordinates.
fn good_features(gray: &GrayImage, roi: (u32, u32, u32, u32), params: &FlowParams) -> Vec<(f32, f32)> {
    let (x0, y0, x1, y1) = roi;
    let patch = imageops::crop_imm(gray, x0, y0, x1 - x0, y1 - y0).to_image();
    let (w, h) = (patch.width() as usize, patch.height() as usize);
    if w < 3 || h < 3 {
        return Vec::new();
    }

    let gx = horizontal_sobel(&patch);
    let gy = vertical_sobel(&patch);
    let mut xx = Array2::<f32>::zeros((h, w));
    let mut xy = Array2::<f32>::zeros((h, w));
    let mut yy = Array2::<f32>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let dx = f32::from(gx.get_pixel(x as u32, y as u32)[0]);
            let dy = f32::from(gy.get_pixel(x as u32, y as u32)[0]);
            xx[[y, x]] = dx * dx;
            xy[[y, x]] = dx * dy;
            yy[[y, x]] = dy * dy;
        }
    }

    // minimum eigenvalue of the 3x3 block structure tensor
    let mut response = Array2::<f32>::zeros((h, w));
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
            for yy_ in y - 1..=y + 1 {
                for xx_ in x - 1..=x + 1 {
                    a += xx[[yy_, xx_]];
                    b += xy[[yy_, xx_]];
                    c += yy[[yy_, xx_]];
                }
            }
            response[[y, x]] = (a + c) / 2.0 - (((a - c) / 2.0).powi(2) + b * b).sqrt();
        }
    }

    let max_response = response.iter().copied().fold(0.0f32, f32::max);
    if max_response <= 0.0 {
        return Vec::new();
    }
    let threshold = max_response * params.quality;

    let mut corners: Vec<(f32, usize, usize)> = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let r = response[[y, x]];
            if r < threshold {
                continue;
            }
            let is_peak = (y - 1..=y + 1)
                .all(|ny| (x - 1..=x + 1).all(|nx| response[[ny, nx]] <= r));
            if is_peak {
                corners.push((r, x, y));
            }
        }
    }
    corners.sort_by(|a, b| b.0.total_cmp(&a.0));

    let min_d2 = params.min_distance * params.min_distance;
    let mut selected: Vec<(f32, f32)> = Vec::new();
    for (_, x, y) in corners {
        if selected.len() >= params.max_corners {
            break;
        }
        let p = ((x as u32 + x0) as f32, (y as u32 + y0) as f32);
        let far_enough = selected
            .iter()
            .all(|q| (q.0 - p.0).powi(2) + (q.1 - p.1).powi(2) >= min_d2);
        if far_enough {
            selected.push(p);
        }
    }
    selected
}

/// Indices of the inliers of the best affine model, or `None` when no
/// non-degenerate model explains at least three correspondences.
fn ransac_affine_inliers(
    src: &[(f32, f32)],
    dst: &[(f32, f32)],
    threshold: f32,
    iterations: usize,
) -> Option<Vec<usize>> {
    let n = src.len();
    if n < 3 {
        return None;
    }
    let mut rng = StdRng::seed_from_u64(RANSAC_SEED);
    let thresh2 = f64::from(threshold * threshold);
    let mut best: Vec<usize> = Vec::new();

    for _ in 0..iterations {
        let sample = index::sample(&mut rng, n, 3);
        let Some(model) = solve_affine(src, dst, [sample.index(0), sample.index(1), sample.index(2)])
        else {
            continue;
        };

        let inliers: Vec<usize> = (0..n)
            .filter(|&i| {
                let (x, y) = (f64::from(src[i].0), f64::from(src[i].1));
                let px = model[0] * x + model[1] * y + model[2];
                let py = model[3] * x + model[4] * y + model[5];
                (px - f64::from(dst[i].0)).powi(2) + (py - f64::from(dst[i].1)).powi(2) < thresh2
            })
            .collect();

        if inliers.len() > best.len() {
            best = inliers;
            if best.len() == n {
                break;
            }
        }
    }

    (best.len() >= 3).then_some(best)
}

/// Exact affine map through three correspondences: `[a, b, c, d, e, f]` with
/// `x' = a x + b y + c`, `y' = d x + e y + f`.
fn solve_affine(src: &[(f32, f32)], dst: &[(f32, f32)], idx: [usize; 3]) -> Option<[f64; 6]> {
    let row = |i: usize| [f64::from(src[i].0), f64::from(src[i].1), 1.0];
    let (r0, r1, r2) = (row(idx[0]), row(idx[1]), row(idx[2]));
    let m = Matrix3::new(
        r0[0], r0[1], r0[2], r1[0], r1[1], r1[2], r2[0], r2[1], r2[2],
    );
    if m.determinant().abs() < 1e-6 {
        return None;
    }
    let inv = m.try_inverse()?;
    let bx = Vector3::new(
        f64::from(dst[idx[0]].0),
        f64::from(dst[idx[1]].0),
        f64::from(dst[idx[2]].0),
    );
    let by = Vector3::new(
        f64::from(dst[idx[0]].1),
        f64::from(dst[idx[1]].1),
        f64::from(dst[idx[2]].1),
    );
    let px = inv * bx;
    let py = inv * by;
    Some([px[0], px[1], px[2], py[0], py[1], py[2]])
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[derive(Debug, Clone)]
struct Level {
    image: Array2<f32>,
    grad_x: Array2<f32>,
    grad_y: Array2<f32>,
}

impl Level {
    fn from_gray(gray: &GrayImage) -> Self {
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        let image = Array2::from_shape_fn((h, w), |(y, x)| {
            f32::from(gray.get_pixel(x as u32, y as u32)[0])
        });
        let grad_x = Array2::from_shape_fn((h, w), |(y, x)| {
            (image[[y, (x + 1).min(w - 1)]] - image[[y, x.saturating_sub(1)]]) / 2.0
        });
        let grad_y = Array2::from_shape_fn((h, w), |(y, x)| {
            (image[[(y + 1).min(h - 1), x]] - image[[y.saturating_sub(1), x]]) / 2.0
        });
        Self {
            image,
            grad_x,
            grad_y,
        }
    }

    #[inline]
    fn contains(&self, x: f32, y: f32) -> bool {
        let (h, w) = self.image.dim();
        x >= 0.0 && y >= 0.0 && x <= (w - 1) as f32 && y <= (h - 1) as f32
    }
}

#[derive(Debug, Clone)]
struct Pyramid {
    levels: Vec<Level>,
}

impl Pyramid {
    fn build(gray: &GrayImage, extra_levels: usize, min_side: u32) -> Self {
        let mut levels = vec![Level::from_gray(gray)];
        let mut current = gray.clone();
        for _ in 0..extra_levels {
            let (w, h) = (current.width().div_ceil(2), current.height().div_ceil(2));
            if w < min_side || h < min_side {
                break;
            }
            current = imageops::resize(&current, w, h, FilterType::Triangle);
            levels.push(Level::from_gray(&current));
        }
        Self { levels }
    }
}

/// Bilinear lookup with coordinates clamped to the image.
#[inline]
fn sample(img: &Array2<f32>, x: f32, y: f32) -> f32 {
    let (h, w) = img.dim();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let (x0, y0) = (x.floor() as usize, y.floor() as usize);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);
    let top = img[[y0, x0]] * (1.0 - fx) + img[[y0, x1]] * fx;
    let bottom = img[[y1, x0]] * (1.0 - fx) + img[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn texture(x: f32, y: f32) -> u8 {
        let v = 127.0 + 60.0 * (0.31 * x).sin() * (0.27 * y).cos() + 40.0 * (0.13 * (x + y)).sin();
        v.clamp(0.0, 255.0) as u8
    }

    fn textured(width: u32, height: u32, dx: f32, dy: f32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            Luma([texture(x as f32 - dx, y as f32 - dy)])
        })
    }

    fn square(cx: f64, cy: f64, side: f64) -> RotatedRect {
        RotatedRect::new((cx, cy), side, side, 0.0)
    }

    #[test]
    fn test_median() {
        assert_eq!(median(vec![1.0, 3.0, 2.0]), 2.0);
        assert_eq!(median(vec![1.0, 3.0, 2.0, 10.0]), 2.5);
        assert_eq!(median(Vec::new()), 0.0);
    }

    #[test]
    fn test_roi_clipping() {
        assert_eq!(roi(&square(50.0, 50.0, 20.0), 1.0, 100, 100), Some((40, 40, 60, 60)));
        assert_eq!(roi(&square(2.0, 2.0, 20.0), 1.0, 100, 100), Some((0, 0, 12, 12)));
        assert_eq!(roi(&square(500.0, 500.0, 20.0), 1.0, 100, 100), None);
    }

    #[test]
    fn test_features_on_texture_respect_budget() {
        let params = FlowParams {
            max_corners: 12,
            ..FlowParams::default()
        };
        let gray = textured(160, 120, 0.0, 0.0);
        let pts = good_features(&gray, (40, 20, 120, 100), &params);
        assert!(!pts.is_empty() && pts.len() <= 12);
        for (i, a) in pts.iter().enumerate() {
            assert!(a.0 >= 40.0 && a.0 < 120.0 && a.1 >= 20.0 && a.1 < 100.0);
            for b in &pts[i + 1..] {
                assert!((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2) >= 49.0);
            }
        }
    }

    #[test]
    fn test_init_fails_on_flat_or_empty_roi() {
        let mut flow = OpticalFlowTracker::new(FlowParams::default());
        let flat = GrayImage::from_pixel(100, 100, Luma([90]));
        assert!(!flow.init(&flat, &square(50.0, 50.0, 30.0)));
        assert!(!flow.is_active());

        let gray = textured(100, 100, 0.0, 0.0);
        assert!(!flow.init(&gray, &square(-80.0, -80.0, 30.0)));
        assert!(!flow.is_active());
    }

    #[test]
    fn test_step_without_patch() {
        let mut flow = OpticalFlowTracker::new(FlowParams::default());
        let gray = textured(100, 100, 0.0, 0.0);
        assert!(flow.step(&gray, None).is_none());
        assert!(flow.step(&gray, Some(&square(50.0, 50.0, 30.0))).is_none());
    }

    #[test]
    fn test_recovers_translation() {
        let mut flow = OpticalFlowTracker::new(FlowParams::default());
        let rect = square(80.0, 60.0, 40.0);
        assert!(flow.init(&textured(160, 120, 0.0, 0.0), &rect));
        assert!(flow.point_count() >= 3);

        let (dx, dy) = flow.step(&textured(160, 120, 3.0, 2.0), Some(&rect)).unwrap();
        assert!((dx - 3.0).abs() < 0.5, "dx = {dx}");
        assert!((dy - 2.0).abs() < 0.5, "dy = {dy}");
        assert!(flow.is_active());
    }

    #[test]
    fn test_loses_patch_on_flat_frame() {
        let mut flow = OpticalFlowTracker::new(FlowParams::default());
        let rect = square(80.0, 60.0, 40.0);
        assert!(flow.init(&textured(160, 120, 0.0, 0.0), &rect));

        let flat = GrayImage::from_pixel(160, 120, Luma([90]));
        assert!(flow.step(&flat, Some(&rect)).is_none());
        assert!(!flow.is_active());
    }

    #[test]
    fn test_ransac_rejects_outliers() {
        let src: Vec<(f32, f32)> = (0..20).map(|i| ((i * 7 % 50) as f32, (i * 13 % 40) as f32)).collect();
        let mut dst: Vec<(f32, f32)> = src.iter().map(|p| (p.0 + 2.0, p.1 + 1.0)).collect();
        for d in dst.iter_mut().take(8) {
            d.0 += 40.0;
            d.1 -= 25.0;
        }

        let inliers = ransac_affine_inliers(&src, &dst, 3.0, 64).unwrap();
        assert_eq!(inliers, (8..20).collect::<Vec<_>>());

        let flow = OpticalFlowTracker::new(FlowParams::default());
        let (dx, dy) = flow.estimate_displacement(&src, &dst);
        assert!((dx - 2.0).abs() < 1e-6 && (dy - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_few_points_use_plain_median() {
        let flow = OpticalFlowTracker::new(FlowParams::default());
        let src = vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (5.0, 5.0)];
        let dst = vec![(1.0, 1.0), (11.0, 1.0), (1.0, 11.0), (30.0, 30.0)];
        let (dx, dy) = flow.estimate_displacement(&src, &dst);
        assert_eq!((dx, dy), (1.0, 1.0));
    }

    #[test]
    fn test_reset_clears_patch() {
        let mut flow = OpticalFlowTracker::new(FlowParams::default());
        assert!(flow.init(&textured(160, 120, 0.0, 0.0), &square(80.0, 60.0, 40.0)));
        flow.reset();
        assert!(!flow.is_active());
        assert_eq!(flow.point_count(), 0);
    }

    fn frames_since_seed(flow: &OpticalFlowTracker) -> u32 {
        flow.patch.as_ref().unwrap().frames_since_seed
    }

    #[test]
    fn test_periodic_reseed_moves_patch_to_rect() {
        let params = FlowParams {
            refresh_interval: 3,
            ..FlowParams::default()
        };
        let mut flow = OpticalFlowTracker::new(params);
        let gray = textured(160, 120, 0.0, 0.0);
        let start = square(40.0, 60.0, 40.0);
        let moved = square(120.0, 60.0, 40.0);
        assert!(flow.init(&gray, &start));

        for expected in 1..3 {
            assert_eq!(flow.step(&gray, Some(&moved)), Some((0.0, 0.0)));
            assert_eq!(frames_since_seed(&flow), expected);
        }

        // third frame hits the interval: points are re-seeded on `moved`
        assert_eq!(flow.step(&gray, Some(&moved)), Some((0.0, 0.0)));
        assert_eq!(frames_since_seed(&flow), 0);
        let (x0, y0, x1, y1) = roi(&moved, flow.params.expand, 160, 120).unwrap();
        let patch = flow.patch.as_ref().unwrap();
        assert_eq!(patch.seeded_count, patch.points.len());
        assert!(patch.points.iter().all(|&(x, y)| {
            x >= x0 as f32 && x < x1 as f32 && y >= y0 as f32 && y < y1 as f32
        }));
    }

    #[test]
    fn test_interval_without_rect_keeps_points() {
        let params = FlowParams {
            refresh_interval: 1,
            ..FlowParams::default()
        };
        let mut flow = OpticalFlowTracker::new(params);
        let gray = textured(160, 120, 0.0, 0.0);
        assert!(flow.init(&gray, &square(80.0, 60.0, 40.0)));

        assert!(flow.step(&gray, None).is_some());
        assert!(flow.step(&gray, None).is_some());
        assert_eq!(frames_since_seed(&flow), 2);
    }

    #[test]
    fn test_degraded_patch_is_reseeded() {
        let mut flow = OpticalFlowTracker::new(FlowParams::default());
        let gray = textured(160, 120, 0.0, 0.0);
        let rect = square(80.0, 60.0, 40.0);
        assert!(flow.init(&gray, &rect));
        let seeded = flow.point_count();
        let min_points = flow.params.min_points;
        assert!(seeded > 2 * min_points, "seeded = {seeded}");

        // keep only `min_points` survivors: fewer than half of the seed
        flow.patch.as_mut().unwrap().points.truncate(min_points);
        assert_eq!(flow.step(&gray, None), Some((0.0, 0.0)));
        assert_eq!(flow.point_count(), min_points);
        assert_eq!(frames_since_seed(&flow), 1);

        assert_eq!(flow.step(&gray, Some(&rect)), Some((0.0, 0.0)));
        assert_eq!(flow.point_count(), seeded);
        assert_eq!(frames_since_seed(&flow), 0);
    }

    #[test]
    fn test_too_few_survivors_reinit_on_rect() {
        let mut flow = OpticalFlowTracker::new(FlowParams::default());
        let rect = square(80.0, 60.0, 40.0);
        assert!(flow.init(&textured(160, 120, 0.0, 0.0), &rect));
        let min_points = flow.params.min_points;

        // the frame moved, but with too few points the motion is not trusted
        let shifted = textured(160, 120, 3.0, 2.0);
        flow.patch.as_mut().unwrap().points.truncate(min_points - 1);
        assert_eq!(flow.step(&shifted, Some(&rect)), Some((0.0, 0.0)));
        assert!(flow.point_count() >= min_points);
        assert_eq!(frames_since_seed(&flow), 0);

        flow.patch.as_mut().unwrap().points.truncate(min_points - 1);
        assert!(flow.step(&shifted, None).is_none());
        assert!(!flow.is_active());
    }
}
