//! Contour based candidate extraction.

use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::contour_area;
use imageproc::point::Point;

use crate::geometry::rect::RotatedRect;

/// One elongated blob found in the fused mask.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub rect: RotatedRect,
    /// Boundary pixels of the blob, in traversal order.
    pub contour: Vec<Point<i32>>,
    pub area: f64,
    pub aspect_ratio: f64,
}

impl Candidate {
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        self.rect.center
    }

    /// Euclidean distance from the rectangle center to `(x, y)`.
    #[inline]
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        let (cx, cy) = self.rect.center;
        (cx - x).hypot(cy - y)
    }
}

/// Filters external contours down to large, elongated shapes.
#[derive(Debug, Clone)]
pub struct CandidateExtractor {
    min_area: f64,
    aspect_threshold: f64,
}

impl CandidateExtractor {
    /// Blobs must cover `min_area` pixels and reach `aspect_threshold`.
    pub fn new(min_area: f64, aspect_threshold: f64) -> Self {
        Self {
            min_area,
            aspect_threshold,
        }
    }

    /// Candidates in `mask`, largest area first. Equal areas keep the
    /// order in which their contours were found.
    pub fn extract(&self, mask: &GrayImage) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = find_contours::<i32>(mask)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| self.evaluate(c.points))
            .collect();

        // stable: ties stay in discovery order
        candidates.sort_by(|a, b| b.area.total_cmp(&a.area));
        candidates
    }

    fn evaluate(&self, contour: Vec<Point<i32>>) -> Option<Candidate> {
        let area = contour_area(&contour);
        if area < self.min_area {
            return None;
        }

        // a sub-pixel side would floor to an empty box
        let rect = RotatedRect::enclosing(&contour)?;
        if rect.is_degenerate() {
            return None;
        }

        let aspect_ratio = rect.aspect_ratio();
        if aspect_ratio < self.aspect_threshold {
            return None;
        }

        Some(Candidate {
            rect,
            contour,
            area,
            aspect_ratio,
        })
    }
}
