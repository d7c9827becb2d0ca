//! Per-frame mask producers: motion, color and their fusion with edges.

mod color;
mod fusion;
mod motion;

pub use color::{HsvRange, rgb_to_hsv};
pub use fusion::{EdgeColorFusion, FusedMasks};
pub use motion::MotionSegmenter;

use image::GrayImage;

/// Pixel-wise AND of two binary masks of equal size.
pub(crate) fn and_masks(a: &GrayImage, b: &GrayImage) -> GrayImage {
    combine(a, b, |x, y| x > 0 && y > 0)
}

/// Pixel-wise OR of two binary masks of equal size.
pub(crate) fn or_masks(a: &GrayImage, b: &GrayImage) -> GrayImage {
    combine(a, b, |x, y| x > 0 || y > 0)
}

fn combine(a: &GrayImage, b: &GrayImage, op: impl Fn(u8, u8) -> bool) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let mut out = GrayImage::new(a.width(), a.height());
    for ((o, &x), &y) in out.iter_mut().zip(a.iter()).zip(b.iter()) {
        *o = if op(x, y) { 255 } else { 0 };
    }
    out
}
