//! Edge and color cues gated by motion, merged into one blob mask.

use image::{GrayImage, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{close, dilate, erode};

use crate::config::{ColorFusion, TrackerConfig};
use crate::segmentation::color::HsvRange;
use crate::segmentation::{and_masks, or_masks};

/// Output of [`EdgeColorFusion::fuse`].
#[derive(Debug, Clone)]
pub struct FusedMasks {
    /// Mask the candidates are extracted from.
    pub fused: GrayImage,
    /// Raw Canny edges, kept for diagnostics only.
    pub edges: GrayImage,
}

/// Builds the blob mask from a frame and its motion foreground.
#[derive(Debug, Clone)]
pub struct EdgeColorFusion {
    blur_sigma: f32,
    canny_low: f32,
    canny_high: f32,
    color: HsvRange,
    policy: ColorFusion,
    close_radius: u8,
    refine_radius: Option<u8>,
}

impl EdgeColorFusion {
    /// Takes the blur, Canny, color range, fusion policy and morphology
    /// settings from `config`.
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            blur_sigma: config.blur_sigma,
            canny_low: config.canny_low,
            canny_high: config.canny_high,
            color: HsvRange::new(
                [config.hue_low, config.sat_low, config.val_low],
                [config.hue_high, config.sat_high, config.val_high],
            ),
            policy: config.color_fusion,
            close_radius: config.close_radius,
            refine_radius: config.thin_shape_refine.filter(|&r| r > 0),
        }
    }

    /// `foreground` gates the edges and, under [`ColorFusion::Gated`], the
    /// color mask. The union is closed and optionally refined.
    pub fn fuse(&self, frame: &RgbImage, gray: &GrayImage, foreground: &GrayImage) -> FusedMasks {
        let blurred = gaussian_blur_f32(gray, self.blur_sigma);
        let edges = canny(&blurred, self.canny_low, self.canny_high);
        let moving_edges = and_masks(&edges, foreground);

        let color = self.color.mask(frame);
        let color = match self.policy {
            ColorFusion::Gated => and_masks(&color, foreground),
            ColorFusion::Loose => color,
        };

        let mut fused = or_masks(&moving_edges, &color);
        if self.close_radius > 0 {
            fused = close(&fused, Norm::LInf, self.close_radius);
        }
        if let Some(r) = self.refine_radius {
            fused = dilate(&erode(&fused, Norm::LInf, r), Norm::LInf, r);
        }

        FusedMasks { fused, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    const WOOD: [u8; 3] = [200, 150, 80];

    fn scene() -> RgbImage {
        let mut frame = RgbImage::from_pixel(64, 64, Rgb([60, 60, 60]));
        for y in 10..50 {
            for x in 20..26 {
                frame.put_pixel(x, y, Rgb(WOOD));
            }
        }
        frame
    }

    fn full(value: u8) -> GrayImage {
        GrayImage::from_pixel(64, 64, Luma([value]))
    }

    #[test]
    fn test_gated_color_needs_motion() {
        let frame = scene();
        let gray = image::imageops::grayscale(&frame);
        let fusion = EdgeColorFusion::new(&TrackerConfig::default());

        let still = fusion.fuse(&frame, &gray, &full(0));
        assert!(still.fused.iter().all(|&v| v == 0));

        let moving = fusion.fuse(&frame, &gray, &full(255));
        assert_eq!(moving.fused.get_pixel(22, 30)[0], 255);
        assert_eq!(moving.fused.get_pixel(50, 30)[0], 0);
    }

    #[test]
    fn test_loose_color_ignores_motion() {
        let frame = scene();
        let gray = image::imageops::grayscale(&frame);
        let config = TrackerConfig {
            color_fusion: ColorFusion::Loose,
            ..TrackerConfig::default()
        };
        let fused = EdgeColorFusion::new(&config).fuse(&frame, &gray, &full(0)).fused;
        assert_eq!(fused.get_pixel(22, 30)[0], 255);
    }

    #[test]
    fn test_close_merges_fragments() {
        // two halves of the object separated by a 3 px gap
        let mut frame = RgbImage::from_pixel(64, 64, Rgb([60, 60, 60]));
        for y in (10..28).chain(31..50) {
            for x in 20..26 {
                frame.put_pixel(x, y, Rgb(WOOD));
            }
        }
        let gray = image::imageops::grayscale(&frame);
        let fused = EdgeColorFusion::new(&TrackerConfig::default())
            .fuse(&frame, &gray, &full(255))
            .fused;
        assert_eq!(fused.get_pixel(22, 29)[0], 255);
    }

    #[test]
    fn test_thin_shape_refine_drops_slivers() {
        let mut frame = RgbImage::from_pixel(64, 64, Rgb([60, 60, 60]));
        for y in 10..50 {
            for x in (10..26).chain(40..43) {
                frame.put_pixel(x, y, Rgb(WOOD));
            }
        }
        let gray = image::imageops::grayscale(&frame);
        let config = TrackerConfig {
            canny_low: 5000.0,
            canny_high: 10000.0,
            ..TrackerConfig::default()
        };

        let plain = EdgeColorFusion::new(&config).fuse(&frame, &gray, &full(255)).fused;
        assert_eq!(plain.get_pixel(41, 30)[0], 255);

        let refined = EdgeColorFusion::new(&TrackerConfig {
            thin_shape_refine: Some(2),
            ..config
        })
        .fuse(&frame, &gray, &full(255))
        .fused;
        // 3 px bar is eroded away, the 16 px block is restored by the dilation
        assert!((38..46).all(|x| refined.get_pixel(x, 30)[0] == 0));
        assert!((10..26).all(|x| refined.get_pixel(x, 30)[0] == 255));
        assert_eq!(refined.get_pixel(27, 30)[0], 0);
    }

    #[test]
    fn test_edges_are_reported() {
        let frame = scene();
        let gray = image::imageops::grayscale(&frame);
        let config = TrackerConfig {
            canny_low: 10.0,
            canny_high: 30.0,
            ..TrackerConfig::default()
        };
        let masks = EdgeColorFusion::new(&config).fuse(&frame, &gray, &full(0));
        assert!(masks.edges.iter().any(|&v| v > 0));
        assert!(masks.fused.iter().all(|&v| v == 0));
    }
}
