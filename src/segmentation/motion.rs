//! Adaptive background subtraction.
//!
//! Wraps OpenCV's MOG2 per-pixel Gaussian mixture. Shadows are not
//! detected, so the raw mask is strictly 0/255. The mask is cleaned with a
//! morphological open followed by a dilation.

use image::{GrayImage, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, open};
use opencv::core::{self, Mat, Ptr};
use opencv::prelude::*;
use opencv::video::{
    BackgroundSubtractorMOG2, BackgroundSubtractorMOG2Trait, create_background_subtractor_mog2,
};
use tracing::debug;

use crate::config::TrackerConfig;
use crate::error::Result;

/// MOG2 background model producing a binary foreground mask per frame.
/// One instance per stream.
pub struct MotionSegmenter {
    subtractor: Ptr<BackgroundSubtractorMOG2>,
    /// Negative lets OpenCV pick `1 / min(2 * frames, history)`.
    learning_rate: f64,
    open_radius: u8,
    dilate_radius: u8,
    size: Option<(u32, u32)>,
}

impl MotionSegmenter {
    /// Build the subtractor from `bg_history`, `bg_var_threshold` and
    /// `bg_learning_rate`.
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let history = i32::try_from(config.bg_history).unwrap_or(i32::MAX);
        let subtractor =
            create_background_subtractor_mog2(history, f64::from(config.bg_var_threshold), false)?;

        Ok(Self {
            subtractor,
            learning_rate: config.bg_learning_rate.map_or(-1.0, f64::from),
            open_radius: config.motion_open_radius,
            dilate_radius: config.motion_dilate_radius,
            size: None,
        })
    }

    /// Update the model with `frame` and return its foreground mask (0/255).
    ///
    /// The first frame (or the first after a size change) only seeds the
    /// model and comes back all background.
    pub fn apply(&mut self, frame: &RgbImage) -> Result<GrayImage> {
        let (width, height) = frame.dimensions();
        let rows = i32::try_from(height).unwrap_or(i32::MAX);
        let input = Mat::from_slice(frame.as_raw())?.reshape(3, rows)?.try_clone()?;

        let mut foreground = Mat::default();
        BackgroundSubtractorMOG2Trait::apply(
            &mut self.subtractor,
            &input,
            &mut foreground,
            self.learning_rate,
        )?;

        if self.size != Some((width, height)) {
            debug!(width, height, "seeding background model");
            self.size = Some((width, height));
            return Ok(GrayImage::new(width, height));
        }

        let raw = GrayImage::from_raw(width, height, foreground.data_bytes()?.to_vec())
            .ok_or_else(|| {
                opencv::Error::new(core::StsUnmatchedSizes, "foreground mask size mismatch")
            })?;
        Ok(self.clean(raw))
    }

    fn clean(&self, raw: GrayImage) -> GrayImage {
        let opened = if self.open_radius > 0 {
            open(&raw, Norm::LInf, self.open_radius)
        } else {
            raw
        };
        if self.dilate_radius > 0 {
            dilate(&opened, Norm::LInf, self.dilate_radius)
        } else {
            opened
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn flat(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(color))
    }

    fn with_block(mut img: RgbImage, x0: u32, y0: u32, w: u32, h: u32, color: [u8; 3]) -> RgbImage {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                img.put_pixel(x, y, Rgb(color));
            }
        }
        img
    }

    fn count(mask: &GrayImage) -> usize {
        mask.iter().filter(|&&v| v > 0).count()
    }

    fn segmenter() -> MotionSegmenter {
        MotionSegmenter::new(&TrackerConfig::default()).unwrap()
    }

    #[test]
    fn test_first_frame_is_background() {
        let mut seg = segmenter();
        let mask = seg.apply(&flat(40, 30, [60, 60, 60])).unwrap();
        assert_eq!(mask.dimensions(), (40, 30));
        assert_eq!(count(&mask), 0);
    }

    #[test]
    fn test_static_scene_stays_background() {
        let mut seg = segmenter();
        let frame = with_block(flat(40, 30, [60, 60, 60]), 5, 5, 10, 10, [200, 150, 80]);
        for _ in 0..10 {
            assert_eq!(count(&seg.apply(&frame).unwrap()), 0);
        }
    }

    #[test]
    fn test_new_object_is_foreground() {
        let mut seg = segmenter();
        let bg = flat(60, 60, [60, 60, 60]);
        seg.apply(&bg).unwrap();
        seg.apply(&bg).unwrap();

        let mask = seg.apply(&with_block(bg, 20, 10, 8, 30, [200, 150, 80])).unwrap();
        // the block survives opening and grows by the dilation
        assert!(mask.get_pixel(23, 25)[0] > 0);
        assert!(mask.get_pixel(19, 25)[0] > 0);
        assert_eq!(mask.get_pixel(50, 50)[0], 0);
        assert!(mask.iter().all(|&v| v == 0 || v == 255));
        assert!(count(&mask) >= 8 * 30);
    }

    #[test]
    fn test_speckle_is_removed() {
        let mut seg = segmenter();
        let bg = flat(30, 30, [60, 60, 60]);
        seg.apply(&bg).unwrap();
        seg.apply(&bg).unwrap();

        let mask = seg.apply(&with_block(bg, 10, 10, 1, 1, [255, 255, 255])).unwrap();
        assert_eq!(count(&mask), 0);
    }

    #[test]
    fn test_size_change_reseeds() {
        let mut seg = segmenter();
        seg.apply(&flat(20, 20, [0, 0, 0])).unwrap();
        seg.apply(&flat(20, 20, [0, 0, 0])).unwrap();
        let mask = seg.apply(&flat(24, 16, [255, 255, 255])).unwrap();
        assert_eq!(mask.dimensions(), (24, 16));
        assert_eq!(count(&mask), 0);
    }
}
