//! Consumers of per-frame tracking results.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::error::Result;
use crate::tracker::{FrameResult, Trace, TrackMode};

/// Receives every processed frame together with the tracker's decision.
pub trait FrameSink {
    fn write(&mut self, frame: &RgbImage, result: &FrameResult, trace: &Trace) -> Result<()>;

    /// Called once after the last frame.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Draws the box, orientation and trace onto each frame and writes it as a
/// numbered PNG.
pub struct AnnotatingSink {
    out_dir: PathBuf,
    written: u64,
}

impl AnnotatingSink {
    /// Create `out_dir` if needed and write frames into it.
    pub fn new(out_dir: impl AsRef<Path>) -> Result<Self> {
        let out_dir = out_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&out_dir)?;
        Ok(Self {
            out_dir,
            written: 0,
        })
    }

    /// Frames saved so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    fn path_for(&self, frame_index: u64) -> PathBuf {
        self.out_dir.join(format!("frame_{frame_index:06}.png"))
    }
}

impl FrameSink for AnnotatingSink {
    fn write(&mut self, frame: &RgbImage, result: &FrameResult, trace: &Trace) -> Result<()> {
        let canvas = annotate(frame, result, trace);
        canvas.save(self.path_for(result.frame_index))?;
        self.written += 1;
        Ok(())
    }
}

fn mode_color(mode: TrackMode) -> Rgb<u8> {
    match mode {
        TrackMode::Search => Rgb([160, 160, 160]),
        TrackMode::Detect => Rgb([0, 255, 0]),
        TrackMode::OpticalFlow => Rgb([255, 200, 0]),
        TrackMode::Lost => Rgb([255, 0, 0]),
    }
}

/// Render the overlay for one frame.
pub fn annotate(frame: &RgbImage, result: &FrameResult, trace: &Trace) -> RgbImage {
    let mut canvas = frame.clone();
    let color = mode_color(result.mode);

    let points: Vec<(f32, f32)> = trace.iter().map(|(x, y)| (x as f32, y as f32)).collect();
    for pair in points.windows(2) {
        draw_line_segment_mut(&mut canvas, pair[0], pair[1], Rgb([0, 128, 255]));
    }

    if let Some(bbox) = result.bbox.filter(|b| b.width > 0 && b.height > 0) {
        let rect = Rect::at(bbox.x, bbox.y).of_size(bbox.width, bbox.height);
        draw_hollow_rect_mut(&mut canvas, rect, color);

        if let Some(angle) = result.angle {
            let (cx, cy) = bbox.center();
            let half = f64::from(bbox.width.max(bbox.height)) / 2.0;
            let (sin, cos) = angle.to_radians().sin_cos();
            draw_line_segment_mut(
                &mut canvas,
                ((cx - half * cos) as f32, (cy - half * sin) as f32),
                ((cx + half * cos) as f32, (cy + half * sin) as f32),
                color,
            );
        }
    }

    if let Some((x, y)) = result.center {
        draw_filled_circle_mut(&mut canvas, (x as i32, y as i32), 3, color);
    }
    canvas
}
