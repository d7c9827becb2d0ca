//! Frame sources feeding the tracker.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{debug, warn};

use crate::error::{Result, TrackerError};

/// Frame rate assumed when a source reports none or an invalid one.
pub const DEFAULT_FRAME_RATE: f64 = 25.0;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

/// A stream of equally sized color frames.
///
/// # Example
///
/// ```ignore
/// use bat_tracker::{FrameSource, Result};
/// use image::RgbImage;
///
/// struct Camera { /* device handle */ }
///
/// impl FrameSource for Camera {
///     fn next_frame(&mut self) -> Result<Option<RgbImage>> {
///         // grab, convert, return; Ok(None) at end of stream
///         Ok(None)
///     }
///     fn frame_rate(&self) -> f64 { 30.0 }
///     fn frame_size(&self) -> (u32, u32) { (1280, 720) }
/// }
/// ```
pub trait FrameSource {
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Nominal frames per second.
    fn frame_rate(&self) -> f64;

    fn frame_size(&self) -> (u32, u32);
}

/// Replace a missing or nonsensical frame rate by [`DEFAULT_FRAME_RATE`].
pub fn sanitize_frame_rate(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        DEFAULT_FRAME_RATE
    }
}

/// Decoded still images from one directory, played back in file-name order.
pub struct ImageSequenceSource {
    files: VecDeque<PathBuf>,
    pending: Option<RgbImage>,
    frame_size: (u32, u32),
    frame_rate: f64,
}

impl ImageSequenceSource {
    /// Open `dir`. Fails with [`TrackerError::EmptySource`] when the
    /// directory holds no image files or the first one cannot be decoded.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let entries =
            std::fs::read_dir(&dir).map_err(|_| TrackerError::EmptySource(dir.clone()))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        files.sort();
        let mut files = VecDeque::from(files);

        let first = files
            .pop_front()
            .ok_or_else(|| TrackerError::EmptySource(dir.clone()))?;
        let first = image::open(&first)
            .map_err(|err| {
                warn!(path = %first.display(), %err, "first frame is not decodable");
                TrackerError::EmptySource(dir.clone())
            })?
            .to_rgb8();

        debug!(dir = %dir.display(), frames = files.len() + 1, "opened image sequence");
        Ok(Self {
            frame_size: first.dimensions(),
            pending: Some(first),
            files,
            frame_rate: DEFAULT_FRAME_RATE,
        })
    }

    /// Set the nominal frame rate; invalid values fall back to the default.
    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = sanitize_frame_rate(fps);
        self
    }

    /// Frames not yet handed out.
    pub fn remaining(&self) -> usize {
        self.files.len() + usize::from(self.pending.is_some())
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        match self.files.pop_front() {
            Some(path) => Ok(Some(image::open(path)?.to_rgb8())),
            None => Ok(None),
        }
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }
}

/// Frames already held in memory. Mostly useful for tests and for callers
/// that decode video themselves.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    frames: VecDeque<RgbImage>,
    frame_rate: f64,
}

impl InMemorySource {
    /// Frames are played back in iteration order. Invalid `fps` falls back
    /// to the default rate.
    pub fn new(frames: impl IntoIterator<Item = RgbImage>, fps: f64) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            frame_rate: sanitize_frame_rate(fps),
        }
    }
}

impl FrameSource for InMemorySource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(self.frames.pop_front())
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn frame_size(&self) -> (u32, u32) {
        self.frames.front().map_or((0, 0), |f| f.dimensions())
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
