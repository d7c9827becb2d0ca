//! Error type shared by the tracker and its collaborators.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the tracking core and the frame I/O collaborators.
///
/// Per-frame degenerate conditions (empty ROI, degenerate rectangles,
/// lost flow) are data, not errors, and never show up here.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A frame did not match the dimensions the stream started with.
    #[error("frame size changed mid-stream: expected {expected:?}, got {actual:?}")]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The Kalman estimator was used before `init`.
    #[error("estimator used before initialization")]
    NotInitialized,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// Background subtraction failed inside OpenCV.
    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),

    /// The frame source could not be opened or holds no decodable frames.
    #[error("no readable frames in {0}")]
    EmptySource(PathBuf),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
