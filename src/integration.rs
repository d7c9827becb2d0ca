//! Collaborators around the tracking core: where frames come from and where
//! results go.

mod pipeline;
mod sink;
mod source;

pub use pipeline::{RunSummary, TrackingPipeline};
pub use sink::{AnnotatingSink, FrameSink, annotate};
pub use source::{
    DEFAULT_FRAME_RATE, FrameSource, ImageSequenceSource, InMemorySource, sanitize_frame_rate,
};
