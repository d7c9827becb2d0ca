//! Detector-free tracking of a single elongated object (a cricket bat) in
//! video. Motion, edge and color cues produce candidate blobs; a Kalman
//! estimator and a sparse optical-flow patch keep the identity alive across
//! missed detections.

pub mod config;
pub mod error;
pub mod geometry;
pub mod integration;
pub mod segmentation;
pub mod tracker;

pub use config::{ColorFusion, TrackerConfig};
pub use error::{Result, TrackerError};
pub use geometry::{BoundingBox, Candidate, CandidateExtractor, RotatedRect};
pub use integration::{
    AnnotatingSink, FrameSink, FrameSource, ImageSequenceSource, InMemorySource, RunSummary,
    TrackingPipeline,
};
pub use segmentation::{EdgeColorFusion, MotionSegmenter};
pub use tracker::{
    FlowParams, FrameResult, KalmanEstimator, OpticalFlowTracker, Trace, TrackMode,
    TrackingStateMachine,
};
