//! Per-frame fusion of detection, optical flow and prediction for one identity.

use image::{GrayImage, RgbImage};
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::geometry::{BoundingBox, Candidate, CandidateExtractor, RotatedRect, orientation};
use crate::segmentation::{EdgeColorFusion, FusedMasks, MotionSegmenter};
use crate::tracker::kalman_filter::KalmanEstimator;
use crate::tracker::optical_flow::{FlowParams, OpticalFlowTracker};
use crate::tracker::trace::Trace;
use crate::tracker::track_state::TrackMode;

/// Everything the tracker decided about one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameResult {
    /// Zero-based index of the frame in the stream
    pub frame_index: u64,
    pub mode: TrackMode,
    /// Present in `DETECT` (from the candidate) and `OPTICAL_FLOW` (fixed size box)
    #[serde(rename = "box")]
    pub bbox: Option<BoundingBox>,
    /// Orientation in degrees, only for detections
    pub angle: Option<f64>,
    /// Tracked position for this frame; the prediction while `LOST`
    pub center: Option<(f64, f64)>,
    /// Consecutive frames without a measurement after this frame
    pub lost_count: u32,
    /// Number of candidates that passed the geometric filters
    pub candidates: usize,
    /// Fused mask the candidates were extracted from
    #[serde(skip)]
    pub mask: GrayImage,
}

/// Single-identity tracker: SEARCH -> DETECT -> OPTICAL_FLOW / LOST -> reset.
///
/// One instance per stream. All model state (background, estimator, flow
/// patch, trace) lives here, so independent streams can run on separate
/// instances in parallel.
pub struct TrackingStateMachine {
    config: TrackerConfig,
    motion: MotionSegmenter,
    fusion: EdgeColorFusion,
    extractor: CandidateExtractor,
    kalman: KalmanEstimator,
    flow: OpticalFlowTracker,
    trace: Trace,
    lost_count: u32,
    mode: TrackMode,
    last_rect: Option<RotatedRect>,
    frame_size: Option<(u32, u32)>,
    frame_index: u64,
    resets: u64,
}

impl TrackingStateMachine {
    /// Validate `config` and build every stage. Fails on an invalid config
    /// or when the background model cannot be created.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            motion: MotionSegmenter::new(&config)?,
            fusion: EdgeColorFusion::new(&config),
            extractor: CandidateExtractor::new(config.min_area, config.aspect_threshold),
            kalman: KalmanEstimator::new(
                config.kalman_process_noise,
                config.kalman_measurement_noise,
            ),
            flow: OpticalFlowTracker::new(FlowParams::from(&config)),
            trace: Trace::new(config.trace_capacity),
            lost_count: 0,
            mode: TrackMode::Search,
            last_rect: None,
            frame_size: None,
            frame_index: 0,
            resets: 0,
            config,
        })
    }

    /// Configuration the tracker was built with.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Mode reported for the last processed frame.
    pub fn mode(&self) -> TrackMode {
        self.mode
    }

    /// Consecutive frames without a measurement.
    pub fn lost_count(&self) -> u32 {
        self.lost_count
    }

    /// Recent centroids of the current identity.
    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Whether an identity is being tracked.
    pub fn is_initialized(&self) -> bool {
        self.kalman.is_initialized()
    }

    /// Whether optical flow can bridge the next frame.
    pub fn has_flow_patch(&self) -> bool {
        self.flow.is_active()
    }

    /// Dimensions fixed by the first processed frame.
    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.frame_size
    }

    /// Number of identity resets caused by `max_lost` being exceeded.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    /// Drop the current identity: estimator, flow patch, trace and lost count.
    /// The background model is kept.
    pub fn reset(&mut self) {
        self.kalman.reset();
        self.flow.reset();
        self.trace.clear();
        self.lost_count = 0;
        self.last_rect = None;
        self.mode = TrackMode::Search;
    }

    /// Run the full pipeline on the next frame of the stream.
    ///
    /// Only a frame whose size differs from the first one is an error; every
    /// tracking failure is reported through the result's mode and fields.
    pub fn process(&mut self, frame: &RgbImage) -> Result<FrameResult> {
        let size = frame.dimensions();
        match self.frame_size {
            Some(expected) if expected != size => {
                return Err(TrackerError::FrameSizeMismatch {
                    expected,
                    actual: size,
                });
            }
            Some(_) => {}
            None => self.frame_size = Some(size),
        }

        let gray = image::imageops::grayscale(frame);
        let foreground = self.motion.apply(frame)?;
        let FusedMasks { fused, .. } = self.fusion.fuse(frame, &gray, &foreground);
        let candidates = self.extractor.extract(&fused);
        trace!(frame = self.frame_index, candidates = candidates.len(), "extracted candidates");

        let mut chosen = None;
        if self.kalman.is_initialized() && !candidates.is_empty() {
            let (px, py) = self.kalman.predict()?;
            let gate = self.config.gate_fraction * f64::from(size.0.max(size.1));
            chosen = nearest(&candidates, px, py).filter(|c| c.distance_to(px, py) < gate);
            if chosen.is_none() {
                debug!(gate, "nearest candidate outside association gate");
            }
        }
        // re-acquisition: the largest elongated moving blob wins
        let chosen = chosen.or_else(|| candidates.first());

        let mut result = FrameResult {
            frame_index: self.frame_index,
            mode: TrackMode::Search,
            bbox: None,
            angle: None,
            center: None,
            lost_count: 0,
            candidates: candidates.len(),
            mask: GrayImage::new(0, 0),
        };

        if let Some(candidate) = chosen {
            self.accept_detection(candidate, &gray, &mut result)?;
        } else if self.kalman.is_initialized() {
            if !self.follow_flow(&gray, &mut result)? {
                self.coast(&mut result)?;
            }
        }

        if result.mode != self.mode {
            debug!(frame = self.frame_index, from = %self.mode, to = %result.mode, "mode change");
        }
        self.mode = result.mode;
        self.frame_index += 1;
        result.lost_count = self.lost_count;
        result.mask = fused;
        Ok(result)
    }

    fn accept_detection(
        &mut self,
        candidate: &Candidate,
        gray: &GrayImage,
        result: &mut FrameResult,
    ) -> Result<()> {
        let angle = orientation(&candidate.contour, candidate.rect.angle);
        let (cx, cy) = candidate.center();

        if self.kalman.is_initialized() {
            self.kalman.update(cx, cy)?;
        } else {
            debug!(frame = self.frame_index, cx, cy, area = candidate.area, "acquired new identity");
            self.kalman.init(cx, cy);
        }

        if self.flow.is_active() {
            // keep the patch's reference frame current
            self.flow.step(gray, Some(&candidate.rect));
        } else {
            self.flow.init(gray, &candidate.rect);
        }

        self.last_rect = Some(candidate.rect);
        self.trace.push(cx, cy);
        self.lost_count = 0;

        result.mode = TrackMode::Detect;
        result.bbox = Some(candidate.rect.bounding_box());
        result.angle = Some(angle);
        result.center = Some((cx, cy));
        Ok(())
    }

    /// Bridge a missed detection with the flow displacement. Returns `false`
    /// when flow could not provide one.
    fn follow_flow(&mut self, gray: &GrayImage, result: &mut FrameResult) -> Result<bool> {
        let (x, y) = self.kalman.position()?;
        let side = f64::from(self.config.flow_box_size);
        let anchor = self
            .last_rect
            .map_or_else(|| RotatedRect::new((x, y), side, side, 0.0), |r| r.recentered((x, y)));

        let Some((dx, dy)) = self.flow.step(gray, Some(&anchor)) else {
            return Ok(false);
        };

        let (nx, ny) = (x + dx, y + dy);
        self.kalman.update(nx, ny)?;
        self.trace.push(nx, ny);
        self.lost_count = 0;

        result.mode = TrackMode::OpticalFlow;
        result.bbox = Some(BoundingBox::centered(nx, ny, self.config.flow_box_size));
        result.center = Some((nx, ny));
        Ok(true)
    }

    /// Open-loop prediction, resetting the identity once `max_lost` is exceeded.
    fn coast(&mut self, result: &mut FrameResult) -> Result<()> {
        self.lost_count += 1;
        let (px, py) = self.kalman.predict()?;
        self.trace.push(px, py);

        if self.lost_count > self.config.max_lost {
            debug!(frame = self.frame_index, lost = self.lost_count, "identity lost, resetting");
            self.kalman.reset();
            self.flow.reset();
            self.trace.clear();
            self.lost_count = 0;
            self.last_rect = None;
            self.resets += 1;
        }

        result.mode = TrackMode::Lost;
        result.center = Some((px, py));
        Ok(())
    }
}

/// Candidate closest to `(x, y)`; the first one wins on equal distance.
fn nearest(candidates: &[Candidate], x: f64, y: f64) -> Option<&Candidate> {
    let mut best: Option<(&Candidate, f64)> = None;
    for c in candidates {
        let d = c.distance_to(x, y);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((c, d));
        }
    }
    best.map(|(c, _)| c)
}
