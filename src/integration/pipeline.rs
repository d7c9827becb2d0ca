//! TrackingPipeline for driving a frame source through the tracker.

use std::ops::ControlFlow;

use serde::Serialize;
use tracing::info;

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::tracker::{FrameResult, TrackMode, TrackingStateMachine};

use super::{FrameSink, FrameSource};

/// Totals for one run over a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames: u64,
    pub search: u64,
    pub detect: u64,
    pub optical_flow: u64,
    pub lost: u64,
    /// Frames on which the object had a position measurement.
    pub measured: u64,
    /// Identity resets after `max_lost` was exceeded
    pub resets: u64,
    /// Whether the run stopped before the end of the stream
    pub cancelled: bool,
}

impl RunSummary {
    fn record(&mut self, mode: TrackMode) {
        self.frames += 1;
        match mode {
            TrackMode::Search => self.search += 1,
            TrackMode::Detect => self.detect += 1,
            TrackMode::OpticalFlow => self.optical_flow += 1,
            TrackMode::Lost => self.lost += 1,
        }
        if mode.is_measured() {
            self.measured += 1;
        }
    }
}

/// Source -> tracker -> sinks, one frame at a time.
pub struct TrackingPipeline<S: FrameSource> {
    source: S,
    tracker: TrackingStateMachine,
    sinks: Vec<Box<dyn FrameSink>>,
}

impl<S: FrameSource> TrackingPipeline<S> {
    /// Pipeline over `source` with a tracker built from `config` and no sinks.
    pub fn new(source: S, config: TrackerConfig) -> Result<Self> {
        Ok(Self {
            source,
            tracker: TrackingStateMachine::new(config)?,
            sinks: Vec::new(),
        })
    }

    pub fn with_default_config(source: S) -> Result<Self> {
        Self::new(source, TrackerConfig::default())
    }

    /// Sinks receive frames in the order they were added.
    pub fn add_sink(&mut self, sink: impl FrameSink + 'static) -> &mut Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Process the next frame. `Ok(None)` at end of stream.
    pub fn process_next(&mut self) -> Result<Option<FrameResult>> {
        let Some(frame) = self.source.next_frame()? else {
            return Ok(None);
        };
        let result = self.tracker.process(&frame)?;
        for sink in &mut self.sinks {
            sink.write(&frame, &result, self.tracker.trace())?;
        }
        Ok(Some(result))
    }

    /// Run to end of stream.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.run_with(|_| ControlFlow::Continue(()))
    }

    /// Run to end of stream, handing each result to `on_frame`. Returning
    /// `ControlFlow::Break` stops before the next frame is read.
    pub fn run_with<F>(&mut self, mut on_frame: F) -> Result<RunSummary>
    where
        F: FnMut(&FrameResult) -> ControlFlow<()>,
    {
        let (width, height) = self.source.frame_size();
        info!(width, height, fps = self.source.frame_rate(), "tracking started");

        let resets_before = self.tracker.resets();
        let mut summary = RunSummary::default();
        while let Some(result) = self.process_next()? {
            summary.record(result.mode);
            if on_frame(&result).is_break() {
                summary.cancelled = true;
                break;
            }
        }
        for sink in &mut self.sinks {
            sink.finish()?;
        }
        summary.resets = self.tracker.resets() - resets_before;

        info!(
            frames = summary.frames,
            detect = summary.detect,
            optical_flow = summary.optical_flow,
            lost = summary.lost,
            resets = summary.resets,
            cancelled = summary.cancelled,
            "tracking finished"
        );
        Ok(summary)
    }

    /// Get a reference to the underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Get a reference to the underlying tracker.
    pub fn tracker(&self) -> &TrackingStateMachine {
        &self.tracker
    }

    /// Get a mutable reference to the underlying tracker.
    pub fn tracker_mut(&mut self) -> &mut TrackingStateMachine {
        &mut self.tracker
    }
}
