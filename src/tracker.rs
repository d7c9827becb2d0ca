mod kalman_filter;
mod optical_flow;
mod state_machine;
mod trace;
mod track_state;

pub use kalman_filter::KalmanEstimator;
pub use optical_flow::{FlowParams, OpticalFlowTracker};
pub use state_machine::{FrameResult, TrackingStateMachine};
pub use trace::Trace;
pub use track_state::TrackMode;
