use serde::Serialize;

/// Per-frame decision of the tracking state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackMode {
    /// No identity and nothing detected
    #[default]
    Search,
    /// Fresh or associated detection this frame
    Detect,
    /// Identity carried by optical-flow displacement
    OpticalFlow,
    /// Identity carried by open-loop prediction only
    Lost,
}

impl TrackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackMode::Search => "SEARCH",
            TrackMode::Detect => "DETECT",
            TrackMode::OpticalFlow => "OPTICAL_FLOW",
            TrackMode::Lost => "LOST",
        }
    }

    /// Whether this frame carried a measurement (detection or flow).
    pub fn is_measured(&self) -> bool {
        matches!(self, TrackMode::Detect | TrackMode::OpticalFlow)
    }
}

impl std::fmt::Display for TrackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
