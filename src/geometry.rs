mod candidate;
mod orientation;
mod rect;

pub use candidate::{Candidate, CandidateExtractor};
pub use orientation::{orientation, principal_axis_angle};
pub use rect::{BoundingBox, RotatedRect};
