use crate::pipeline;
use crate::track;
use crate::trackers;
use crate::utils;

pub use pipeline::{DetectionRow, Frame, Sequence, SequencePipeline, TrackRecord};
pub use track::{Track, TrackState};
pub use trackers::deep_sort::options::{DeepSortOptions, ReportPolicy};
pub use trackers::deep_sort::{DeepSort, Detection, FrameOutput, TrackReport};
pub use utils::bbox::{BoundingBox, Universal2DBox};

pub use crate::Errors;
