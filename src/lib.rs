//! DeepSORT tracking for camera-trap image sequences.
//!
//! The crate associates per-frame detections (bounding box, confidence and
//! appearance embedding) into persistent track identities. The entry points are
//! [`DeepSort`](trackers::deep_sort::DeepSort) for frame-by-frame tracking and
//! [`SequencePipeline`](pipeline::SequencePipeline) for whole sequences.
//!
use thiserror::Error;

/// Cosine distance between appearance features
pub mod distance;

/// Synthetic data generators for tests and benchmarks
pub mod examples;

/// Sequence level driver
pub mod pipeline;

/// Commonly used types
pub mod prelude;

/// Track lifecycle and appearance gallery
pub mod track;

/// Tracker implementations
pub mod trackers;

/// Geometry, kalman filter and assignment utilities
pub mod utils;

#[cfg(feature = "python")]
mod python;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Errors {
    #[error("Detection is malformed: {0}")]
    InvalidDetection(String),
    #[error("Configuration is invalid: {0}")]
    InvalidConfiguration(String),
    #[error("Kalman filter innovation covariance is not positive definite")]
    DegenerateCovariance,
    #[error("Missing track {0}")]
    MissingTrack(u64),
    #[error("Frame {current} must follow frame {previous}")]
    FrameOrder { previous: u64, current: u64 },
    #[error("Bounding box cannot be converted: height must be positive")]
    BBoxConversion,
}

pub(crate) const EPS: f32 = 0.00001;

/// Approximate comparison for float based structures
pub trait EstimateClose {
    fn almost_same(&self, other: &Self, eps: f32) -> bool;
}
