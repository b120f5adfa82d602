use crate::utils::bbox::{BoundingBox, Universal2DBox};
use crate::utils::kalman::kalman_2d_box::{Universal2DBoxKalmanFilter, DIM_2D_BOX_X2};
use crate::utils::kalman::KalmanState;
use anyhow::{Context, Result};
use ultraviolet::f32x8;

/// Bounded appearance feature history
pub mod gallery;

/// Feature vector conversions
pub mod utils;

/// Feature vector representation, the appearance embedding split into SIMD lanes
pub type Feature = Vec<f32x8>;

/// Number of SIMD lanes used to store feature parts internally
pub const FEATURE_LANES_SIZE: usize = 8;

/// Lifecycle state of a track.
///
/// Newly created tracks are `Tentative` until enough evidence is collected, then they
/// become `Confirmed`. Tracks that are no longer alive are `Deleted` and removed from
/// the set of active tracks.
///
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TrackState {
    Tentative,
    Confirmed,
    Deleted,
}

/// Counters that drive the lifecycle transitions
///
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Lifecycle {
    /// Number of consecutive matches required to confirm a track
    pub confirmation_hits: usize,
    /// Missed frames after which a confirmed track is deleted
    pub max_age: usize,
    /// Missed frames after which a tentative track is deleted
    pub max_age_unconfirmed: usize,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            confirmation_hits: 3,
            max_age: 30,
            max_age_unconfirmed: 0,
        }
    }
}

/// A single target track with the kalman state space `(xc, yc, aspect, height)` and the
/// associated velocities.
///
#[derive(Debug, Clone)]
pub struct Track {
    track_id: u64,
    state: KalmanState<{ DIM_2D_BOX_X2 }>,
    hits: usize,
    streak: usize,
    age: usize,
    time_since_update: usize,
    track_state: TrackState,
    ever_confirmed: bool,
    lifecycle: Lifecycle,
}

impl Track {
    /// Creates a tentative track from the first observation
    ///
    pub fn new(
        track_id: u64,
        filter: &Universal2DBoxKalmanFilter,
        bbox: &Universal2DBox,
        lifecycle: Lifecycle,
    ) -> Self {
        let mut track = Self {
            track_id,
            state: filter.initiate(bbox),
            hits: 1,
            streak: 1,
            age: 1,
            time_since_update: 0,
            track_state: TrackState::Tentative,
            ever_confirmed: false,
            lifecycle,
        };
        track.try_confirm();
        track
    }

    pub fn get_track_id(&self) -> u64 {
        self.track_id
    }

    pub fn get_state(&self) -> &KalmanState<{ DIM_2D_BOX_X2 }> {
        &self.state
    }

    pub fn get_track_state(&self) -> TrackState {
        self.track_state
    }

    /// Total number of observations
    ///
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Observations since the last miss
    ///
    pub fn consecutive_hits(&self) -> usize {
        self.streak
    }

    pub fn age(&self) -> usize {
        self.age
    }

    pub fn time_since_update(&self) -> usize {
        self.time_since_update
    }

    /// `true` when the track was confirmed at some point of its life, even if it is deleted now
    ///
    pub fn ever_confirmed(&self) -> bool {
        self.ever_confirmed
    }

    pub fn is_tentative(&self) -> bool {
        self.track_state == TrackState::Tentative
    }

    pub fn is_confirmed(&self) -> bool {
        self.track_state == TrackState::Confirmed
    }

    pub fn is_deleted(&self) -> bool {
        self.track_state == TrackState::Deleted
    }

    /// The current box in kalman measurement space
    ///
    pub fn bbox(&self) -> Universal2DBox {
        self.state.bbox()
    }

    /// The current box in the `(left, top, width, height)` format
    ///
    pub fn ltwh(&self) -> Result<BoundingBox> {
        BoundingBox::try_from(self.bbox())
            .with_context(|| format!("Track {} has a degenerate box", self.track_id))
    }

    /// Propagates the state to the current frame
    ///
    pub fn predict(&mut self, filter: &Universal2DBoxKalmanFilter) {
        self.state = filter.predict(&self.state);
        self.age += 1;
        self.time_since_update += 1;
    }

    /// Corrects the state with the matched observation
    ///
    pub fn update(
        &mut self,
        filter: &Universal2DBoxKalmanFilter,
        bbox: &Universal2DBox,
    ) -> Result<()> {
        self.state = filter
            .update(&self.state, bbox)
            .with_context(|| format!("Kalman update failed for track {}", self.track_id))?;
        self.hits += 1;
        self.streak += 1;
        self.time_since_update = 0;
        self.try_confirm();
        Ok(())
    }

    /// Marks the track as missed in the current frame
    ///
    pub fn mark_missed(&mut self) {
        self.streak = 0;
        let limit = match self.track_state {
            TrackState::Tentative => self.lifecycle.max_age_unconfirmed,
            TrackState::Confirmed => self.lifecycle.max_age,
            TrackState::Deleted => return,
        };

        if self.time_since_update > limit {
            self.track_state = TrackState::Deleted;
        }
    }

    fn try_confirm(&mut self) {
        if self.track_state == TrackState::Tentative
            && self.streak >= self.lifecycle.confirmation_hits
        {
            self.track_state = TrackState::Confirmed;
            self.ever_confirmed = true;
        }
    }
}
