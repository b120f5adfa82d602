use crate::track::gallery::Gallery;
use crate::track::Feature;
use crate::utils::linear_sum_assignment::{infeasible_matrix, INFEASIBLE_COST};
use crate::Errors::MissingTrack;
use anyhow::Result;
use pathfinding::matrix::Matrix;
use std::collections::HashMap;

/// Nearest neighbour distance metric: for every track it keeps the gallery of observed
/// features and returns the closest cosine distance to a query feature.
///
#[derive(Debug, Clone)]
pub struct NearestNeighborDistanceMetric {
    matching_threshold: f32,
    budget: Option<usize>,
    samples: HashMap<u64, Gallery>,
}

impl NearestNeighborDistanceMetric {
    pub fn new(matching_threshold: f32, budget: Option<usize>) -> Self {
        Self {
            matching_threshold,
            budget,
            samples: HashMap::default(),
        }
    }

    pub fn matching_threshold(&self) -> f32 {
        self.matching_threshold
    }

    /// Adds the feature to the gallery of the track, the gallery is created on the first call
    ///
    pub fn partial_fit(&mut self, track_id: u64, feature: Feature) {
        let budget = self.budget;
        self.samples
            .entry(track_id)
            .or_insert_with(|| Gallery::new(budget))
            .push(feature);
    }

    /// Drops the galleries of tracks that are not active anymore
    ///
    pub fn retain<F>(&mut self, mut is_active: F)
    where
        F: FnMut(u64) -> bool,
    {
        self.samples.retain(|track_id, _| is_active(*track_id));
    }

    pub fn gallery(&self, track_id: u64) -> Option<&Gallery> {
        self.samples.get(&track_id)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Minimal cosine distance between the feature and the gallery of the track
    ///
    pub fn distance(&self, track_id: u64, feature: &Feature) -> Result<f32> {
        let gallery = self.samples.get(&track_id).ok_or(MissingTrack(track_id))?;
        Ok(gallery.distance(feature).unwrap_or(INFEASIBLE_COST))
    }

    /// Cost matrix of shape `tracks x features` where the cell `(i, j)` is the nearest
    /// neighbour distance between the gallery of `track_ids[i]` and `features[j]`
    ///
    pub fn cost_matrix(&self, track_ids: &[u64], features: &[&Feature]) -> Result<Matrix<f32>> {
        let mut cost = infeasible_matrix(track_ids.len(), features.len());
        for (row, track_id) in track_ids.iter().enumerate() {
            for (col, feature) in features.iter().enumerate() {
                cost[(row, col)] = self.distance(*track_id, feature)?;
            }
        }
        Ok(cost)
    }
}
