use crate::track::Track;
use crate::trackers::deep_sort::cost::{gated_appearance_cost, iou_cost};
use crate::trackers::deep_sort::metric::NearestNeighborDistanceMetric;
use crate::trackers::deep_sort::options::DeepSortOptions;
use crate::trackers::deep_sort::Detection;
use crate::utils::kalman::kalman_2d_box::Universal2DBoxKalmanFilter;
use crate::utils::linear_sum_assignment;
use anyhow::Result;
use log::debug;
use pathfinding::matrix::Matrix;

/// Result of the association between the tracks and the detections of a frame.
///
/// All values are indices into the track and detection slices passed to the matcher.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matches {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Solves the assignment for the cost matrix built over `track_indices x detection_indices`
/// and translates the local positions back to the global indices.
///
pub fn min_cost_matching(
    cost: &Matrix<f32>,
    threshold: f32,
    track_indices: &[usize],
    detection_indices: &[usize],
) -> Matches {
    let pairs = linear_sum_assignment::min_cost_matching(cost, threshold);

    let mut track_matched = vec![false; track_indices.len()];
    let mut detection_matched = vec![false; detection_indices.len()];
    let mut matches = Vec::with_capacity(pairs.len());
    for (row, col) in pairs {
        track_matched[row] = true;
        detection_matched[col] = true;
        matches.push((track_indices[row], detection_indices[col]));
    }

    Matches {
        matches,
        unmatched_tracks: track_indices
            .iter()
            .zip(track_matched)
            .filter(|(_, m)| !m)
            .map(|(t, _)| *t)
            .collect(),
        unmatched_detections: detection_indices
            .iter()
            .zip(detection_matched)
            .filter(|(_, m)| !m)
            .map(|(d, _)| *d)
            .collect(),
    }
}

/// Two stage association: the appearance cascade ordered by the time since the last update,
/// then the IoU fallback for recently updated tracks.
///
pub struct Associator<'a> {
    metric: &'a NearestNeighborDistanceMetric,
    filter: &'a Universal2DBoxKalmanFilter,
    opts: &'a DeepSortOptions,
}

impl<'a> Associator<'a> {
    pub fn new(
        metric: &'a NearestNeighborDistanceMetric,
        filter: &'a Universal2DBoxKalmanFilter,
        opts: &'a DeepSortOptions,
    ) -> Self {
        Self {
            metric,
            filter,
            opts,
        }
    }

    /// Matching cascade. Level `k` holds the tracks with `time_since_update == k + 1`, so the
    /// tracks seen in the previous frame pick their detections before the older ones.
    ///
    pub fn cascade(
        &self,
        tracks: &[Track],
        detections: &[&Detection],
        track_indices: &[usize],
        detection_indices: &[usize],
    ) -> Result<Matches> {
        let mut matches = Vec::default();
        let mut unmatched_detections = detection_indices.to_vec();

        for level in 0..self.opts.get_max_age() {
            if unmatched_detections.is_empty() {
                break;
            }

            let level_tracks = track_indices
                .iter()
                .copied()
                .filter(|i| tracks[*i].time_since_update() == level + 1)
                .collect::<Vec<_>>();

            if level_tracks.is_empty() {
                continue;
            }

            let track_refs = level_tracks.iter().map(|i| &tracks[*i]).collect::<Vec<_>>();
            let detection_refs = unmatched_detections
                .iter()
                .map(|i| detections[*i])
                .collect::<Vec<_>>();

            let cost = gated_appearance_cost(
                self.metric,
                self.filter,
                &track_refs,
                &detection_refs,
                self.opts.get_motion_gate_threshold(),
            )?;

            let level_matches = min_cost_matching(
                &cost,
                self.metric.matching_threshold(),
                &level_tracks,
                &unmatched_detections,
            );

            debug!(
                "Cascade level {}: {} tracks, {} matched",
                level,
                level_tracks.len(),
                level_matches.matches.len()
            );

            matches.extend(level_matches.matches);
            unmatched_detections = level_matches.unmatched_detections;
        }

        let unmatched_tracks = track_indices
            .iter()
            .copied()
            .filter(|t| !matches.iter().any(|(m, _)| m == t))
            .collect();

        Ok(Matches {
            matches,
            unmatched_tracks,
            unmatched_detections,
        })
    }

    /// IoU matching of the tracks updated in the previous frame against the detections left
    /// by the cascade. Older tracks are passed through as unmatched.
    ///
    pub fn iou_fallback(
        &self,
        tracks: &[Track],
        detections: &[&Detection],
        track_indices: &[usize],
        detection_indices: &[usize],
    ) -> Matches {
        let (candidates, stale): (Vec<usize>, Vec<usize>) = track_indices
            .iter()
            .copied()
            .partition(|i| tracks[*i].time_since_update() <= 1);

        let track_refs = candidates.iter().map(|i| &tracks[*i]).collect::<Vec<_>>();
        let detection_refs = detection_indices
            .iter()
            .map(|i| detections[*i])
            .collect::<Vec<_>>();

        let cost = iou_cost(&track_refs, &detection_refs);
        let mut res = min_cost_matching(
            &cost,
            1.0 - self.opts.get_iou_min(),
            &candidates,
            detection_indices,
        );

        res.unmatched_tracks.extend(stale);
        res.unmatched_tracks.sort_unstable();
        res
    }

    /// Full association of the frame: every live track enters the cascade, the leftovers go
    /// through the IoU fallback.
    ///
    pub fn associate(&self, tracks: &[Track], detections: &[&Detection]) -> Result<Matches> {
        let track_indices = (0..tracks.len()).collect::<Vec<_>>();
        let detection_indices = (0..detections.len()).collect::<Vec<_>>();

        let cascade = self.cascade(tracks, detections, &track_indices, &detection_indices)?;
        let fallback = self.iou_fallback(
            tracks,
            detections,
            &cascade.unmatched_tracks,
            &cascade.unmatched_detections,
        );

        let mut matches = cascade.matches;
        matches.extend(fallback.matches);
        matches.sort_unstable();

        debug!(
            "Association: {} matches, {} unmatched tracks, {} unmatched detections",
            matches.len(),
            fallback.unmatched_tracks.len(),
            fallback.unmatched_detections.len()
        );

        Ok(Matches {
            matches,
            unmatched_tracks: fallback.unmatched_tracks,
            unmatched_detections: fallback.unmatched_detections,
        })
    }
}
