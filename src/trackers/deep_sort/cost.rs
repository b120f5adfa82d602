use crate::track::Track;
use crate::trackers::deep_sort::metric::NearestNeighborDistanceMetric;
use crate::trackers::deep_sort::Detection;
use crate::utils::bbox::BoundingBox;
use crate::utils::kalman::kalman_2d_box::Universal2DBoxKalmanFilter;
use crate::utils::linear_sum_assignment::{infeasible_matrix, INFEASIBLE_COST};
use anyhow::Result;
use log::{trace, warn};
use pathfinding::matrix::Matrix;

/// Appearance cost matrix with motion gating.
///
/// The cell `(i, j)` is the nearest neighbour cosine distance between the gallery of
/// `tracks[i]` and the feature of `detections[j]`. When the squared Mahalanobis distance
/// between the predicted state of the track and the detection box exceeds `gate`, the cell
/// is set to [`INFEASIBLE_COST`] whatever the appearance is. A track whose gating distance
/// cannot be computed gets the same value, the frame goes on.
///
pub fn gated_appearance_cost(
    metric: &NearestNeighborDistanceMetric,
    filter: &Universal2DBoxKalmanFilter,
    tracks: &[&Track],
    detections: &[&Detection],
    gate: f32,
) -> Result<Matrix<f32>> {
    let track_ids = tracks.iter().map(|t| t.get_track_id()).collect::<Vec<_>>();
    let features = detections.iter().map(|d| d.feature()).collect::<Vec<_>>();
    let mut cost = metric.cost_matrix(&track_ids, &features)?;

    for (row, track) in tracks.iter().enumerate() {
        for (col, detection) in detections.iter().enumerate() {
            match filter.distance(track.get_state(), &detection.xyah()) {
                Ok(gating_distance) if gating_distance <= gate => {}
                Ok(_) => cost[(row, col)] = INFEASIBLE_COST,
                Err(e) => {
                    warn!(
                        "Gating distance failed for track {}: {}",
                        track.get_track_id(),
                        e
                    );
                    cost[(row, col)] = INFEASIBLE_COST;
                }
            }
        }
    }

    trace!("Gated appearance cost: {:?}", &cost);
    Ok(cost)
}

/// IoU cost matrix, the cell `(i, j)` is `1 - IoU` between the predicted box of `tracks[i]`
/// and the box of `detections[j]`.
///
/// Tracks that were not updated in the previous frame, and tracks whose predicted box is
/// degenerate, are given [`INFEASIBLE_COST`] rows.
///
pub fn iou_cost(tracks: &[&Track], detections: &[&Detection]) -> Matrix<f32> {
    let mut cost = infeasible_matrix(tracks.len(), detections.len());

    for (row, track) in tracks.iter().enumerate() {
        if track.time_since_update() > 1 {
            continue;
        }

        let predicted = match BoundingBox::try_from(track.bbox()) {
            Ok(bbox) => bbox,
            Err(_) => continue,
        };

        for (col, detection) in detections.iter().enumerate() {
            cost[(row, col)] = 1.0 - BoundingBox::iou(&predicted, detection.bbox());
        }
    }

    trace!("IoU cost: {:?}", &cost);
    cost
}
