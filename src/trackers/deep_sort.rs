use crate::distance::squared_norm;
use crate::track::utils::FromVec;
use crate::track::{Feature, Track, TrackState};
use crate::trackers::deep_sort::matching::Associator;
use crate::trackers::deep_sort::metric::NearestNeighborDistanceMetric;
use crate::trackers::deep_sort::options::DeepSortOptions;
use crate::utils::bbox::{BoundingBox, Universal2DBox};
use crate::utils::kalman::kalman_2d_box::Universal2DBoxKalmanFilter;
use crate::Errors;
use crate::Errors::InvalidDetection;
use anyhow::Result;
use log::{debug, warn};
use std::collections::HashSet;

/// Cost matrices with motion gating
pub mod cost;

/// Matching cascade and IoU fallback
pub mod matching;

/// Per track appearance galleries
pub mod metric;

/// Tracker configuration
pub mod options;

/// Detection of a single object in a frame: the box, the detector confidence and the
/// appearance embedding.
///
#[derive(Debug, Clone)]
pub struct Detection {
    bbox: BoundingBox,
    confidence: f32,
    feature: Feature,
    feature_dim: usize,
}

impl Detection {
    /// Creates the detection, the box and the embedding are validated
    ///
    /// # Parameters
    /// * `bbox` - box in `(left, top, width, height)` format, the sizes must be positive;
    /// * `confidence` - detector confidence, kept as is;
    /// * `embedding` - appearance feature, must be non-empty, finite and have a non-zero norm.
    ///
    pub fn new(bbox: BoundingBox, confidence: f32, embedding: &[f32]) -> Result<Self> {
        let bbox = BoundingBox::checked(bbox.x(), bbox.y(), bbox.width(), bbox.height())?;

        if embedding.is_empty() {
            return Err(InvalidDetection("embedding is empty".into()).into());
        }

        if !embedding.iter().all(|v| v.is_finite()) {
            return Err(InvalidDetection("embedding contains non-finite values".into()).into());
        }

        let feature = Feature::from_vec(embedding);
        if squared_norm(&feature) <= 0.0 {
            return Err(InvalidDetection("embedding has zero norm".into()).into());
        }

        Ok(Self {
            bbox,
            confidence,
            feature,
            feature_dim: embedding.len(),
        })
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn feature(&self) -> &Feature {
        &self.feature
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// The box in kalman measurement space
    ///
    pub fn xyah(&self) -> Universal2DBox {
        self.bbox.as_xyah()
    }
}

/// Track state reported for a frame
///
#[derive(Debug, Clone, PartialEq)]
pub struct TrackReport {
    pub track_id: u64,
    pub bbox: BoundingBox,
    pub state: TrackState,
    pub time_since_update: usize,
}

/// Result of a single tracker step
///
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    /// Confirmed tracks updated in this frame or in the previous one
    pub reports: Vec<TrackReport>,
    /// Tentative tracks that received an observation in this frame
    pub provisional: Vec<TrackReport>,
    /// Detections skipped because they do not fit the tracker
    pub rejected: Vec<Errors>,
    /// Tracks removed from the live set in this frame
    pub deleted: Vec<u64>,
}

/// DeepSORT tracker for a single sequence
///
pub struct DeepSort {
    opts: DeepSortOptions,
    filter: Universal2DBoxKalmanFilter,
    metric: NearestNeighborDistanceMetric,
    tracks: Vec<Track>,
    track_id: u64,
    embedding_dim: Option<usize>,
}

impl DeepSort {
    /// Creates new tracker
    ///
    /// # Parameters
    /// * `opts` - tracker options, rejected with `Errors::InvalidConfiguration` when out of range.
    ///
    pub fn new(opts: &DeepSortOptions) -> Result<Self> {
        opts.validate()?;
        Ok(Self {
            opts: opts.clone(),
            filter: Universal2DBoxKalmanFilter::new(
                opts.get_kalman_position_weight(),
                opts.get_kalman_velocity_weight(),
            ),
            metric: NearestNeighborDistanceMetric::new(
                opts.get_appearance_distance_threshold(),
                opts.get_gallery_budget(),
            ),
            tracks: Vec::default(),
            track_id: 0,
            embedding_dim: opts.get_embedding_dim(),
        })
    }

    pub fn options(&self) -> &DeepSortOptions {
        &self.opts
    }

    /// Live tracks ordered by id
    ///
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn gallery_len(&self, track_id: u64) -> Option<usize> {
        self.metric.gallery(track_id).map(|g| g.len())
    }

    /// The embedding dimension the tracker accepts, `None` until the first detection when it
    /// is not configured
    ///
    pub fn embedding_dim(&self) -> Option<usize> {
        self.embedding_dim
    }

    fn gen_track_id(&mut self) -> u64 {
        self.track_id += 1;
        self.track_id
    }

    fn accept(&mut self, detection: &Detection) -> Result<(), Errors> {
        let state = self.filter.initiate(&detection.xyah());
        if !self.filter.project(&self.filter.predict(&state)).is_finite() {
            return Err(InvalidDetection(format!(
                "box {:?} is out of the kalman filter range",
                detection.bbox()
            )));
        }

        let dim = *self.embedding_dim.get_or_insert(detection.feature_dim());
        if detection.feature_dim() != dim {
            return Err(InvalidDetection(format!(
                "embedding dimension {} does not match the expected {}",
                detection.feature_dim(),
                dim
            )));
        }
        Ok(())
    }

    /// Processes the detections of the next frame
    ///
    /// # Parameters
    /// * `detections` - detections of the frame, may be empty.
    ///
    pub fn step(&mut self, detections: &[Detection]) -> Result<FrameOutput> {
        let mut rejected = Vec::default();
        let mut accepted = Vec::with_capacity(detections.len());
        for d in detections {
            match self.accept(d) {
                Ok(()) => accepted.push(d),
                Err(e) => {
                    warn!("Detection rejected: {}", e);
                    rejected.push(e);
                }
            }
        }

        for t in self.tracks.iter_mut() {
            t.predict(&self.filter);
        }

        let matches =
            Associator::new(&self.metric, &self.filter, &self.opts).associate(&self.tracks, &accepted)?;

        for (t, d) in &matches.matches {
            let track = &mut self.tracks[*t];
            track.update(&self.filter, &accepted[*d].xyah())?;
            self.metric
                .partial_fit(track.get_track_id(), accepted[*d].feature().clone());
        }

        for t in &matches.unmatched_tracks {
            self.tracks[*t].mark_missed();
        }

        for d in &matches.unmatched_detections {
            let track_id = self.gen_track_id();
            let detection = accepted[*d];
            self.tracks.push(Track::new(
                track_id,
                &self.filter,
                &detection.xyah(),
                self.opts.lifecycle(),
            ));
            self.metric.partial_fit(track_id, detection.feature().clone());
        }

        let deleted = self
            .tracks
            .iter()
            .filter(|t| t.is_deleted())
            .map(|t| t.get_track_id())
            .collect::<Vec<_>>();
        self.tracks.retain(|t| !t.is_deleted());
        let active = self
            .tracks
            .iter()
            .map(|t| t.get_track_id())
            .collect::<HashSet<_>>();
        self.metric.retain(|track_id| active.contains(&track_id));

        debug!(
            "Step: {} detections, {} rejected, {} matched, {} new tracks, {} deleted, {} live",
            detections.len(),
            rejected.len(),
            matches.matches.len(),
            matches.unmatched_detections.len(),
            deleted.len(),
            self.tracks.len()
        );

        let mut output = FrameOutput {
            rejected,
            deleted,
            ..FrameOutput::default()
        };

        for t in &self.tracks {
            let target = match t.get_track_state() {
                TrackState::Confirmed if t.time_since_update() <= 1 => &mut output.reports,
                TrackState::Tentative if t.time_since_update() == 0 => &mut output.provisional,
                _ => continue,
            };

            match t.ltwh() {
                Ok(bbox) => target.push(TrackReport {
                    track_id: t.get_track_id(),
                    bbox,
                    state: t.get_track_state(),
                    time_since_update: t.time_since_update(),
                }),
                Err(e) => warn!("Track is not reported: {:#}", e),
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use crate::examples::{BoxGen2, FeatGen};
    use crate::track::TrackState;
    use crate::trackers::deep_sort::options::DeepSortOptions;
    use crate::trackers::deep_sort::{DeepSort, Detection};
    use crate::utils::bbox::BoundingBox;
    use crate::{Errors, EstimateClose};

    fn detection(x: f32, y: f32, embedding: &[f32]) -> Detection {
        Detection::new(BoundingBox::new(x, y, 20.0, 40.0), 0.9, embedding).unwrap()
    }

    fn invalid(res: anyhow::Result<Detection>) -> bool {
        matches!(
            res.unwrap_err().downcast_ref::<Errors>(),
            Some(Errors::InvalidDetection(_))
        )
    }

    #[test]
    fn detection_validation() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(invalid(Detection::new(bbox, 0.5, &[])));
        assert!(invalid(Detection::new(bbox, 0.5, &[0.0, 0.0])));
        assert!(invalid(Detection::new(bbox, 0.5, &[1.0, f32::NAN])));
        assert!(invalid(Detection::new(
            BoundingBox::new(0.0, 0.0, -1.0, 10.0),
            0.5,
            &[1.0]
        )));
        assert!(invalid(Detection::new(
            BoundingBox::new(f32::INFINITY, 0.0, 1.0, 10.0),
            0.5,
            &[1.0]
        )));

        let d = Detection::new(bbox, -3.0, &[1.0; 10]).unwrap();
        assert_eq!(d.feature_dim(), 10);
        assert_eq!(d.feature().len(), 2);
        assert_eq!(d.confidence(), -3.0);
    }

    #[test]
    fn invalid_configuration() {
        let res = DeepSort::new(&DeepSortOptions::default().max_age(0));
        assert!(matches!(
            res.err().unwrap().downcast_ref::<Errors>(),
            Some(Errors::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn single_track_persistence() {
        let mut tracker = DeepSort::new(&DeepSortOptions::default()).unwrap();
        let mut gen = BoxGen2::new(7, 100.0, 100.0, 30.0, 60.0, 1.0);
        let embedding = [0.3, 0.1, 0.8, 0.5];

        let mut ids = Vec::default();
        for i in 0..10 {
            let out = tracker
                .step(&[Detection::new(gen.next().unwrap(), 0.9, &embedding).unwrap()])
                .unwrap();
            if i >= 2 {
                assert_eq!(out.reports.len(), 1);
                ids.push(out.reports[0].track_id);
            } else {
                assert!(out.reports.is_empty());
                assert_eq!(out.provisional.len(), 1);
            }
        }
        assert!(ids.iter().all(|id| *id == 1));
        assert_eq!(tracker.tracks().len(), 1);
        assert_eq!(tracker.tracks()[0].hits(), 10);
    }

    #[test]
    fn two_tracks_keep_identities() {
        let mut tracker = DeepSort::new(&DeepSortOptions::default()).unwrap();
        let mut left = BoxGen2::new(1, 100.0, 100.0, 30.0, 60.0, 1.0);
        let mut right = BoxGen2::new(2, 400.0, 100.0, 30.0, 60.0, 1.0);
        let mut feats = FeatGen::new(3, 16, 0.05);
        let (a, b) = (feats.base(), feats.base());

        let mut last = Vec::default();
        for _ in 0..8 {
            let out = tracker
                .step(&[
                    Detection::new(right.next().unwrap(), 0.9, &feats.jitter(&b)).unwrap(),
                    Detection::new(left.next().unwrap(), 0.9, &feats.jitter(&a)).unwrap(),
                ])
                .unwrap();
            last = out.reports;
        }

        let ids = last.iter().map(|r| r.track_id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2]);
        assert!(last[0].bbox.x() > 390.0);
        assert!(last[1].bbox.x() < 150.0);
    }

    #[test]
    fn deletion_after_max_age() {
        let opts = DeepSortOptions::default().max_age(3).confirmation_hits(1);
        let mut tracker = DeepSort::new(&opts).unwrap();
        let out = tracker.step(&[detection(10.0, 10.0, &[1.0, 0.0])]).unwrap();
        assert_eq!(out.reports.len(), 1);

        // one stale frame is still reported
        let out = tracker.step(&[]).unwrap();
        assert_eq!(out.reports.len(), 1);
        assert_eq!(out.reports[0].time_since_update, 1);

        for _ in 0..2 {
            let out = tracker.step(&[]).unwrap();
            assert!(out.reports.is_empty());
            assert_eq!(tracker.tracks().len(), 1);
        }

        tracker.step(&[]).unwrap();
        assert!(tracker.tracks().is_empty());
        assert_eq!(tracker.gallery_len(1), None);

        // the id is not reused
        let out = tracker.step(&[detection(10.0, 10.0, &[1.0, 0.0])]).unwrap();
        assert_eq!(out.reports[0].track_id, 2);
    }

    #[test]
    fn reidentification_after_gap() {
        let opts = DeepSortOptions::default().max_age(5).confirmation_hits(2);
        let mut tracker = DeepSort::new(&opts).unwrap();
        for _ in 0..3 {
            tracker.step(&[detection(100.0, 100.0, &[1.0, 0.0])]).unwrap();
        }
        for _ in 0..3 {
            tracker.step(&[]).unwrap();
        }
        let out = tracker
            .step(&[detection(101.0, 100.0, &[1.0, 0.0])])
            .unwrap();
        assert_eq!(out.reports.len(), 1);
        assert_eq!(out.reports[0].track_id, 1);
        assert_eq!(out.reports[0].time_since_update, 0);
    }

    #[test]
    fn gallery_bounded() {
        let opts = DeepSortOptions::default().gallery_budget(Some(3));
        let mut tracker = DeepSort::new(&opts).unwrap();
        for _ in 0..6 {
            tracker.step(&[detection(50.0, 50.0, &[0.5, 0.5])]).unwrap();
            assert!(tracker.gallery_len(1).unwrap() <= 3);
        }
        assert_eq!(tracker.gallery_len(1), Some(3));
    }

    #[test]
    fn tentative_rejection() {
        let opts = DeepSortOptions::default().confirmation_hits(3);
        let mut tracker = DeepSort::new(&opts).unwrap();
        let out = tracker.step(&[detection(50.0, 50.0, &[1.0])]).unwrap();
        assert_eq!(out.provisional.len(), 1);
        assert_eq!(out.provisional[0].state, TrackState::Tentative);
        assert!(out.reports.is_empty());

        let out = tracker.step(&[]).unwrap();
        assert!(out.reports.is_empty());
        assert!(out.provisional.is_empty());
        assert!(tracker.tracks().is_empty());
    }

    #[test]
    fn deleted_ids_reported() {
        let mut tracker = DeepSort::new(&DeepSortOptions::default()).unwrap();
        let out = tracker.step(&[detection(50.0, 50.0, &[1.0])]).unwrap();
        assert!(out.deleted.is_empty());

        let out = tracker.step(&[detection(500.0, 500.0, &[1.0])]).unwrap();
        assert_eq!(out.deleted, vec![1]);
        assert_eq!(out.provisional[0].track_id, 2);

        let out = tracker.step(&[]).unwrap();
        assert_eq!(out.deleted, vec![2]);
        let out = tracker.step(&[]).unwrap();
        assert!(out.deleted.is_empty());
    }

    #[test]
    fn confirmation_requires_consecutive_hits() {
        let opts = DeepSortOptions::default()
            .confirmation_hits(3)
            .max_age_unconfirmed(2);
        let mut tracker = DeepSort::new(&opts).unwrap();

        tracker.step(&[detection(50.0, 50.0, &[1.0, 0.0])]).unwrap();
        tracker.step(&[]).unwrap();
        for _ in 0..2 {
            let out = tracker.step(&[detection(50.0, 50.0, &[1.0, 0.0])]).unwrap();
            assert!(out.reports.is_empty());
            assert_eq!(out.provisional.len(), 1);
            assert_eq!(out.provisional[0].track_id, 1);
        }

        let out = tracker.step(&[detection(50.0, 50.0, &[1.0, 0.0])]).unwrap();
        assert_eq!(out.reports.len(), 1);
        assert_eq!(out.reports[0].track_id, 1);
        assert_eq!(tracker.tracks()[0].hits(), 4);
    }

    #[test]
    fn oversized_box_rejected() {
        let mut tracker = DeepSort::new(&DeepSortOptions::default()).unwrap();
        let huge =
            Detection::new(BoundingBox::new(0.0, 0.0, 10.0, 1e25), 0.9, &[1.0, 0.0]).unwrap();
        let out = tracker
            .step(&[huge, detection(100.0, 100.0, &[1.0, 0.0])])
            .unwrap();
        assert_eq!(out.rejected.len(), 1);
        assert!(matches!(out.rejected[0], Errors::InvalidDetection(_)));
        assert_eq!(out.provisional.len(), 1);
        assert_eq!(tracker.tracks().len(), 1);

        let out = tracker
            .step(&[detection(101.0, 100.0, &[1.0, 0.0])])
            .unwrap();
        assert!(out.rejected.is_empty());
        assert_eq!(out.provisional[0].track_id, 1);
    }

    #[test]
    fn empty_frames() {
        let mut tracker = DeepSort::new(&DeepSortOptions::default()).unwrap();
        for _ in 0..5 {
            let out = tracker.step(&[]).unwrap();
            assert!(out.reports.is_empty());
            assert!(out.rejected.is_empty());
        }
        assert!(tracker.tracks().is_empty());
    }

    #[test]
    fn embedding_dim_mismatch_rejected() {
        let mut tracker = DeepSort::new(&DeepSortOptions::default()).unwrap();
        let out = tracker
            .step(&[
                detection(10.0, 10.0, &[1.0, 0.0, 0.0]),
                detection(200.0, 10.0, &[1.0, 0.0]),
            ])
            .unwrap();
        assert_eq!(tracker.embedding_dim(), Some(3));
        assert_eq!(out.rejected.len(), 1);
        assert!(matches!(out.rejected[0], Errors::InvalidDetection(_)));
        assert_eq!(out.provisional.len(), 1);
        assert_eq!(tracker.tracks().len(), 1);

        let mut tracker =
            DeepSort::new(&DeepSortOptions::default().embedding_dim(Some(2))).unwrap();
        let out = tracker
            .step(&[detection(10.0, 10.0, &[1.0, 0.0, 0.0])])
            .unwrap();
        assert_eq!(out.rejected.len(), 1);
        assert!(tracker.tracks().is_empty());
    }

    #[test]
    fn report_box_follows_detection() {
        let opts = DeepSortOptions::default().confirmation_hits(1);
        let mut tracker = DeepSort::new(&opts).unwrap();
        let d = detection(10.0, 20.0, &[1.0]);
        let out = tracker.step(&[d.clone()]).unwrap();
        assert!(out.reports[0].bbox.almost_same(d.bbox(), 0.001));
    }
}
