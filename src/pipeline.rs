use crate::trackers::deep_sort::options::{DeepSortOptions, ReportPolicy};
use crate::trackers::deep_sort::{DeepSort, Detection, FrameOutput, TrackReport};
use crate::utils::bbox::BoundingBox;
use crate::Errors::FrameOrder;
use anyhow::{Context, Result};
use log::{debug, info};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Confirmed track position in a frame
///
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    pub frame: u64,
    pub track_id: u64,
    pub bbox: BoundingBox,
}

impl TrackRecord {
    fn from_report(frame: u64, report: &TrackReport) -> Self {
        Self {
            frame,
            track_id: report.track_id,
            bbox: report.bbox,
        }
    }
}

/// Records of one sequence. Observations of tentative tracks wait in `pending` until the
/// track is confirmed or deleted.
///
#[derive(Debug, Default)]
struct Records {
    retroactive: bool,
    records: Vec<TrackRecord>,
    pending: HashMap<u64, Vec<TrackRecord>>,
    confirmed: HashSet<u64>,
}

impl Records {
    fn new(retroactive: bool) -> Self {
        Self {
            retroactive,
            ..Self::default()
        }
    }

    fn push(&mut self, frame: u64, out: &FrameOutput) {
        if self.retroactive {
            for r in &out.provisional {
                self.pending
                    .entry(r.track_id)
                    .or_default()
                    .push(TrackRecord::from_report(frame, r));
            }
        }

        for r in &out.reports {
            if self.confirmed.insert(r.track_id) {
                debug!("Track {} confirmed at frame {}", r.track_id, frame);
                if let Some(earlier) = self.pending.remove(&r.track_id) {
                    self.records.extend(earlier);
                }
            }
            self.records.push(TrackRecord::from_report(frame, r));
        }

        for track_id in &out.deleted {
            self.pending.remove(track_id);
        }
    }

    fn finish(mut self) -> Vec<TrackRecord> {
        self.records.sort_by_key(|r| (r.frame, r.track_id));
        self.records
    }
}

/// Detections of a single image
///
#[derive(Debug, Clone)]
pub struct Frame {
    index: u64,
    detections: Vec<Detection>,
}

impl Frame {
    pub fn new(index: u64, detections: Vec<Detection>) -> Self {
        Self { index, detections }
    }

    /// Image without detections, the tracks still age on it
    ///
    pub fn empty(index: u64) -> Self {
        Self::new(index, Vec::default())
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }
}

/// Flat detection record as produced by the detector for a whole dataset
///
#[derive(Debug, Clone)]
pub struct DetectionRow {
    pub seq_id: String,
    pub frame_index: u64,
    pub detection: Detection,
}

/// Ordered frames of one camera-trap sequence
///
#[derive(Debug, Clone)]
pub struct Sequence {
    id: String,
    frames: Vec<Frame>,
}

impl Sequence {
    pub fn new(id: &str, frames: Vec<Frame>) -> Self {
        Self {
            id: id.to_string(),
            frames,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Builds sequences from flat rows.
    ///
    /// Sequences keep the order in which their ids are first seen, frames are sorted by
    /// index and the rows of the same frame keep their input order.
    ///
    pub fn group<I>(rows: I) -> Vec<Sequence>
    where
        I: IntoIterator<Item = DetectionRow>,
    {
        let mut positions: HashMap<String, usize> = HashMap::default();
        let mut grouped: Vec<(String, BTreeMap<u64, Vec<Detection>>)> = Vec::default();

        for row in rows {
            let pos = *positions.entry(row.seq_id.clone()).or_insert_with(|| {
                grouped.push((row.seq_id.clone(), BTreeMap::default()));
                grouped.len() - 1
            });
            grouped[pos]
                .1
                .entry(row.frame_index)
                .or_default()
                .push(row.detection);
        }

        grouped
            .into_iter()
            .map(|(id, frames)| Sequence {
                id,
                frames: frames
                    .into_iter()
                    .map(|(index, detections)| Frame::new(index, detections))
                    .collect(),
            })
            .collect()
    }
}

/// Runs a fresh tracker over every sequence and collects the confirmed track positions
///
#[derive(Debug, Clone)]
pub struct SequencePipeline {
    opts: DeepSortOptions,
    threads: usize,
}

impl SequencePipeline {
    /// Creates the pipeline, the options are validated here
    ///
    pub fn new(opts: &DeepSortOptions) -> Result<Self> {
        opts.validate()?;
        Ok(Self {
            opts: opts.clone(),
            threads: num_cpus::get(),
        })
    }

    /// The number of threads used by [`run_all`](Self::run_all), `0` means the number of cpu
    /// cores.
    ///
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = n;
        self
    }

    pub fn options(&self) -> &DeepSortOptions {
        &self.opts
    }

    /// Tracks a single sequence.
    ///
    /// The records are ordered by frame and then by track id. Only the tracks that were
    /// confirmed at some point appear in the result.
    ///
    pub fn run(&self, sequence: &Sequence) -> Result<Vec<TrackRecord>> {
        info!(
            "Sequence {}: tracking {} frames",
            sequence.id(),
            sequence.frames().len()
        );

        let mut tracker = DeepSort::new(&self.opts)?;
        let mut records =
            Records::new(self.opts.get_report_policy() == ReportPolicy::Retroactive);
        let mut previous: Option<u64> = None;
        let mut rejected = 0;

        for frame in sequence.frames() {
            if let Some(previous) = previous {
                if frame.index() <= previous {
                    return Err(FrameOrder {
                        previous,
                        current: frame.index(),
                    })
                    .with_context(|| format!("Sequence {}", sequence.id()));
                }
            }
            previous = Some(frame.index());

            let out = tracker.step(frame.detections()).with_context(|| {
                format!("Sequence {}, frame {}", sequence.id(), frame.index())
            })?;
            rejected += out.rejected.len();
            records.push(frame.index(), &out);
        }

        let tracks = records.confirmed.len();
        let records = records.finish();

        info!(
            "Sequence {}: {} tracks, {} records, {} rejected detections",
            sequence.id(),
            tracks,
            records.len(),
            rejected
        );

        Ok(records)
    }

    /// Tracks independent sequences in parallel, the results keep the input order and a
    /// failed sequence does not affect the others.
    ///
    pub fn run_all(&self, sequences: &[Sequence]) -> Result<Vec<Result<Vec<TrackRecord>>>> {
        let threads = match self.threads {
            0 => num_cpus::get(),
            n => n,
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()?;

        Ok(pool.install(|| sequences.par_iter().map(|s| self.run(s)).collect()))
    }
}

#[cfg(test)]
mod tests {
    use crate::examples::synthetic_sequence;
    use crate::pipeline::{DetectionRow, Frame, Records, Sequence, SequencePipeline, TrackRecord};
    use crate::trackers::deep_sort::options::{DeepSortOptions, ReportPolicy};
    use crate::trackers::deep_sort::{DeepSort, Detection};
    use crate::utils::bbox::BoundingBox;
    use crate::{Errors, EstimateClose};

    fn detection(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection::new(BoundingBox::new(x, y, w, h), 0.9, &[0.6, 0.8, 0.0]).unwrap()
    }

    fn three_frames() -> Sequence {
        Sequence::new(
            "scenario",
            vec![
                Frame::new(0, vec![detection(10.0, 10.0, 20.0, 20.0)]),
                Frame::new(1, vec![detection(11.0, 11.0, 20.0, 20.0)]),
                Frame::empty(2),
            ],
        )
    }

    fn frames_of(records: &[TrackRecord]) -> Vec<(u64, u64)> {
        records.iter().map(|r| (r.frame, r.track_id)).collect()
    }

    #[test]
    fn end_to_end_retroactive() {
        let opts = DeepSortOptions::default()
            .confirmation_hits(2)
            .max_age(5);
        let records = SequencePipeline::new(&opts)
            .unwrap()
            .run(&three_frames())
            .unwrap();

        assert_eq!(frames_of(&records), vec![(0, 1), (1, 1), (2, 1)]);
        assert!(records[0]
            .bbox
            .almost_same(&BoundingBox::new(10.0, 10.0, 20.0, 20.0), 0.001));
        // predicted box keeps moving with the estimated velocity
        assert!(records[2].bbox.x() > records[0].bbox.x());
    }

    #[test]
    fn end_to_end_from_confirmation() {
        let opts = DeepSortOptions::default()
            .confirmation_hits(2)
            .max_age(5)
            .report_policy(ReportPolicy::FromConfirmation);
        let records = SequencePipeline::new(&opts)
            .unwrap()
            .run(&three_frames())
            .unwrap();

        assert_eq!(frames_of(&records), vec![(1, 1), (2, 1)]);
    }

    #[test]
    fn tentative_tracks_excluded() {
        let sequence = Sequence::new(
            "noise",
            vec![
                Frame::new(0, vec![detection(10.0, 10.0, 20.0, 20.0)]),
                Frame::new(1, vec![detection(500.0, 500.0, 20.0, 20.0)]),
                Frame::empty(2),
            ],
        );
        let records = SequencePipeline::new(&DeepSortOptions::default())
            .unwrap()
            .run(&sequence)
            .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn pending_dropped_with_deleted_tracks() {
        let opts = DeepSortOptions::default().confirmation_hits(3);
        let mut tracker = DeepSort::new(&opts).unwrap();
        let mut records = Records::new(true);

        let out = tracker.step(&[detection(10.0, 10.0, 20.0, 20.0)]).unwrap();
        records.push(0, &out);
        assert_eq!(records.pending.get(&1).map(|p| p.len()), Some(1));

        let out = tracker.step(&[]).unwrap();
        records.push(1, &out);
        assert!(records.pending.is_empty());
        assert!(records.finish().is_empty());
    }

    #[test]
    fn oversized_box_does_not_abort() {
        let sequence = Sequence::new(
            "huge",
            vec![
                Frame::new(0, vec![detection(10.0, 10.0, 20.0, 1e25)]),
                Frame::new(1, vec![detection(10.0, 10.0, 20.0, 20.0)]),
            ],
        );
        let opts = DeepSortOptions::default().confirmation_hits(1);
        let records = SequencePipeline::new(&opts)
            .unwrap()
            .run(&sequence)
            .unwrap();
        assert_eq!(frames_of(&records), vec![(1, 1)]);
    }

    #[test]
    fn idempotent_rerun() {
        let _ = env_logger::try_init();
        let sequence = synthetic_sequence(42, "synthetic", 4, 20, 32).unwrap();
        let pipeline = SequencePipeline::new(&DeepSortOptions::default()).unwrap();
        let first = pipeline.run(&sequence).unwrap();
        let second = pipeline.run(&sequence).unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);

        let ids = first
            .iter()
            .map(|r| r.track_id)
            .collect::<std::collections::BTreeSet<_>>();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn frame_order_violation() {
        let sequence = Sequence::new(
            "broken",
            vec![
                Frame::new(3, vec![detection(10.0, 10.0, 20.0, 20.0)]),
                Frame::new(3, vec![detection(10.0, 10.0, 20.0, 20.0)]),
            ],
        );
        let err = SequencePipeline::new(&DeepSortOptions::default())
            .unwrap()
            .run(&sequence)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<Errors>(),
            Some(&Errors::FrameOrder {
                previous: 3,
                current: 3
            })
        );
    }

    #[test]
    fn grouping() {
        let row = |seq: &str, frame: u64, x: f32| DetectionRow {
            seq_id: seq.to_string(),
            frame_index: frame,
            detection: detection(x, 0.0, 10.0, 10.0),
        };
        let sequences = Sequence::group(vec![
            row("b", 2, 1.0),
            row("a", 0, 2.0),
            row("b", 0, 3.0),
            row("b", 2, 4.0),
        ]);

        assert_eq!(sequences.len(), 2);
        assert_eq!(sequences[0].id(), "b");
        assert_eq!(sequences[1].id(), "a");

        let b = sequences[0].frames();
        assert_eq!(b.iter().map(|f| f.index()).collect::<Vec<_>>(), vec![0, 2]);
        let xs = b[1]
            .detections()
            .iter()
            .map(|d| d.bbox().x())
            .collect::<Vec<_>>();
        assert_eq!(xs, vec![1.0, 4.0]);
    }

    #[test]
    fn run_all_keeps_order() {
        let sequences = vec![
            synthetic_sequence(1, "one", 2, 10, 16).unwrap(),
            Sequence::new(
                "broken",
                vec![Frame::empty(1), Frame::empty(0)],
            ),
            synthetic_sequence(2, "three", 3, 10, 16).unwrap(),
        ];
        let pipeline = SequencePipeline::new(&DeepSortOptions::default())
            .unwrap()
            .threads(2);
        let results = pipeline.run_all(&sequences).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &pipeline.run(&sequences[0]).unwrap());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap(), &pipeline.run(&sequences[2]).unwrap());
    }

    #[test]
    fn invalid_configuration() {
        assert!(SequencePipeline::new(&DeepSortOptions::default().iou_min(2.0)).is_err());
    }
}
