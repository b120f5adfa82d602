use crate::pipeline::{Frame, Sequence, SequencePipeline};
use crate::trackers::deep_sort::options::{DeepSortOptions, ReportPolicy};
use crate::trackers::deep_sort::{DeepSort, Detection};
use crate::utils::bbox::BoundingBox;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

fn value_error(e: anyhow::Error) -> PyErr {
    PyValueError::new_err(format!("{e:#}"))
}

#[pyclass(name = "BoundingBox")]
#[derive(Debug, Clone)]
pub struct PyBoundingBox(BoundingBox);

#[pymethods]
impl PyBoundingBox {
    #[new]
    fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self(BoundingBox::new(left, top, width, height))
    }

    #[getter]
    fn left(&self) -> f32 {
        self.0.x()
    }

    #[getter]
    fn top(&self) -> f32 {
        self.0.y()
    }

    #[getter]
    fn width(&self) -> f32 {
        self.0.width()
    }

    #[getter]
    fn height(&self) -> f32 {
        self.0.height()
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self.0)
    }
}

#[pyclass(name = "DeepSortOptions")]
#[derive(Debug, Clone)]
pub struct PyDeepSortOptions(DeepSortOptions);

#[pymethods]
impl PyDeepSortOptions {
    #[new]
    #[pyo3(signature = (
        appearance_distance_threshold = 0.2,
        gallery_budget = None,
        max_age = 30,
        confirmation_hits = 3,
        max_age_unconfirmed = 0,
        iou_min = 0.3,
        motion_gate_threshold = None,
        embedding_dim = None,
        retroactive = true
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        appearance_distance_threshold: f32,
        gallery_budget: Option<usize>,
        max_age: usize,
        confirmation_hits: usize,
        max_age_unconfirmed: usize,
        iou_min: f32,
        motion_gate_threshold: Option<f32>,
        embedding_dim: Option<usize>,
        retroactive: bool,
    ) -> PyResult<Self> {
        let mut opts = DeepSortOptions::default()
            .appearance_distance_threshold(appearance_distance_threshold)
            .gallery_budget(gallery_budget)
            .max_age(max_age)
            .confirmation_hits(confirmation_hits)
            .max_age_unconfirmed(max_age_unconfirmed)
            .iou_min(iou_min)
            .embedding_dim(embedding_dim)
            .report_policy(if retroactive {
                ReportPolicy::Retroactive
            } else {
                ReportPolicy::FromConfirmation
            });

        if let Some(gate) = motion_gate_threshold {
            opts = opts.motion_gate_threshold(gate);
        }

        opts.validate().map_err(value_error)?;
        Ok(Self(opts))
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self.0)
    }
}

#[pyclass(name = "Detection")]
#[derive(Debug, Clone)]
pub struct PyDetection(Detection);

#[pymethods]
impl PyDetection {
    #[new]
    fn new(bbox: PyBoundingBox, confidence: f32, embedding: Vec<f32>) -> PyResult<Self> {
        Detection::new(bbox.0, confidence, &embedding)
            .map(Self)
            .map_err(value_error)
    }

    #[getter]
    fn bbox(&self) -> PyBoundingBox {
        PyBoundingBox(*self.0.bbox())
    }

    #[getter]
    fn confidence(&self) -> f32 {
        self.0.confidence()
    }
}

/// Frame by frame tracker, `step` returns `(track_id, left, top, width, height)` of the
/// reported tracks
///
#[pyclass(name = "DeepSort")]
pub struct PyDeepSort(DeepSort);

#[pymethods]
impl PyDeepSort {
    #[new]
    fn new(opts: PyDeepSortOptions) -> PyResult<Self> {
        DeepSort::new(&opts.0).map(Self).map_err(value_error)
    }

    fn step(&mut self, detections: Vec<PyDetection>) -> PyResult<Vec<(u64, f32, f32, f32, f32)>> {
        let detections = detections.into_iter().map(|d| d.0).collect::<Vec<_>>();
        let out = self.0.step(&detections).map_err(value_error)?;
        Ok(out
            .reports
            .iter()
            .map(|r| {
                (
                    r.track_id,
                    r.bbox.x(),
                    r.bbox.y(),
                    r.bbox.width(),
                    r.bbox.height(),
                )
            })
            .collect())
    }
}

/// Tracks the frames of a single sequence, the frame index is the position in `frames`
///
#[pyfunction]
#[pyo3(signature = (frames, options))]
fn track_sequence(
    py: Python<'_>,
    frames: Vec<Vec<PyDetection>>,
    options: PyDeepSortOptions,
) -> PyResult<Vec<(u64, u64, f32, f32, f32, f32)>> {
    let sequence = Sequence::new(
        "python",
        frames
            .into_iter()
            .enumerate()
            .map(|(i, f)| Frame::new(i as u64, f.into_iter().map(|d| d.0).collect()))
            .collect(),
    );
    let pipeline = SequencePipeline::new(&options.0).map_err(value_error)?;
    let records = py
        .allow_threads(|| pipeline.run(&sequence))
        .map_err(value_error)?;

    Ok(records
        .into_iter()
        .map(|r| {
            (
                r.frame,
                r.track_id,
                r.bbox.x(),
                r.bbox.y(),
                r.bbox.width(),
                r.bbox.height(),
            )
        })
        .collect())
}

#[pymodule]
#[pyo3(name = "wildtrack")]
fn wildtrack(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();

    m.add_class::<PyBoundingBox>()?;
    m.add_class::<PyDeepSortOptions>()?;
    m.add_class::<PyDetection>()?;
    m.add_class::<PyDeepSort>()?;
    m.add_function(wrap_pyfunction!(track_sequence, m)?)?;
    Ok(())
}
