use crate::pipeline::{Frame, Sequence};
use crate::trackers::deep_sort::Detection;
use crate::utils::bbox::BoundingBox;
use anyhow::Result;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Box that drifts randomly from frame to frame. The generator is seeded, so the produced
/// boxes are the same for every run.
///
pub struct BoxGen2 {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    gen: StdRng,
    dist_pos: Uniform<f32>,
    dist_box: Option<Uniform<f32>>,
}

impl BoxGen2 {
    pub fn new(seed: u64, x: f32, y: f32, width: f32, height: f32, pos_drift: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            gen: StdRng::seed_from_u64(seed),
            dist_pos: Uniform::new_inclusive(-pos_drift, pos_drift),
            dist_box: None,
        }
    }

    /// Lets the box size drift too
    ///
    pub fn box_drift(mut self, drift: f32) -> Self {
        self.dist_box = Some(Uniform::new_inclusive(-drift, drift));
        self
    }
}

impl Iterator for BoxGen2 {
    type Item = BoundingBox;

    fn next(&mut self) -> Option<Self::Item> {
        self.x += self.gen.sample(self.dist_pos);
        self.y += self.gen.sample(self.dist_pos);

        if let Some(dist) = self.dist_box {
            self.width = (self.width + self.gen.sample(dist)).max(1.0);
            self.height = (self.height + self.gen.sample(dist)).max(1.0);
        }

        Some(BoundingBox::new(self.x, self.y, self.width, self.height))
    }
}

/// Appearance embeddings: random base vectors and their noisy observations
///
pub struct FeatGen {
    len: usize,
    gen: StdRng,
    dist: Uniform<f32>,
}

impl FeatGen {
    pub fn new(seed: u64, len: usize, drift: f32) -> Self {
        Self {
            len,
            gen: StdRng::seed_from_u64(seed),
            dist: Uniform::new_inclusive(-drift, drift),
        }
    }

    /// New random embedding with components in `[-1.0:1.0]`
    ///
    pub fn base(&mut self) -> Vec<f32> {
        let dist = Uniform::new_inclusive(-1.0, 1.0);
        (0..self.len).map(|_| self.gen.sample(dist)).collect()
    }

    /// The embedding with every component shifted by the drift noise
    ///
    pub fn jitter(&mut self, base: &[f32]) -> Vec<f32> {
        base.iter().map(|v| v + self.gen.sample(self.dist)).collect()
    }
}

/// Sequence of `frames` frames where `objects` targets walk side by side, each target keeps
/// its own embedding.
///
pub fn synthetic_sequence(
    seed: u64,
    id: &str,
    objects: usize,
    frames: usize,
    embedding_dim: usize,
) -> Result<Sequence> {
    let mut feats = FeatGen::new(seed, embedding_dim, 0.05);
    let mut targets = (0..objects)
        .map(|i| {
            let boxes = BoxGen2::new(
                seed + i as u64 + 1,
                100.0 + 200.0 * i as f32,
                100.0,
                40.0,
                80.0,
                2.0,
            );
            (boxes, feats.base())
        })
        .collect::<Vec<_>>();

    let mut res = Vec::with_capacity(frames);
    for index in 0..frames {
        let mut detections = Vec::with_capacity(objects);
        for (boxes, base) in targets.iter_mut() {
            let bbox = boxes.next().unwrap_or_default();
            detections.push(Detection::new(bbox, 0.9, &feats.jitter(base))?);
        }
        res.push(Frame::new(index as u64, detections));
    }

    Ok(Sequence::new(id, res))
}
