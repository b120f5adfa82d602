use crate::distance::cosine_distance;
use crate::track::Feature;
use std::collections::VecDeque;

/// Bounded history of the appearance features observed for a track.
///
/// The newest features are kept, the oldest ones are evicted first once the budget is
/// exceeded. Without a budget the gallery grows with every observation.
///
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    features: VecDeque<Feature>,
    budget: Option<usize>,
}

impl Gallery {
    pub fn new(budget: Option<usize>) -> Self {
        Self {
            features: VecDeque::default(),
            budget,
        }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push_back(feature);
        if let Some(budget) = self.budget {
            while self.features.len() > budget {
                self.features.pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Features from the oldest to the newest
    ///
    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Nearest neighbour cosine distance between the query and the gallery,
    /// `None` for an empty gallery
    ///
    pub fn distance(&self, query: &Feature) -> Option<f32> {
        self.features
            .iter()
            .map(|f| cosine_distance(f, query))
            .min_by(|l, r| l.total_cmp(r))
    }
}
