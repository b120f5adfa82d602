use crate::track::Lifecycle;
use crate::utils::kalman::DEFAULT_MOTION_GATE;
use crate::Errors::InvalidConfiguration;
use anyhow::Result;

/// Which frames of a confirmed track are reported by the sequence pipeline
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportPolicy {
    /// Frames observed while the track was still tentative are reported once it confirms
    #[default]
    Retroactive,
    /// Only frames at or after the confirmation are reported
    FromConfirmation,
}

/// Class that is used to configure the DeepSORT tracker
///
/// The values are validated when the tracker is created, not in the setters.
///
#[derive(Debug, Clone)]
pub struct DeepSortOptions {
    appearance_distance_threshold: f32,
    gallery_budget: Option<usize>,
    max_age: usize,
    confirmation_hits: usize,
    max_age_unconfirmed: usize,
    iou_min: f32,
    motion_gate_threshold: f32,
    kalman_position_weight: f32,
    kalman_velocity_weight: f32,
    embedding_dim: Option<usize>,
    report_policy: ReportPolicy,
}

impl Default for DeepSortOptions {
    fn default() -> Self {
        let lifecycle = Lifecycle::default();
        Self {
            appearance_distance_threshold: 0.2,
            gallery_budget: None,
            max_age: lifecycle.max_age,
            confirmation_hits: lifecycle.confirmation_hits,
            max_age_unconfirmed: lifecycle.max_age_unconfirmed,
            iou_min: 0.3,
            motion_gate_threshold: DEFAULT_MOTION_GATE,
            kalman_position_weight: 1.0 / 20.0,
            kalman_velocity_weight: 1.0 / 160.0,
            embedding_dim: None,
            report_policy: ReportPolicy::default(),
        }
    }
}

impl DeepSortOptions {
    /// The maximal cosine distance between a detection and the nearest feature of the track
    /// gallery that still allows the match. Must lay within `[0.0:2.0]`.
    ///
    pub fn appearance_distance_threshold(mut self, threshold: f32) -> Self {
        self.appearance_distance_threshold = threshold;
        self
    }

    /// The maximum number of appearance features kept per track. The oldest ones are evicted
    /// first. `None` keeps all of them.
    ///
    pub fn gallery_budget(mut self, budget: Option<usize>) -> Self {
        self.gallery_budget = budget;
        self
    }

    /// The number of consecutive frames a confirmed track may stay unmatched before it is
    /// deleted.
    ///
    pub fn max_age(mut self, n: usize) -> Self {
        self.max_age = n;
        self
    }

    /// The number of matches required to turn a tentative track into a confirmed one.
    ///
    pub fn confirmation_hits(mut self, n: usize) -> Self {
        self.confirmation_hits = n;
        self
    }

    /// The number of consecutive frames a tentative track may stay unmatched. The default `0`
    /// deletes a tentative track on its first miss.
    ///
    pub fn max_age_unconfirmed(mut self, n: usize) -> Self {
        self.max_age_unconfirmed = n;
        self
    }

    /// The minimal IoU between the predicted box and the detection in the IoU fallback stage.
    ///
    pub fn iou_min(mut self, iou: f32) -> Self {
        self.iou_min = iou;
        self
    }

    /// Squared Mahalanobis distance above which a detection is out of reach for a track.
    /// The default is the 0.95 chi-square quantile for 4 degrees of freedom.
    ///
    pub fn motion_gate_threshold(mut self, threshold: f32) -> Self {
        self.motion_gate_threshold = threshold;
        self
    }

    pub fn kalman_position_weight(mut self, weight: f32) -> Self {
        self.kalman_position_weight = weight;
        self
    }

    pub fn kalman_velocity_weight(mut self, weight: f32) -> Self {
        self.kalman_velocity_weight = weight;
        self
    }

    /// The expected embedding dimension. When not set, it is taken from the first valid
    /// detection the tracker receives.
    ///
    pub fn embedding_dim(mut self, dim: Option<usize>) -> Self {
        self.embedding_dim = dim;
        self
    }

    pub fn report_policy(mut self, policy: ReportPolicy) -> Self {
        self.report_policy = policy;
        self
    }

    pub fn get_appearance_distance_threshold(&self) -> f32 {
        self.appearance_distance_threshold
    }

    pub fn get_gallery_budget(&self) -> Option<usize> {
        self.gallery_budget
    }

    pub fn get_max_age(&self) -> usize {
        self.max_age
    }

    pub fn get_confirmation_hits(&self) -> usize {
        self.confirmation_hits
    }

    pub fn get_max_age_unconfirmed(&self) -> usize {
        self.max_age_unconfirmed
    }

    pub fn get_iou_min(&self) -> f32 {
        self.iou_min
    }

    pub fn get_motion_gate_threshold(&self) -> f32 {
        self.motion_gate_threshold
    }

    pub fn get_kalman_position_weight(&self) -> f32 {
        self.kalman_position_weight
    }

    pub fn get_kalman_velocity_weight(&self) -> f32 {
        self.kalman_velocity_weight
    }

    pub fn get_embedding_dim(&self) -> Option<usize> {
        self.embedding_dim
    }

    pub fn get_report_policy(&self) -> ReportPolicy {
        self.report_policy
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        Lifecycle {
            confirmation_hits: self.confirmation_hits,
            max_age: self.max_age,
            max_age_unconfirmed: self.max_age_unconfirmed,
        }
    }

    /// Checks that every value is within its valid range
    ///
    pub fn validate(&self) -> Result<()> {
        fn invalid(message: String) -> Result<()> {
            Err(InvalidConfiguration(message).into())
        }

        if !(0.0..=2.0).contains(&self.appearance_distance_threshold) {
            return invalid(format!(
                "appearance_distance_threshold must lay within [0.0:2.0], got {}",
                self.appearance_distance_threshold
            ));
        }

        if self.gallery_budget == Some(0) {
            return invalid("gallery_budget must be a positive number".into());
        }

        if self.max_age == 0 {
            return invalid("max_age must be a positive number".into());
        }

        if self.confirmation_hits == 0 {
            return invalid("confirmation_hits must be a positive number".into());
        }

        if self.max_age_unconfirmed > self.max_age {
            return invalid(format!(
                "max_age_unconfirmed ({}) must not exceed max_age ({})",
                self.max_age_unconfirmed, self.max_age
            ));
        }

        if !(0.0..=1.0).contains(&self.iou_min) {
            return invalid(format!(
                "iou_min must lay within [0.0:1.0], got {}",
                self.iou_min
            ));
        }

        if !(self.motion_gate_threshold.is_finite() && self.motion_gate_threshold > 0.0) {
            return invalid(format!(
                "motion_gate_threshold must be a positive number, got {}",
                self.motion_gate_threshold
            ));
        }

        for (name, weight) in [
            ("kalman_position_weight", self.kalman_position_weight),
            ("kalman_velocity_weight", self.kalman_velocity_weight),
        ] {
            if !(weight.is_finite() && weight > 0.0) {
                return invalid(format!("{name} must be a positive number, got {weight}"));
            }
        }

        if self.embedding_dim == Some(0) {
            return invalid("embedding_dim must be a positive number".into());
        }

        Ok(())
    }
}
