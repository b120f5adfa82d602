// Original source code idea from
// https://github.com/nwojke/deep_sort/blob/master/deep_sort/kalman_filter.py
//
use crate::utils::bbox::Universal2DBox;
use nalgebra::{SMatrix, SVector};

/// Kalman filter for (xc, yc, aspect, height) boxes
pub mod kalman_2d_box;

/// Table for the 0.95 quantile of the chi-square distribution with N degrees of
/// freedom (contains values for N=1, ..., 9). Used as Mahalanobis gating threshold.
///
pub const CHI2INV95: [f32; 9] = [
    3.8415, 5.9915, 7.8147, 9.4877, 11.070, 12.592, 14.067, 15.507, 16.919,
];

/// Gating threshold for the 4-dimensional box measurement space
pub const DEFAULT_MOTION_GATE: f32 = CHI2INV95[3];

pub(crate) const DT: u64 = 1;

/// Kalman filter state (mean and covariance)
///
#[derive(Debug, Clone, Copy)]
pub struct KalmanState<const X: usize> {
    pub mean: SVector<f32, X>,
    pub covariance: SMatrix<f32, X, X>,
}

impl<const X: usize> KalmanState<X> {
    /// The box encoded by the first four mean components
    ///
    pub fn bbox(&self) -> Universal2DBox {
        Universal2DBox::new(self.mean[0], self.mean[1], self.mean[2], self.mean[3])
    }

    /// `true` when neither the mean nor the covariance holds an infinite or NaN value
    ///
    pub fn is_finite(&self) -> bool {
        self.mean.iter().all(|v| v.is_finite()) && self.covariance.iter().all(|v| v.is_finite())
    }
}
