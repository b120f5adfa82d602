// Original source code idea from
// https://github.com/nwojke/deep_sort/blob/master/deep_sort/kalman_filter.py
//
use crate::utils::bbox::Universal2DBox;
use crate::utils::kalman::{KalmanState, DT};
use crate::Errors::DegenerateCovariance;
use anyhow::Result;
use nalgebra::{SMatrix, SVector};

pub const DIM_2D_BOX: usize = 4;
pub const DIM_2D_BOX_X2: usize = DIM_2D_BOX * 2;

/// Constant velocity Kalman filter over `(xc, yc, aspect, height)` and their velocities.
///
/// Process and measurement noise are proportional to the box height, so the uncertainty
/// is the same for near and far objects relative to their size.
///
#[derive(Debug, Clone)]
pub struct Universal2DBoxKalmanFilter {
    motion_matrix: SMatrix<f32, DIM_2D_BOX_X2, DIM_2D_BOX_X2>,
    update_matrix: SMatrix<f32, DIM_2D_BOX, DIM_2D_BOX_X2>,
    std_position_weight: f32,
    std_velocity_weight: f32,
}

/// Default initializer
impl Default for Universal2DBoxKalmanFilter {
    fn default() -> Self {
        Universal2DBoxKalmanFilter::new(1.0 / 20.0, 1.0 / 160.0)
    }
}

impl Universal2DBoxKalmanFilter {
    /// Constructor with custom weights (shouldn't be used without the need)
    pub fn new(position_weight: f32, velocity_weight: f32) -> Self {
        let mut motion_matrix: SMatrix<f32, DIM_2D_BOX_X2, DIM_2D_BOX_X2> = SMatrix::identity();

        for i in 0..DIM_2D_BOX {
            motion_matrix[(i, DIM_2D_BOX + i)] = DT as f32;
        }

        Universal2DBoxKalmanFilter {
            motion_matrix,
            update_matrix: SMatrix::identity(),
            std_position_weight: position_weight,
            std_velocity_weight: velocity_weight,
        }
    }

    fn std_position(&self, k: f32, cnst: f32, p: f32) -> [f32; DIM_2D_BOX] {
        let pos_weight = k * self.std_position_weight * p;
        [pos_weight, pos_weight, cnst, pos_weight]
    }

    fn std_velocity(&self, k: f32, cnst: f32, p: f32) -> [f32; DIM_2D_BOX] {
        let vel_weight = k * self.std_velocity_weight * p;
        [vel_weight, vel_weight, cnst, vel_weight]
    }

    fn measurement(bbox: &Universal2DBox) -> SVector<f32, DIM_2D_BOX> {
        SVector::from([bbox.xc, bbox.yc, bbox.aspect, bbox.height])
    }

    /// Initialize the filter with the first observation
    ///
    pub fn initiate(&self, bbox: &Universal2DBox) -> KalmanState<DIM_2D_BOX_X2> {
        let mean: SVector<f32, DIM_2D_BOX_X2> = SVector::from_iterator([
            bbox.xc,
            bbox.yc,
            bbox.aspect,
            bbox.height,
            0.0,
            0.0,
            0.0,
            0.0,
        ]);

        let mut std: SVector<f32, DIM_2D_BOX_X2> = SVector::from_iterator(
            self.std_position(2.0, 1e-2, bbox.height)
                .into_iter()
                .chain(self.std_velocity(10.0, 1e-5, bbox.height)),
        );

        std = std.component_mul(&std);

        let covariance: SMatrix<f32, DIM_2D_BOX_X2, DIM_2D_BOX_X2> = SMatrix::from_diagonal(&std);
        KalmanState { mean, covariance }
    }

    /// Predicts the state from the last state
    ///
    pub fn predict(&self, state: &KalmanState<DIM_2D_BOX_X2>) -> KalmanState<DIM_2D_BOX_X2> {
        let (mean, covariance) = (state.mean, state.covariance);
        let std_pos = self.std_position(1.0, 1e-2, mean[3]);
        let std_vel = self.std_velocity(1.0, 1e-5, mean[3]);

        let mut std: SVector<f32, DIM_2D_BOX_X2> =
            SVector::from_iterator(std_pos.into_iter().chain(std_vel));

        std = std.component_mul(&std);

        let motion_cov: SMatrix<f32, DIM_2D_BOX_X2, DIM_2D_BOX_X2> = SMatrix::from_diagonal(&std);

        let mean = self.motion_matrix * mean;
        let covariance =
            self.motion_matrix * covariance * self.motion_matrix.transpose() + motion_cov;
        KalmanState { mean, covariance }
    }

    /// Projects the state into the measurement space, adding the measurement noise
    ///
    pub fn project(&self, state: &KalmanState<DIM_2D_BOX_X2>) -> KalmanState<DIM_2D_BOX> {
        let (mean, covariance) = (state.mean, state.covariance);
        let mut std: SVector<f32, DIM_2D_BOX> =
            SVector::from_iterator(self.std_position(1.0, 1e-1, mean[3]));

        std = std.component_mul(&std);

        let innovation_cov: SMatrix<f32, DIM_2D_BOX, DIM_2D_BOX> = SMatrix::from_diagonal(&std);

        let mean = self.update_matrix * mean;
        let covariance =
            self.update_matrix * covariance * self.update_matrix.transpose() + innovation_cov;
        KalmanState { mean, covariance }
    }

    /// Updates the state with the current observation
    ///
    pub fn update(
        &self,
        state: &KalmanState<DIM_2D_BOX_X2>,
        measurement: &Universal2DBox,
    ) -> Result<KalmanState<DIM_2D_BOX_X2>> {
        let (mean, covariance) = (state.mean, state.covariance);
        let projected_state = self.project(state);
        let (projected_mean, projected_cov) = (projected_state.mean, projected_state.covariance);

        let cholesky = projected_cov.cholesky().ok_or(DegenerateCovariance)?;
        // S^-1 * H * P, the transposed gain as P and S are symmetric
        let kalman_gain_t = cholesky.solve(&(self.update_matrix * covariance));
        let kalman_gain = kalman_gain_t.transpose();

        let innovation = Self::measurement(measurement) - projected_mean;

        let mean = mean + kalman_gain * innovation;
        let covariance = covariance - kalman_gain * projected_cov * kalman_gain_t;
        Ok(KalmanState { mean, covariance })
    }

    /// Squared Mahalanobis distance between the projected state and the measurement
    ///
    pub fn distance(
        &self,
        state: &KalmanState<DIM_2D_BOX_X2>,
        measurement: &Universal2DBox,
    ) -> Result<f32> {
        let projected_state = self.project(state);
        let (mean, covariance) = (projected_state.mean, projected_state.covariance);

        let d = Self::measurement(measurement) - mean;

        let choletsky = covariance.cholesky().ok_or(DegenerateCovariance)?.l();
        let res = choletsky
            .solve_lower_triangular(&d)
            .ok_or(DegenerateCovariance)?;
        Ok(res.component_mul(&res).sum())
    }
}
