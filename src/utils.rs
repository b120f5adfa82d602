/// Bounding boxes
pub mod bbox;

/// Kalman filter
pub mod kalman;

/// Minimum cost bipartite assignment
pub mod linear_sum_assignment;
