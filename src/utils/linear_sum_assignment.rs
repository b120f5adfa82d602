use itertools::Itertools;
use log::trace;
use pathfinding::kuhn_munkres::kuhn_munkres;
use pathfinding::matrix::Matrix;

const F32_I64_MULT: f32 = 1_000_000.0;

/// Cost assigned to pairs that must never be matched
pub const INFEASIBLE_COST: f32 = 1e5;

/// Margin added to the threshold for clamped cells, so that they are never accepted
const CLAMP_MARGIN: f32 = 1e-5;

/// Cost matrix filled with [`INFEASIBLE_COST`], rows are tracks and columns are detections.
///
/// `Matrix` does not hold rows without columns, so a matrix with no tracks or no detections
/// is returned as `0 x 0`.
///
pub fn infeasible_matrix(rows: usize, cols: usize) -> Matrix<f32> {
    if rows == 0 || cols == 0 {
        Matrix::new(0, 0, INFEASIBLE_COST)
    } else {
        Matrix::new(rows, cols, INFEASIBLE_COST)
    }
}

/// Solves the minimum cost assignment and drops the pairs with cost above `threshold`.
///
/// Cells above the threshold are clamped to `threshold + ε` before solving, so infeasible
/// sentinels do not distort the optimal assignment of feasible pairs. The result is a list
/// of `(row, col)` pairs sorted by row.
///
pub fn min_cost_matching(cost: &Matrix<f32>, threshold: f32) -> Vec<(usize, usize)> {
    if cost.rows == 0 || cost.columns == 0 {
        return Vec::default();
    }

    // kuhn_munkres requires rows <= columns
    let transposed = cost.rows > cost.columns;
    let clamped = threshold + CLAMP_MARGIN;
    let weights = if transposed {
        cost.transposed()
    } else {
        cost.clone()
    }
    .map(|v| {
        let v = if v.is_nan() || v > threshold {
            clamped
        } else {
            v
        };
        // the solver maximizes the total weight
        -((v * F32_I64_MULT).round() as i64)
    });

    let (_, solution) = kuhn_munkres(&weights);
    trace!("Assignment solution (transposed={}): {:?}", transposed, &solution);

    solution
        .into_iter()
        .enumerate()
        .map(|(r, c)| if transposed { (c, r) } else { (r, c) })
        .filter(|rc| cost[rc] <= threshold)
        .sorted()
        .collect()
}
