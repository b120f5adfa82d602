/// DeepSORT tracker: kalman motion gating, appearance galleries and the matching cascade
///
pub mod deep_sort;
