use crate::track::Feature;

/// Cosine similarity between two vectors
///
/// When the features distances lengths don't match, the longer feature vector is truncated to
/// shorter one when the similarity is calculated
///
pub fn cosine(f1: &Feature, f2: &Feature) -> f32 {
    let mut divided = 0.0;
    let len = f1.len().min(f2.len());
    for i in 0..len {
        let block = f1[i] * f2[i];
        divided += block.reduce_add();
    }

    let f1_divisor = f1
        .iter()
        .take(len)
        .fold(0.0_f32, |acc, a| acc + (*a * *a).reduce_add());

    let f2_divisor = f2
        .iter()
        .take(len)
        .fold(0.0_f32, |acc, a| acc + (*a * *a).reduce_add());

    divided / (f1_divisor * f2_divisor).sqrt()
}

/// Cosine distance `1 - cosine(f1, f2)` clamped to `[0, 2]`
///
pub fn cosine_distance(f1: &Feature, f2: &Feature) -> f32 {
    (1.0 - cosine(f1, f2)).clamp(0.0, 2.0)
}

/// Squared L2 norm of the feature
///
pub fn squared_norm(f: &Feature) -> f32 {
    f.iter().fold(0.0_f32, |acc, a| acc + (*a * *a).reduce_add())
}
