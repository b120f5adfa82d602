use crate::track::{Feature, FEATURE_LANES_SIZE};
use ultraviolet::f32x8;

/// Utility trait to get conversion between feature vector representations
///
pub trait FromVec<V, R> {
    fn from_vec(vec: V) -> R;
}

/// Plain vector from the lane representation, the tail padding is kept
///
impl FromVec<&Feature, Vec<f32>> for Vec<f32> {
    fn from_vec(vec: &Feature) -> Vec<f32> {
        let mut res = Vec::with_capacity(vec.len() * FEATURE_LANES_SIZE);
        for e in vec {
            res.extend_from_slice(e.as_array_ref());
        }
        res
    }
}

/// Feature from Vec<f32>
///
impl FromVec<Vec<f32>, Feature> for Feature {
    fn from_vec(vec: Vec<f32>) -> Feature {
        Feature::from_vec(vec.as_slice())
    }
}

/// Feature from &[f32], the last lane block is zero padded
///
impl FromVec<&[f32], Feature> for Feature {
    fn from_vec(vec: &[f32]) -> Feature {
        vec.chunks(FEATURE_LANES_SIZE)
            .map(|chunk| {
                let mut acc = [0.0; FEATURE_LANES_SIZE];
                acc[..chunk.len()].copy_from_slice(chunk);
                f32x8::new(acc)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::track::utils::FromVec;
    use crate::track::Feature;

    #[test]
    fn conv_tests() {
        let v = vec![0.0, 0.2, 0.3];
        let o = Feature::from_vec(v);
        assert_eq!(o.len(), 1);
        let v2 = Vec::from_vec(&o);
        assert_eq!(v2, vec![0.0, 0.2, 0.3, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn exact_lanes() {
        let v = (0..16).map(|i| i as f32).collect::<Vec<_>>();
        let o = Feature::from_vec(v.as_slice());
        assert_eq!(o.len(), 2);
        assert_eq!(Vec::<f32>::from_vec(&o), v);
    }
}
