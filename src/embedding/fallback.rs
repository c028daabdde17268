//! Deterministic local fallback embedder
//!
//! Last-resort substitute for the external provider: a pseudo-random but
//! deterministic vector seeded from a cryptographic hash of the text,
//! clamped to the configured dimension and L2-normalized. Identical text
//! always yields the identical vector, so the dedup/version decision stays
//! stable while the provider is down.

use sha2::{Digest, Sha256};

/// Compute the fallback vector for a text
pub fn fallback_embedding(text: &str, dimensions: usize) -> Vec<f32> {
    if dimensions == 0 {
        return Vec::new();
    }

    let seed = Sha256::digest(text.as_bytes());
    let mut values = Vec::with_capacity(dimensions);
    let mut counter: u64 = 0;

    while values.len() < dimensions {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(counter.to_le_bytes());
        let block = hasher.finalize();

        for byte in block.iter() {
            if values.len() == dimensions {
                break;
            }
            // Map bytes onto [-1, 1]
            values.push(*byte as f32 / 127.5 - 1.0);
        }
        counter += 1;
    }

    normalize(&mut values);
    values
}

/// L2-normalize in place; degenerate all-zero vectors get a unit basis
fn normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in values.iter_mut() {
            *v /= norm;
        }
    } else if let Some(first) = values.first_mut() {
        *first = 1.0;
    }
}

/// L2-normalized mean of a set of vectors; `None` when empty or mismatched
pub fn mean_embedding(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first_len = vectors.first()?.len();
    if first_len == 0 || vectors.iter().any(|v| v.len() != first_len) {
        return None;
    }

    let mut mean = vec![0.0f32; first_len];
    for vector in vectors {
        for (m, v) in mean.iter_mut().zip(vector) {
            *m += v;
        }
    }
    let count = vectors.len() as f32;
    for m in mean.iter_mut() {
        *m /= count;
    }

    normalize(&mut mean);
    Some(mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_identical_text() {
        let a = fallback_embedding("the same text", 128);
        let b = fallback_embedding("the same text", 128);
        assert_eq!(a, b);
    }

    #[test]
    fn different_text_differs() {
        let a = fallback_embedding("first text", 128);
        let b = fallback_embedding("second text", 128);
        assert_ne!(a, b);
    }

    #[test]
    fn clamped_to_dimension_and_normalized() {
        for dims in [1, 16, 33, 384] {
            let v = fallback_embedding("text", dims);
            assert_eq!(v.len(), dims);
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "norm {} at dims {}", norm, dims);
        }
    }

    #[test]
    fn zero_dimension_yields_empty() {
        assert!(fallback_embedding("text", 0).is_empty());
    }

    #[test]
    fn mean_of_identical_vectors_is_that_vector() {
        let v = fallback_embedding("text", 64);
        let mean = mean_embedding(&[v.clone(), v.clone()]).unwrap();
        for (a, b) in mean.iter().zip(&v) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn mean_rejects_mismatched_lengths() {
        assert!(mean_embedding(&[vec![1.0, 0.0], vec![1.0, 0.0, 0.0]]).is_none());
        assert!(mean_embedding(&[]).is_none());
    }
}
