//! Similarity-based version decision for re-uploaded documents

use crate::types::Document;

/// Cosine-similarity cutoff above which content counts as unchanged
pub const SIMILARITY_THRESHOLD: f32 = 0.95;

/// Write action decided for a candidate upload
#[derive(Debug, Clone, PartialEq)]
pub enum WriteAction {
    /// No document exists under the identity key; insert at version 1
    Insert,
    /// Content is close enough to the stored version; leave it untouched
    Unchanged { similarity: f32 },
    /// Content diverged (or an embedding is missing); snapshot and overwrite
    NewVersion { similarity: Option<f32> },
}

/// Decides between insert, no-op, and new-version for one identity key
pub struct VersionManager {
    threshold: f32,
}

impl Default for VersionManager {
    fn default() -> Self {
        Self {
            threshold: SIMILARITY_THRESHOLD,
        }
    }
}

impl VersionManager {
    pub fn with_threshold(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Decide the write action for a candidate embedding against the
    /// currently stored document (if any)
    pub fn decide(&self, existing: Option<&Document>, new_embedding: Option<&[f32]>) -> WriteAction {
        let Some(existing) = existing else {
            return WriteAction::Insert;
        };

        match (existing.embedding.as_deref(), new_embedding) {
            (Some(old), Some(new)) => {
                let similarity = cosine_similarity(old, new);
                if similarity >= self.threshold {
                    WriteAction::Unchanged { similarity }
                } else {
                    WriteAction::NewVersion {
                        similarity: Some(similarity),
                    }
                }
            }
            // Either side lacks an embedding: treat as changed content
            _ => WriteAction::NewVersion { similarity: None },
        }
    }
}

/// Cosine similarity clamped to [0, 1]
///
/// Mismatched vector lengths are a data problem, not a fatal one: they score
/// 0.0 with a logged warning.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        tracing::warn!(
            "Embedding dimension mismatch ({} vs {}), treating similarity as 0",
            a.len(),
            b.len()
        );
        return 0.0;
    }
    if a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}
