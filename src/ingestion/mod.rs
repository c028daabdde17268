//! Ingestion pipeline stages: normalization, language handling, chunking

pub mod chunker;
pub mod language;
pub mod normalizer;

pub use chunker::{approx_tokens, Chunker};
pub use language::{LanguageResult, LanguageStage};
pub use normalizer::{hash_content, NormalizeError, NormalizedContent, Normalizer};
