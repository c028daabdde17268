//! Language detection and translation stage

use std::sync::Arc;

use crate::providers::{LanguageProvider, ProviderError};

/// Outcome of the language stage
#[derive(Debug, Clone)]
pub struct LanguageResult {
    /// Detected source language, when the provider could tell
    pub detected: Option<String>,
    /// Text to continue the pipeline with (translated or original)
    pub text: String,
    /// Whether a translation was applied
    pub translated: bool,
}

/// Detects the source language and translates to the canonical language
/// when needed
///
/// Every provider failure degrades to passing the original text through;
/// this stage never fails a job.
pub struct LanguageStage {
    provider: Arc<dyn LanguageProvider>,
    canonical: String,
}

impl LanguageStage {
    pub fn new(provider: Arc<dyn LanguageProvider>, canonical: impl Into<String>) -> Self {
        Self {
            provider,
            canonical: canonical.into(),
        }
    }

    /// Run detection and, if the source differs from the canonical
    /// language, translation
    pub async fn run(&self, text: &str) -> LanguageResult {
        let detected = match self.provider.detect_language(text).await {
            Ok(lang) => Some(lang),
            Err(ProviderError::Empty) => {
                tracing::debug!("Provider could not detect language");
                None
            }
            Err(e) => {
                tracing::warn!("Language detection unavailable: {}", e);
                None
            }
        };

        let Some(source) = detected.as_deref() else {
            return LanguageResult {
                detected: None,
                text: text.to_string(),
                translated: false,
            };
        };

        if source == self.canonical {
            return LanguageResult {
                detected,
                text: text.to_string(),
                translated: false,
            };
        }

        match self.provider.translate(text, source, &self.canonical).await {
            Ok(translated) => LanguageResult {
                detected,
                text: translated,
                translated: true,
            },
            Err(e) => {
                tracing::warn!(
                    "Translation {} -> {} unavailable ({}), keeping original text",
                    source,
                    self.canonical,
                    e
                );
                LanguageResult {
                    detected,
                    text: text.to_string(),
                    translated: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::providers::ProviderResult;

    struct FakeProvider {
        language: Option<String>,
        translation: Option<String>,
    }

    #[async_trait]
    impl LanguageProvider for FakeProvider {
        async fn detect_language(&self, _text: &str) -> ProviderResult<String> {
            self.language.clone().ok_or(ProviderError::Empty)
        }

        async fn translate(
            &self,
            _text: &str,
            _source: &str,
            _target: &str,
        ) -> ProviderResult<String> {
            self.translation
                .clone()
                .ok_or(ProviderError::Unavailable("offline".into()))
        }

        async fn summarize_chunk(&self, _text: &str) -> ProviderResult<Vec<String>> {
            Err(ProviderError::Empty)
        }

        async fn reduce_summaries(&self, _summaries: &[String]) -> ProviderResult<String> {
            Err(ProviderError::Empty)
        }

        async fn embed_many(&self, _texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
            Err(ProviderError::Empty)
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    #[tokio::test]
    async fn canonical_language_passes_through() {
        let stage = LanguageStage::new(
            Arc::new(FakeProvider {
                language: Some("en".into()),
                translation: None,
            }),
            "en",
        );
        let result = stage.run("hello").await;
        assert_eq!(result.detected.as_deref(), Some("en"));
        assert!(!result.translated);
        assert_eq!(result.text, "hello");
    }

    #[tokio::test]
    async fn foreign_language_is_translated() {
        let stage = LanguageStage::new(
            Arc::new(FakeProvider {
                language: Some("de".into()),
                translation: Some("hello".into()),
            }),
            "en",
        );
        let result = stage.run("hallo").await;
        assert!(result.translated);
        assert_eq!(result.text, "hello");
    }

    #[tokio::test]
    async fn translation_failure_keeps_original() {
        let stage = LanguageStage::new(
            Arc::new(FakeProvider {
                language: Some("de".into()),
                translation: None,
            }),
            "en",
        );
        let result = stage.run("hallo").await;
        assert!(!result.translated);
        assert_eq!(result.text, "hallo");
        assert_eq!(result.detected.as_deref(), Some("de"));
    }

    #[tokio::test]
    async fn detection_failure_passes_through() {
        let stage = LanguageStage::new(
            Arc::new(FakeProvider {
                language: None,
                translation: None,
            }),
            "en",
        );
        let result = stage.run("hallo").await;
        assert!(result.detected.is_none());
        assert!(!result.translated);
    }
}
