//! HTTP-backed language provider with retry logic

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::ProviderConfig;

use super::{LanguageProvider, ProviderError, ProviderResult};

/// JSON API client for the external language/embedding backend
pub struct HttpLanguageProvider {
    client: Client,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct DetectResponse {
    language: Option<String>,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source: &'a str,
    target: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    text: Option<String>,
}

#[derive(Serialize)]
struct SummarizeRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct SummarizeResponse {
    bullets: Option<Vec<String>>,
}

#[derive(Serialize)]
struct ReduceRequest<'a> {
    summaries: &'a [String],
}

#[derive(Deserialize)]
struct ReduceResponse {
    summary: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Option<Vec<Vec<f32>>>,
}

impl HttpLanguageProvider {
    /// Create a new provider client
    pub fn new(config: &ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        }
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut, T>(&self, operation: F) -> ProviderResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ProviderResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                // Empty is an answer, not a transport failure; don't retry it
                Err(ProviderError::Empty) => return Err(ProviderError::Empty),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        let delay = Duration::from_secs(2u64.pow(attempt));
                        tracing::warn!(
                            "Provider request failed (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            self.max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(ProviderError::Unavailable("unknown error".to_string())))
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        request: &Req,
    ) -> ProviderResult<Resp> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    /// Check whether the provider endpoint answers at all
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl LanguageProvider for HttpLanguageProvider {
    async fn detect_language(&self, text: &str) -> ProviderResult<String> {
        self.retry_request(|| async {
            let resp: DetectResponse = self
                .post_json("/api/detect", &DetectRequest { text })
                .await?;
            resp.language
                .filter(|l| !l.is_empty())
                .ok_or(ProviderError::Empty)
        })
        .await
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> ProviderResult<String> {
        self.retry_request(|| async {
            let resp: TranslateResponse = self
                .post_json("/api/translate", &TranslateRequest { text, source, target })
                .await?;
            resp.text
                .filter(|t| !t.is_empty())
                .ok_or(ProviderError::Empty)
        })
        .await
    }

    async fn summarize_chunk(&self, text: &str) -> ProviderResult<Vec<String>> {
        self.retry_request(|| async {
            let resp: SummarizeResponse = self
                .post_json("/api/summarize", &SummarizeRequest { text })
                .await?;
            resp.bullets
                .filter(|b| !b.is_empty())
                .ok_or(ProviderError::Empty)
        })
        .await
    }

    async fn reduce_summaries(&self, summaries: &[String]) -> ProviderResult<String> {
        self.retry_request(|| async {
            let resp: ReduceResponse = self
                .post_json("/api/reduce", &ReduceRequest { summaries })
                .await?;
            resp.summary
                .filter(|s| !s.is_empty())
                .ok_or(ProviderError::Empty)
        })
        .await
    }

    async fn embed_many(&self, texts: &[String]) -> ProviderResult<Vec<Vec<f32>>> {
        self.retry_request(|| async {
            let resp: EmbedResponse = self
                .post_json("/api/embed", &EmbedRequest { input: texts })
                .await?;
            let embeddings = resp.embeddings.ok_or(ProviderError::Empty)?;
            if embeddings.len() != texts.len() {
                return Err(ProviderError::Malformed(format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    embeddings.len()
                )));
            }
            Ok(embeddings)
        })
        .await
    }

    fn name(&self) -> &str {
        "http"
    }
}
