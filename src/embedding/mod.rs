//! Embedding client: bounded worker pool, content-hash cache, local fallback

pub mod cache;
pub mod fallback;

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::providers::LanguageProvider;

pub use cache::{CacheStats, EmbeddingCache};
pub use fallback::{fallback_embedding, mean_embedding};

/// Where an embedding vector came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingSource {
    Provider,
    Cache,
    Fallback,
}

/// One embedded text
#[derive(Debug, Clone)]
pub struct Embedded {
    pub vector: Vec<f32>,
    pub source: EmbeddingSource,
}

struct EmbedRequest {
    texts: Vec<String>,
    reply: oneshot::Sender<Result<Vec<Embedded>>>,
}

/// Client-side handle to the embedding worker pool
///
/// Requests are dispatched to a small fixed-size pool rather than one task
/// per caller; callers await a reply under a timeout. A timed-out request
/// still completes on the worker and populates the cache for later callers.
#[derive(Clone)]
pub struct EmbeddingClient {
    sender: mpsc::Sender<EmbedRequest>,
    cache: Arc<EmbeddingCache>,
    dimensions: usize,
    request_timeout: Duration,
}

impl EmbeddingClient {
    /// Start the worker pool; called once at process startup
    pub fn start(config: &EmbeddingConfig, provider: Arc<dyn LanguageProvider>) -> Self {
        let workers = config
            .workers
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1);

        let cache = Arc::new(EmbeddingCache::new(
            config.cache_entries,
            Duration::from_secs(config.cache_ttl_secs),
        ));

        let (sender, receiver) = mpsc::channel::<EmbedRequest>(1000);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        for worker_id in 0..workers {
            let receiver = Arc::clone(&receiver);
            let provider = Arc::clone(&provider);
            let cache = Arc::clone(&cache);
            let dimensions = config.dimensions;
            let allow_fallback = config.allow_fallback;

            tokio::spawn(async move {
                tracing::debug!("Embedding worker {} started", worker_id);
                loop {
                    let request = { receiver.lock().await.recv().await };
                    let Some(request) = request else {
                        break;
                    };
                    let result =
                        embed_batch(&*provider, &cache, dimensions, allow_fallback, &request.texts)
                            .await;
                    // The caller may have timed out; the cache is warm either way
                    let _ = request.reply.send(result);
                }
                tracing::debug!("Embedding worker {} stopped", worker_id);
            });
        }

        tracing::info!(
            "Embedding client started: {} workers, {} dims, {}s timeout",
            workers,
            config.dimensions,
            config.request_timeout_secs
        );

        Self {
            sender,
            cache,
            dimensions: config.dimensions,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// Embed a batch of texts; blocks up to the configured timeout
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Embedded>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let (reply, response) = oneshot::channel();
        self.sender
            .send(EmbedRequest {
                texts: texts.to_vec(),
                reply,
            })
            .await
            .map_err(|_| Error::internal("embedding worker pool is not running"))?;

        match timeout(self.request_timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::internal("embedding worker dropped the request")),
            Err(_) => Err(Error::EmbeddingTimeout(self.request_timeout.as_secs())),
        }
    }

    /// Embed a single text
    pub async fn embed(&self, text: &str) -> Result<Embedded> {
        let texts = [text.to_string()];
        let mut result = self.embed_many(&texts).await?;
        result
            .pop()
            .ok_or_else(|| Error::internal("empty embedding batch result"))
    }

    /// Insert an already-known vector, keyed by its source text
    ///
    /// Used for best-effort cache refresh of unchanged documents.
    pub fn prime(&self, text: &str, vector: Vec<f32>) {
        self.cache.put(EmbeddingCache::key_for(text), vector);
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Resolve a batch: cache first, then provider, then local fallback
async fn embed_batch(
    provider: &dyn LanguageProvider,
    cache: &EmbeddingCache,
    dimensions: usize,
    allow_fallback: bool,
    texts: &[String],
) -> Result<Vec<Embedded>> {
    let keys: Vec<String> = texts.iter().map(|t| EmbeddingCache::key_for(t)).collect();
    let mut resolved: Vec<Option<Embedded>> = keys
        .iter()
        .map(|key| {
            cache.get(key).map(|vector| Embedded {
                vector,
                source: EmbeddingSource::Cache,
            })
        })
        .collect();

    let missing: Vec<usize> = (0..texts.len()).filter(|&i| resolved[i].is_none()).collect();
    if missing.is_empty() {
        return Ok(resolved.into_iter().flatten().collect());
    }

    let missing_texts: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();

    let provider_result = provider.embed_many(&missing_texts).await.and_then(|vectors| {
        if vectors.len() == missing_texts.len() {
            Ok(vectors)
        } else {
            Err(crate::providers::ProviderError::Malformed(format!(
                "expected {} embeddings, got {}",
                missing_texts.len(),
                vectors.len()
            )))
        }
    });

    match provider_result {
        Ok(vectors) => {
            for (&i, vector) in missing.iter().zip(vectors) {
                cache.put(keys[i].clone(), vector.clone());
                resolved[i] = Some(Embedded {
                    vector,
                    source: EmbeddingSource::Provider,
                });
            }
        }
        Err(e) => {
            if !allow_fallback || dimensions == 0 {
                tracing::warn!("Embedding provider failed ({}) and fallback is disabled", e);
                return Err(Error::EmbeddingUnavailable);
            }
            tracing::warn!("Embedding provider failed ({}), using local fallback", e);
            for &i in &missing {
                let vector = fallback_embedding(&texts[i], dimensions);
                cache.put(keys[i].clone(), vector.clone());
                resolved[i] = Some(Embedded {
                    vector,
                    source: EmbeddingSource::Fallback,
                });
            }
        }
    }

    Ok(resolved.into_iter().flatten().collect())
}

/// Per-key timestamp guard against repeating an expensive operation within
/// a short window
pub struct Debounce {
    seen: DashMap<String, Instant>,
    window: Duration,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            window,
        }
    }

    /// Returns true at most once per window for a given key
    pub fn should_run(&self, key: &str) -> bool {
        use dashmap::mapref::entry::Entry;

        let now = Instant::now();
        match self.seen.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if now.duration_since(*occupied.get()) >= self.window {
                    occupied.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
        }
    }
}
