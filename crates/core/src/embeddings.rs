use crate::config::{EmbeddingBackend, EmbeddingsConfig};
use crate::error::{ConfigError, EmbeddingError};
use crate::models::Chunk;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PROBE_TEXT: &str = "Статья 1. Проверка размерности модели";

/// A sentence-embedding model: one call per batch, one vector per text.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Hashed character-trigram vectors. Deterministic and offline. Texts
/// shorter than three chars hash their shorter n-grams instead.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl CharacterNgramEmbedder {
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        let mut buffer = [0u8; 4];
        for window in chars.windows(chars.len().min(3)) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_name(&self) -> &str {
        "char-trigram"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }
}

/// Client for a remote sentence-embedding service.
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    device: String,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    device: &'a str,
    normalize: bool,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    data: Vec<EmbedData>,
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

impl EmbedResponse {
    fn into_embeddings(self, expected_len: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let embeddings = if !self.data.is_empty() {
            self.data.into_iter().map(|item| item.embedding).collect::<Vec<_>>()
        } else {
            self.embeddings
        };
        if embeddings.len() != expected_len {
            return Err(EmbeddingError::Malformed(format!(
                "expected {expected_len} embeddings, got {}",
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingsConfig, timeout: Duration, retry: RetryPolicy) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ConfigError::Invalid {
                field: "embeddings.endpoint",
                details: error.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model_name.clone(),
            device: config.device.clone(),
            retry,
        })
    }

    async fn send(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
                device: &self.device,
                normalize: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: EmbedResponse = response.json().await?;
        payload.into_embeddings(texts.len())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.retry
            .run("embed", || self.send(texts), EmbeddingError::is_transient)
            .await
    }
}

/// Picks the configured backend.
pub fn build_embedder(
    config: &EmbeddingsConfig,
    vector_size: usize,
    timeout: Duration,
    retry: RetryPolicy,
) -> Result<Arc<dyn Embedder>, ConfigError> {
    match config.backend {
        EmbeddingBackend::Ngram => Ok(Arc::new(CharacterNgramEmbedder {
            dimensions: vector_size,
        })),
        EmbeddingBackend::Http => Ok(Arc::new(HttpEmbedder::new(config, timeout, retry)?)),
    }
}

/// Vectors for one document's chunks, in chunk order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEmbeddings {
    pub vectors: Vec<Vec<f32>>,
    /// `true` where the vector is a zero placeholder.
    pub degraded: Vec<bool>,
}

impl ChunkEmbeddings {
    pub fn degraded_count(&self) -> usize {
        self.degraded.iter().filter(|flag| **flag).count()
    }
}

/// Batches chunks through an [`Embedder`] and guarantees the vector size.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    vector_size: usize,
}

impl EmbeddingGenerator {
    /// Probes the model once; a dimension other than `vector_size` is fatal.
    pub async fn new(
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        vector_size: usize,
    ) -> Result<Self, ConfigError> {
        let probe = embedder
            .embed(&[PROBE_TEXT.to_string()])
            .await
            .map_err(|error| ConfigError::ModelUnavailable(error.to_string()))?;
        let actual = match probe.as_slice() {
            [vector] => vector.len(),
            _ => {
                return Err(ConfigError::ModelUnavailable(format!(
                    "probe returned {} vectors",
                    probe.len()
                )))
            }
        };
        if actual != vector_size {
            return Err(ConfigError::DimensionMismatch {
                model: embedder.model_name().to_string(),
                expected: vector_size,
                actual,
            });
        }

        info!(model = embedder.model_name(), vector_size, batch_size, "embedding model ready");
        Ok(Self {
            embedder,
            batch_size: batch_size.max(1),
            vector_size,
        })
    }

    pub fn vector_size(&self) -> usize {
        self.vector_size
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub async fn embed_chunks(
        &self,
        document_id: &str,
        chunks: &[Chunk],
    ) -> Result<ChunkEmbeddings, EmbeddingError> {
        let mut vectors = vec![Vec::new(); chunks.len()];
        let mut degraded = vec![false; chunks.len()];

        let mut pending = Vec::new();
        for (position, chunk) in chunks.iter().enumerate() {
            if chunk.text.trim().is_empty() {
                warn!(document_id, chunk_index = chunk.chunk_index, "empty chunk gets a zero vector");
                vectors[position] = self.zero();
                degraded[position] = true;
            } else {
                pending.push(position);
            }
        }

        for batch in pending.chunks(self.batch_size) {
            let texts = batch
                .iter()
                .map(|&position| chunks[position].text.clone())
                .collect::<Vec<_>>();

            match self.embedder.embed(&texts).await {
                Ok(batch_vectors) if self.is_valid_batch(&batch_vectors, texts.len()) => {
                    for (&position, vector) in batch.iter().zip(batch_vectors) {
                        vectors[position] = vector;
                    }
                    debug!(document_id, batch = texts.len(), "batch embedded");
                }
                outcome => {
                    let reason = match outcome {
                        Err(error) => error.to_string(),
                        Ok(returned) => format!("malformed batch of {} vectors", returned.len()),
                    };
                    warn!(document_id, batch = texts.len(), %reason, "batch failed, embedding chunks one by one");
                    for (&position, text) in batch.iter().zip(texts) {
                        match self.embed_single(text).await {
                            Ok(vector) => vectors[position] = vector,
                            Err(error) => {
                                warn!(
                                    document_id,
                                    chunk_index = chunks[position].chunk_index,
                                    error = %error,
                                    "chunk failed to embed, storing a zero vector"
                                );
                                vectors[position] = self.zero();
                                degraded[position] = true;
                            }
                        }
                    }
                }
            }
        }

        for (position, vector) in vectors.iter().enumerate() {
            if !degraded[position] && vector.iter().all(|value| *value == 0.0) {
                warn!(
                    document_id,
                    chunk_index = chunks[position].chunk_index,
                    "model returned a zero vector"
                );
                degraded[position] = true;
            }
        }

        if !chunks.is_empty() && degraded.iter().all(|flag| *flag) {
            return Err(EmbeddingError::AllChunksFailed {
                document_id: document_id.to_string(),
            });
        }

        Ok(ChunkEmbeddings { vectors, degraded })
    }

    async fn embed_single(&self, text: String) -> Result<Vec<f32>, EmbeddingError> {
        let mut result = self.embedder.embed(&[text]).await?;
        match result.pop() {
            Some(vector) if result.is_empty() && vector.len() == self.vector_size => Ok(vector),
            Some(vector) => Err(EmbeddingError::Malformed(format!(
                "vector has {} dimensions, expected {}",
                vector.len(),
                self.vector_size
            ))),
            None => Err(EmbeddingError::Malformed("no vector returned".to_string())),
        }
    }

    fn is_valid_batch(&self, vectors: &[Vec<f32>], expected: usize) -> bool {
        vectors.len() == expected && vectors.iter().all(|vector| vector.len() == self.vector_size)
    }

    fn zero(&self) -> Vec<f32> {
        vec![0.0; self.vector_size]
    }
}
