//! Encoders: the only source of vectors in the retrieval pipeline.
//!
//! `Encoder` is injected everywhere a vector is needed, so the combiner and the search
//! context never know which backend they are talking to.
//!
//! - `HttpEncoder`: an Ollama-compatible `/api/embed` endpoint (bge-m3 by default).
//! - `HashEncoder`: deterministic feature hashing, no model. Used offline and in tests.

use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("encoder returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error("encoder returned inconsistent dimensions: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("encoder returned an empty vector")]
    EmptyVector,

    #[error("encoder returned a non-finite component in vector {index}")]
    NonFinite { index: usize },
}

#[async_trait]
pub trait Encoder: Send + Sync {
    /// Backend + model identity. Recorded in the cache manifest and compared at query
    /// time: vectors from different ids are not comparable.
    fn id(&self) -> String;

    /// Encodes a batch of texts, one vector per input, in input order.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError>;
}

/// Checks count and dimension of an encoder response. Returns the dimension.
pub fn check_batch(
    expected_count: usize,
    vectors: &[Vec<f32>],
    expected_dim: Option<usize>,
) -> Result<usize, EncoderError> {
    if vectors.len() != expected_count {
        return Err(EncoderError::CountMismatch {
            expected: expected_count,
            got: vectors.len(),
        });
    }
    let mut dim = expected_dim;
    for (index, vector) in vectors.iter().enumerate() {
        if vector.is_empty() {
            return Err(EncoderError::EmptyVector);
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(EncoderError::NonFinite { index });
        }
        match dim {
            None => dim = Some(vector.len()),
            Some(d) if d != vector.len() => {
                return Err(EncoderError::DimensionMismatch {
                    expected: d,
                    got: vector.len(),
                })
            }
            Some(_) => {}
        }
    }
    Ok(dim.unwrap_or(0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EncoderBackend {
    Http,
    Hash,
}

impl FromStr for EncoderBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "ollama" => Ok(EncoderBackend::Http),
            "hash" => Ok(EncoderBackend::Hash),
            other => Err(format!("unknown encoder backend '{other}' (expected http or hash)")),
        }
    }
}

/// Builds the encoder selected by configuration.
pub fn build_encoder(config: &Config) -> Result<Arc<dyn Encoder>, EncoderError> {
    Ok(match config.encoder_backend {
        EncoderBackend::Http => Arc::new(HttpEncoder::new(
            config.embedding_url.clone(),
            config.embedding_model.clone(),
            Duration::from_secs(config.embedding_timeout_secs),
        )?),
        EncoderBackend::Hash => Arc::new(HashEncoder::new(config.hash_dimension)),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// HttpEncoder
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct EmbedErrorBody {
    error: String,
}

#[derive(Clone)]
pub struct HttpEncoder {
    client: Client,
    base_url: String,
    model: String,
}

impl HttpEncoder {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Result<Self, EncoderError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl Encoder for HttpEncoder {
    fn id(&self) -> String {
        format!("http:{}", self.model)
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<EmbedErrorBody>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(EncoderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbedResponse = response.json().await?;
        let dim = check_batch(texts.len(), &parsed.embeddings, None)?;
        debug!(count = texts.len(), dim, model = %self.model, "encoded batch");
        Ok(parsed.embeddings)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HashEncoder
// ────────────────────────────────────────────────────────────────────────────

/// Changing the keys changes every vector; bump `HASH_ENCODER_VERSION` with them.
const HASH_SEED_K0: u64 = 0x0123_4567_89ab_cdef;
const HASH_SEED_K1: u64 = 0xfedc_ba98_7654_3210;
const HASH_ENCODER_VERSION: &str = "v1";
const BIGRAM_WEIGHT: f32 = 0.5;

/// Feature-hashing encoder: lowercase word unigrams and bigrams, sign hashing,
/// L2-normalized. Fully deterministic across runs and platforms.
pub struct HashEncoder {
    dimension: usize,
}

impl HashEncoder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn hash(&self, token: &str) -> u64 {
        let mut hasher = SipHasher13::new_with_keys(HASH_SEED_K0, HASH_SEED_K1);
        token.hash(&mut hasher);
        hasher.finish()
    }

    fn add_feature(&self, vector: &mut [f32], token: &str, weight: f32) {
        let h = self.hash(token);
        let idx = (h % self.dimension as u64) as usize;
        // High bit picks the sign so index and sign are independent.
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        vector[idx] += sign * weight;
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Encoder for HashEncoder {
    fn id(&self) -> String {
        format!("hash-{HASH_ENCODER_VERSION}:{}", self.dimension)
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}
