//! Semantic similarity between a model suggestion and a human selection.
//!
//! Scoring is best-effort: [`SimilarityScorer::score`] never fails. Any
//! embedding or arithmetic problem is logged and reported as `0.0`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ModelInitError, ScoreComputationError};
use crate::traits::Embedder;

/// Text embedded once at startup to prove the model is usable.
const PROBE_TEXT: &str = "Addition";

/// Default dimensionality of the local hashing embedder.
pub const DEFAULT_HASHING_DIMENSIONS: usize = 384;

/// Cosine similarity scorer over a shared, read-only embedder.
#[derive(Clone)]
pub struct SimilarityScorer {
    embedder: Arc<dyn Embedder>,
}

impl SimilarityScorer {
    /// Wrap an embedder without probing it.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Wrap an embedder after checking that it produces a usable vector.
    pub async fn initialize(embedder: Arc<dyn Embedder>) -> Result<Self, ModelInitError> {
        let init_err = |reason: String| ModelInitError {
            model: embedder.name().to_string(),
            reason,
        };

        let probe = embedder
            .embed(PROBE_TEXT)
            .await
            .map_err(|e| init_err(format!("{e:#}")))?;
        if probe.is_empty() {
            return Err(init_err("model returned an empty embedding".into()));
        }
        if probe.iter().any(|x| !x.is_finite()) {
            return Err(init_err("model returned non-finite values".into()));
        }

        debug!(model = embedder.name(), dims = probe.len(), "similarity model ready");
        Ok(Self::new(embedder))
    }

    pub fn model_name(&self) -> &str {
        self.embedder.name()
    }

    /// Similarity in [-1.0, 1.0], rounded to three decimals. Failures give `0.0`.
    pub async fn score(&self, text_a: &str, text_b: &str) -> f64 {
        match self.try_score(text_a, text_b).await {
            Ok(score) => score,
            Err(e) => {
                warn!(model = self.embedder.name(), error = %e, "similarity computation failed, using 0.0");
                0.0
            }
        }
    }

    async fn try_score(&self, text_a: &str, text_b: &str) -> Result<f64, ScoreComputationError> {
        let a = self
            .embedder
            .embed(text_a)
            .await
            .map_err(|e| ScoreComputationError::Embedding(format!("{e:#}")))?;
        let b = self
            .embedder
            .embed(text_b)
            .await
            .map_err(|e| ScoreComputationError::Embedding(format!("{e:#}")))?;
        let cosine = cosine_similarity(&a, &b)?;
        Ok(round3(cosine.clamp(-1.0, 1.0)))
    }
}

/// Cosine similarity of two vectors. A zero vector is similar to nothing.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, ScoreComputationError> {
    if a.len() != b.len() {
        return Err(ScoreComputationError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if !(dot.is_finite() && norm_a.is_finite() && norm_b.is_finite()) {
        return Err(ScoreComputationError::NonFinite);
    }
    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return Ok(0.0);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Round to three decimal places, the precision stored in ledgers.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// ---------------------------------------------------------------------------
// Local hashing embedder
// ---------------------------------------------------------------------------

/// Deterministic feature-hashing embedder.
///
/// Hashes lowercase words and their character trigrams into fixed buckets,
/// then L2-normalizes. Morphological variants ("Fraction" / "Fractions")
/// share most trigrams and land close together. Always available.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// FNV-1a bucket index.
    fn bucket(feature: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in feature.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }

    fn words(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect()
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut features: HashMap<String, f32> = HashMap::new();
        for word in Self::words(text) {
            let padded: Vec<char> = format!("#{word}#").chars().collect();
            for tri in padded.windows(3) {
                *features.entry(tri.iter().collect()).or_default() += 0.5;
            }
            *features.entry(format!("w:{word}")).or_default() += 1.0;
        }

        let mut vec = vec![0.0f32; self.dimensions];
        for (feature, weight) in &features {
            vec[Self::bucket(feature, self.dimensions)] += weight;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(self.vector(text))
    }
}
