//! Local semantic classification
//!
//! Embeds document text and compares it against precomputed embeddings of the
//! category descriptions. Uses fastembed's AllMiniLmL6V2 model by default.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use indexmap::IndexMap;

use crate::categories::{CategorySet, Classification};
use crate::error::{FolioError, Result};

/// Texts shorter than this (in chars, after trimming) are never embedded
pub const MIN_TEXT_CHARS: usize = 5;

/// Anything that turns text into fixed-size vectors
pub trait SemanticModel: Send + Sync {
    /// Embed a batch of texts, one vector per input in order
    fn embed_batch(&self, texts: &[&str]) -> std::result::Result<Vec<Vec<f32>>, String>;

    /// Embed a single text
    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, String> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| "No embedding generated".to_string())
    }
}

/// fastembed-backed model, loaded once per process
pub struct FastEmbedModel {
    model: TextEmbedding,
}

impl FastEmbedModel {
    /// Load the default model.
    ///
    /// Downloads it on first use. Cache location: ~/.cache/fastembed (or platform equivalent)
    pub fn new() -> Result<Self> {
        Self::with_model(EmbeddingModel::AllMiniLML6V2)
    }

    pub fn with_model(model: EmbeddingModel) -> Result<Self> {
        tracing::info!("[SemanticModel] Initializing with model: {:?}", model);

        let init_options = InitOptions::new(model).with_show_download_progress(true);
        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| FolioError::ModelUnavailable(e.to_string()))?;

        tracing::info!("[SemanticModel] Model initialized successfully");
        Ok(Self { model })
    }
}

impl SemanticModel for FastEmbedModel {
    fn embed_batch(&self, texts: &[&str]) -> std::result::Result<Vec<Vec<f32>>, String> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        self.model
            .embed(texts.to_vec(), None)
            .map_err(|e| format!("Failed to generate embeddings: {}", e))
    }
}

/// Run-scoped embeddings of category descriptions, in category order.
///
/// Categories without a description have no entry and are never candidates.
#[derive(Debug, Clone, Default)]
pub struct CategoryEmbeddings {
    vectors: IndexMap<String, Vec<f32>>,
}

impl CategoryEmbeddings {
    /// Embed every described category in one batch
    pub fn build(model: &dyn SemanticModel, categories: &CategorySet) -> Result<Self> {
        let described: Vec<(&str, &str)> = categories
            .iter()
            .filter(|(_, desc)| !desc.trim().is_empty())
            .collect();

        if described.is_empty() {
            return Ok(Self::default());
        }

        let texts: Vec<&str> = described.iter().map(|(_, desc)| *desc).collect();
        let embeddings = model
            .embed_batch(&texts)
            .map_err(FolioError::ModelUnavailable)?;

        if embeddings.len() != described.len() {
            return Err(FolioError::ModelUnavailable(format!(
                "Embedding count mismatch: expected {}, got {}",
                described.len(),
                embeddings.len()
            )));
        }

        let vectors = described
            .into_iter()
            .map(|(name, _)| name.to_string())
            .zip(embeddings)
            .collect();

        Ok(Self { vectors })
    }

    pub fn from_vectors(vectors: IndexMap<String, Vec<f32>>) -> Self {
        Self { vectors }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.vectors.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Pick the category whose description is most similar to `text`.
///
/// Confidence is the best cosine similarity mapped from [-1, 1] to [0, 1].
/// The first category wins among equal similarities.
pub fn classify(
    text: &str,
    model: &dyn SemanticModel,
    embeddings: &CategoryEmbeddings,
) -> std::result::Result<(Classification, f32), String> {
    if text.trim().chars().count() < MIN_TEXT_CHARS {
        return Ok((Classification::Unmatched, 0.0));
    }

    let text_embedding = model.embed(text)?;

    let mut best: Option<(&str, f32)> = None;
    for (name, vector) in embeddings.iter() {
        let similarity = cosine_similarity(&text_embedding, vector);
        if best.map_or(true, |(_, max)| similarity > max) {
            best = Some((name, similarity));
        }
    }

    Ok(match best {
        Some((name, similarity)) => (
            Classification::from_name(name),
            ((similarity + 1.0) / 2.0).clamp(0.0, 1.0),
        ),
        None => (Classification::Unmatched, 0.0),
    })
}

/// Compute cosine similarity between two vectors
///
/// Returns a value between -1.0 and 1.0, or 0.0 for empty, mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    // Single pass over dot product and both norms
    let (dot, norm_a_sq, norm_b_sq) = a.iter().zip(b.iter()).fold(
        (0.0f32, 0.0f32, 0.0f32),
        |(dot, na, nb), (&x, &y)| (dot + x * y, na + x * x, nb + y * y),
    );

    if norm_a_sq == 0.0 || norm_b_sq == 0.0 {
        return 0.0;
    }

    dot / (norm_a_sq * norm_b_sq).sqrt()
}
