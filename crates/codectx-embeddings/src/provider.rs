//! Provider contract shared by every embedding backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::ops::Range;
use tracing::{debug, warn};

use crate::error::{EmbeddingError, EmbeddingResult};

/// One embedding; its length equals the provider's [`EmbeddingProvider::dimensions`]
pub type EmbeddingVector = Vec<f32>;

/// A batch whose backend call failed and whose chunks were zero-filled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    /// Position of the batch within the call
    pub batch_index: usize,
    /// Chunk indices the batch covered
    pub range: Range<usize>,
    /// Final error after retries
    pub error: String,
}

/// Result of [`EmbeddingProvider::generate_embeddings_detailed`]
///
/// `vectors` always has one entry per input chunk, in input order. Entries
/// covered by a [`BatchFailure`] are all zeros.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingBatch {
    pub vectors: Vec<EmbeddingVector>,
    pub failures: Vec<BatchFailure>,
}

impl EmbeddingBatch {
    /// Whether vector `index` is a zero substitute for a failed chunk
    pub fn is_failed(&self, index: usize) -> bool {
        self.failures.iter().any(|f| f.range.contains(&index))
    }

    /// True when no batch failed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of zero-filled chunks
    pub fn failed_chunks(&self) -> usize {
        self.failures.iter().map(|f| f.range.len()).sum()
    }

    /// Drop the failure details
    pub fn into_vectors(self) -> Vec<EmbeddingVector> {
        self.vectors
    }
}

/// Capability set every embedding backend implements
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `chunks`, returning exactly one vector per chunk in input order.
    ///
    /// A batch that fails after retries is replaced with zero vectors and
    /// logged; it never fails the call. Empty input makes no backend call.
    async fn generate_embeddings(&self, chunks: &[String]) -> EmbeddingResult<Vec<EmbeddingVector>> {
        Ok(self.generate_embeddings_detailed(chunks).await?.into_vectors())
    }

    /// Like [`generate_embeddings`](Self::generate_embeddings), but reports
    /// which batches were substituted.
    async fn generate_embeddings_detailed(&self, chunks: &[String]) -> EmbeddingResult<EmbeddingBatch>;

    /// Vector length for the configured model
    fn dimensions(&self) -> usize;

    /// Display key in the form `kind:model`
    fn provider_name(&self) -> &str;

    /// Lightweight reachability probe. Never errors; logs the reason on `false`.
    async fn is_available(&self) -> bool;
}

/// Split `chunks` into batches of `batch_size`, embed each with `embed_batch`,
/// and zero-fill any batch that fails.
///
/// Every vector the backend returns is checked against `dimensions`, and the
/// count is checked against the batch size, so the output always lines up
/// with the input.
pub(crate) async fn embed_in_batches<'a, F, Fut>(
    provider: &str,
    chunks: &'a [String],
    batch_size: usize,
    dimensions: usize,
    mut embed_batch: F,
) -> EmbeddingBatch
where
    F: FnMut(&'a [String]) -> Fut,
    Fut: Future<Output = EmbeddingResult<Vec<EmbeddingVector>>>,
{
    let mut result = EmbeddingBatch {
        vectors: Vec::with_capacity(chunks.len()),
        failures: Vec::new(),
    };

    if chunks.is_empty() {
        return result;
    }

    let batch_size = batch_size.max(1);
    let batch_count = chunks.len().div_ceil(batch_size);

    for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
        let start = batch_index * batch_size;
        let range = start..start + batch.len();

        debug!(
            provider,
            batch = batch_index + 1,
            batches = batch_count,
            size = batch.len(),
            "Embedding batch"
        );

        let outcome = embed_batch(batch)
            .await
            .and_then(|vectors| check_batch(vectors, batch.len(), dimensions));

        match outcome {
            Ok(vectors) => result.vectors.extend(vectors),
            Err(err) => {
                result
                    .vectors
                    .extend(std::iter::repeat_with(|| vec![0.0; dimensions]).take(batch.len()));
                result.failures.push(BatchFailure {
                    batch_index,
                    range,
                    error: err.to_string(),
                });
            }
        }
    }

    if !result.failures.is_empty() {
        let errors: Vec<String> = result
            .failures
            .iter()
            .map(|f| format!("batch {} ({}..{}): {}", f.batch_index, f.range.start, f.range.end, f.error))
            .collect();
        warn!(
            provider,
            failed_batches = result.failures.len(),
            total_batches = batch_count,
            failed_chunks = result.failed_chunks(),
            "Some embedding batches failed and were replaced with zero vectors: {}",
            errors.join("; ")
        );
    }

    result
}

fn check_batch(
    vectors: Vec<EmbeddingVector>,
    expected_count: usize,
    dimensions: usize,
) -> EmbeddingResult<Vec<EmbeddingVector>> {
    if vectors.len() != expected_count {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected_count,
            vectors.len()
        )));
    }

    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimensions,
            actual: bad.len(),
        });
    }

    Ok(vectors)
}
