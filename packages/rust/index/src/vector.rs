//! In-memory vector index over one document's chunks.

use std::cmp::Ordering;

use bcorag_shared::{IndexSettings, Result, TokenUsage};
use bcorag_storage::{EmbeddingCache, content_hash};
use tracing::{debug, info, instrument, warn};

use crate::chunker::{Chunk, chunk_text};
use crate::loader::Document;
use crate::openai::OpenAiClient;
use crate::{QueryEngine, QueryResponse};

/// Prompt wrapping the retrieved context and the caller's query.
const QA_TEMPLATE: &str = "Context information is below.\n\
---------------------\n\
{context}\n\
---------------------\n\
Given the context information and not prior knowledge, answer the query.\n\
Query: {query}\n\
Answer: ";

/// A chunk and its embedding.
#[derive(Debug, Clone)]
struct IndexedChunk {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// Statistics from building an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of chunks indexed.
    pub chunks: usize,
    /// Tokens spent embedding chunks that were not cached.
    pub embedding_tokens: u64,
    /// Chunks whose embedding came from the cache.
    pub cache_hits: usize,
}

/// Queryable index: chunk embeddings plus the client used to answer.
#[derive(Debug)]
pub struct VectorIndex {
    client: OpenAiClient,
    chunks: Vec<IndexedChunk>,
    top_k: usize,
}

/// Chunk and embed `document`, reusing cached embeddings where possible.
///
/// Cache failures are logged and otherwise ignored.
#[instrument(skip_all, fields(document = %document.identity))]
pub async fn build_index(
    document: &Document,
    settings: &IndexSettings,
    cache: Option<&EmbeddingCache>,
) -> Result<(VectorIndex, IndexStats)> {
    let client = OpenAiClient::new(settings)?;
    let chunks = chunk_text(&document.text, settings.chunk_size, settings.chunk_overlap);
    let model = client.embedding_model().to_string();

    let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; chunks.len()];
    let mut stats = IndexStats {
        chunks: chunks.len(),
        ..IndexStats::default()
    };

    if let Some(cache) = cache {
        for (slot, chunk) in embeddings.iter_mut().zip(&chunks) {
            match cache.get_embedding(&content_hash(&chunk.text), &model).await {
                Ok(Some(hit)) => {
                    *slot = Some(hit);
                    stats.cache_hits += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(chunk = chunk.index, error = %e, "embedding cache read failed"),
            }
        }
    }

    let missing: Vec<usize> = (0..chunks.len())
        .filter(|&i| embeddings[i].is_none())
        .collect();

    for batch in missing.chunks(settings.embed_batch_size.max(1)) {
        let inputs: Vec<String> = batch.iter().map(|&i| chunks[i].text.clone()).collect();
        let result = client.embed(&inputs).await?;
        stats.embedding_tokens += result.tokens;

        for (&i, embedding) in batch.iter().zip(result.embeddings) {
            if let Some(cache) = cache {
                if let Err(e) = cache
                    .set_embedding(&content_hash(&chunks[i].text), &model, &embedding)
                    .await
                {
                    warn!(chunk = i, error = %e, "embedding cache write failed");
                }
            }
            embeddings[i] = Some(embedding);
        }
    }

    let indexed = chunks
        .into_iter()
        .zip(embeddings)
        .filter_map(|(chunk, embedding)| embedding.map(|embedding| IndexedChunk { chunk, embedding }))
        .collect::<Vec<_>>();

    info!(
        chunks = stats.chunks,
        cache_hits = stats.cache_hits,
        embedding_tokens = stats.embedding_tokens,
        "index built"
    );

    Ok((
        VectorIndex {
            client,
            chunks: indexed,
            top_k: settings.top_k,
        },
        stats,
    ))
}

impl VectorIndex {
    /// Indexes of the `top_k` chunks most similar to `query`, best first.
    fn retrieve(&self, query: &[f32]) -> Vec<usize> {
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(query, &c.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(self.top_k);
        scored.into_iter().map(|(i, _)| i).collect()
    }

    fn render_prompt(&self, selected: &[usize], query: &str) -> String {
        let context = selected
            .iter()
            .map(|&i| self.chunks[i].chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        QA_TEMPLATE
            .replace("{context}", &context)
            .replace("{query}", query)
    }
}

impl QueryEngine for VectorIndex {
    #[instrument(skip_all, fields(query_chars = text.len()))]
    async fn query(&self, text: &str) -> Result<QueryResponse> {
        let batch = self.client.embed(&[text.to_string()]).await?;
        let query_embedding = batch.embeddings.into_iter().next().unwrap_or_default();

        let selected = self.retrieve(&query_embedding);
        debug!(?selected, "retrieved context chunks");

        let completion = self
            .client
            .complete(&self.render_prompt(&selected, text))
            .await?;
        debug!(
            model = %completion.model,
            finish_reason = completion.finish_reason.as_deref().unwrap_or("unknown"),
            "context answer generated"
        );
        if completion.finish_reason.as_deref() == Some("length") {
            warn!(model = %completion.model, "completion truncated at the token limit");
        }

        Ok(QueryResponse {
            text: completion.text,
            usage: TokenUsage {
                embedding: batch.tokens,
                prompt: completion.prompt_tokens,
                completion: completion.completion_tokens,
                total: completion.total_tokens,
            },
            sources: selected
                .into_iter()
                .map(|i| self.chunks[i].chunk.index)
                .collect(),
        })
    }
}

/// Cosine similarity of two vectors; 0.0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
