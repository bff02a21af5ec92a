use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use kbrag_core::error::{lock_poisoned, Error, Result};
use kbrag_core::traits::Embedder;
use kbrag_core::types::{Chunk, ChunkKey, EmbeddedChunk, SearchResult};

use crate::cache::{hash_content, CacheEntry, EmbeddingCache};

/// Cosine similarity clamped to `[-1, 1]`; a zero-norm operand scores 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

fn validate_search_args(k: usize, threshold: f32) -> Result<()> {
    if k == 0 {
        return Err(Error::InvalidArgument("k must be at least 1".into()));
    }
    if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
        return Err(Error::InvalidArgument(format!("threshold {threshold} outside [-1, 1]")));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub(crate) struct IndexState {
    /// Insertion order; replaced entries keep their slot.
    pub(crate) entries: Vec<EmbeddedChunk>,
    pub(crate) slots: HashMap<ChunkKey, usize>,
    pub(crate) dim: Option<usize>,
}

impl IndexState {
    fn check_dims(&self, entries: &[EmbeddedChunk]) -> Result<Option<usize>> {
        let mut expected = self.dim;
        for e in entries {
            match expected {
                Some(dim) if dim != e.vector.len() => {
                    return Err(Error::DimensionMismatch { expected: dim, actual: e.vector.len() })
                }
                Some(_) => {}
                None => expected = Some(e.vector.len()),
            }
        }
        Ok(expected)
    }

    fn apply(&mut self, entries: Vec<EmbeddedChunk>) -> (usize, usize) {
        let (mut inserted, mut replaced) = (0, 0);
        for e in entries {
            let key = e.chunk.key();
            match self.slots.get(&key) {
                Some(&slot) => {
                    self.entries[slot] = e;
                    replaced += 1;
                }
                None => {
                    self.slots.insert(key, self.entries.len());
                    self.entries.push(e);
                    inserted += 1;
                }
            }
        }
        (inserted, replaced)
    }

    /// State holding `entries` with one slot per key; a repeated key
    /// replaces the earlier entry in place.
    pub(crate) fn from_entries(entries: Vec<EmbeddedChunk>) -> Result<Self> {
        let mut state = IndexState::default();
        state.dim = state.check_dims(&entries)?;
        state.apply(entries);
        Ok(state)
    }

    fn reslot(&mut self) {
        self.slots = self.entries.iter().enumerate().map(|(i, e)| (e.chunk.key(), i)).collect();
    }

    fn live_hashes(&self) -> HashSet<String> {
        self.entries.iter().map(|e| hash_content(&e.chunk.text)).collect()
    }
}

/// In-memory nearest-neighbour index over embedded chunks.
///
/// Searches are a linear cosine scan under a shared read lock, so concurrent
/// searches never block each other; upserts take the write lock only after
/// their vectors have been computed.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    state: RwLock<IndexState>,
    cache: EmbeddingCache,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder, state: RwLock::new(IndexState::default()), cache: EmbeddingCache::new() }
    }

    pub(crate) fn from_state(embedder: Arc<dyn Embedder>, state: IndexState) -> Self {
        Self { embedder, state: RwLock::new(state), cache: EmbeddingCache::new() }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }

    /// Embed and upsert `chunks`, keyed by `(source, position)`.
    pub fn index(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let embedded = self.embed_chunks(chunks)?;
        self.upsert(embedded)
    }

    /// Insert or replace pre-embedded entries. The batch is rejected as a
    /// whole if any vector disagrees with the index dimension.
    pub fn upsert(&self, entries: Vec<EmbeddedChunk>) -> Result<()> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        let dim = state.check_dims(&entries)?;
        let (inserted, replaced) = state.apply(entries);
        state.dim = dim;
        tracing::debug!(inserted, replaced, total = state.entries.len(), "upserted vectors");
        Ok(())
    }

    /// Replace the whole index with `chunks`.
    pub fn rebuild(&self, chunks: &[Chunk]) -> Result<()> {
        let embedded = self.embed_chunks(chunks)?;
        let fresh = IndexState::from_entries(embedded)?;
        let live = fresh.live_hashes();
        let entries = fresh.entries.len();
        *self.state.write().map_err(lock_poisoned)? = fresh;
        let evicted = self.cache.retain_live(self.embedder.model_id(), &live)?;
        tracing::info!(entries, evicted, "rebuilt vector index");
        Ok(())
    }

    /// Up to `k` entries scoring at least `threshold` against `query`, best first.
    pub fn similarity_search(&self, query: &str, k: usize, threshold: f32) -> Result<Vec<SearchResult>> {
        validate_search_args(k, threshold)?;
        if self.is_empty()? {
            return Ok(Vec::new());
        }
        let query_vec = self.embed_query(query)?;
        self.search_vector(&query_vec, k, threshold)
    }

    pub fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embedder.embed(query).map_err(|e| Error::EmbeddingUnavailable(format!("{e:#}")))
    }

    pub fn search_vector(&self, query_vec: &[f32], k: usize, threshold: f32) -> Result<Vec<SearchResult>> {
        validate_search_args(k, threshold)?;
        let state = self.state.read().map_err(lock_poisoned)?;
        if state.entries.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(dim) = state.dim {
            if dim != query_vec.len() {
                return Err(Error::DimensionMismatch { expected: dim, actual: query_vec.len() });
            }
        }
        let mut scored: Vec<(f32, &EmbeddedChunk)> = state
            .entries
            .iter()
            .map(|e| (cosine_similarity(query_vec, &e.vector), e))
            .filter(|(score, _)| *score >= threshold)
            .collect();
        // Stable: equal scores keep insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        tracing::debug!(candidates = state.entries.len(), returned = scored.len(), "vector search");
        Ok(scored
            .into_iter()
            .map(|(score, e)| SearchResult {
                content: e.chunk.text.clone(),
                similarity_score: score,
                metadata: e.chunk.metadata(),
            })
            .collect())
    }

    /// Drop every entry of `source`; returns how many were removed.
    pub fn remove_source(&self, source: &str) -> Result<usize> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        let before = state.entries.len();
        state.entries.retain(|e| e.chunk.source != source);
        let removed = before - state.entries.len();
        if removed == 0 {
            return Ok(0);
        }
        state.reslot();
        let live = state.live_hashes();
        drop(state);
        let evicted = self.cache.retain_live(self.embedder.model_id(), &live)?;
        tracing::debug!(source, removed, evicted, "removed source from index");
        Ok(removed)
    }

    /// Drop every entry and every cached vector.
    pub fn clear(&self) -> Result<()> {
        *self.state.write().map_err(lock_poisoned)? = IndexState::default();
        self.cache.clear()
    }

    pub fn len(&self) -> Result<usize> { Ok(self.state.read().map_err(lock_poisoned)?.entries.len()) }
    pub fn is_empty(&self) -> Result<bool> { Ok(self.len()? == 0) }
    /// Number of vectors held by the embedding cache.
    pub fn cache_len(&self) -> usize { self.cache.len() }
    pub fn dimension(&self) -> Result<Option<usize>> { Ok(self.state.read().map_err(lock_poisoned)?.dim) }

    pub fn entries(&self) -> Result<Vec<EmbeddedChunk>> {
        Ok(self.state.read().map_err(lock_poisoned)?.entries.clone())
    }

    fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddedChunk>> {
        let model_id = self.embedder.model_id().to_string();
        let hashes: Vec<String> = chunks.iter().map(|c| hash_content(&c.text)).collect();
        let cached = self.cache.get_many(&model_id, &hashes)?;

        let mut texts = Vec::new();
        let mut miss_indices = Vec::new();
        for (i, (chunk, h)) in chunks.iter().zip(&hashes).enumerate() {
            if !cached.contains_key(h) {
                texts.push(chunk.text.clone());
                miss_indices.push(i);
            }
        }

        let mut vectors: Vec<Option<Vec<f32>>> = hashes.iter().map(|h| cached.get(h).cloned()).collect();
        if !texts.is_empty() {
            let embs = self
                .embedder
                .embed_batch(&texts)
                .map_err(|e| Error::EmbeddingUnavailable(format!("{e:#}")))?;
            if embs.len() != texts.len() {
                return Err(Error::EmbeddingUnavailable(format!(
                    "embedder returned {} vectors for {} texts",
                    embs.len(),
                    texts.len()
                )));
            }
            let mut new_entries = Vec::with_capacity(embs.len());
            for (v, &i) in embs.into_iter().zip(&miss_indices) {
                new_entries.push(CacheEntry { content_hash: hashes[i].clone(), model_id: model_id.clone(), vector: v.clone() });
                vectors[i] = Some(v);
            }
            self.cache.put_many(new_entries)?;
        }
        tracing::debug!(chunks = chunks.len(), cache_hits = chunks.len() - miss_indices.len(), "embedded chunks");

        chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, v)| {
                let vector = v.ok_or_else(|| Error::Internal("missing vector after embedding".into()))?;
                Ok(EmbeddedChunk { chunk: chunk.clone(), vector })
            })
            .collect()
    }
}
