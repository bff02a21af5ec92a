//! In-process embedding cache keyed by `(content_hash, model_id)`.
//!
//! Consulted before calling the embedder and written through on misses, so
//! re-indexing unchanged content does not recompute its vector.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use kbrag_core::error::{lock_poisoned, Result};

pub fn hash_content(s: &str) -> String {
    blake3::hash(s.as_bytes()).to_hex().to_string()
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub content_hash: String,
    pub model_id: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: RwLock<HashMap<(String, String), Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new() -> Self { Self::default() }

    pub fn get_many(&self, model_id: &str, hashes: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        let entries = self.entries.read().map_err(lock_poisoned)?;
        let mut out = HashMap::new();
        for h in hashes {
            if let Some(v) = entries.get(&(h.clone(), model_id.to_string())) {
                out.insert(h.clone(), v.clone());
            }
        }
        Ok(out)
    }

    pub fn put_many(&self, new_entries: Vec<CacheEntry>) -> Result<()> {
        if new_entries.is_empty() { return Ok(()); }
        let mut entries = self.entries.write().map_err(lock_poisoned)?;
        for e in new_entries {
            entries.insert((e.content_hash, e.model_id), e.vector);
        }
        Ok(())
    }

    /// Keep only the vectors of `model_id` whose content hash is in `live`.
    /// Returns how many entries were dropped.
    pub fn retain_live(&self, model_id: &str, live: &HashSet<String>) -> Result<usize> {
        let mut entries = self.entries.write().map_err(lock_poisoned)?;
        let before = entries.len();
        entries.retain(|(hash, model), _| model == model_id && live.contains(hash));
        Ok(before - entries.len())
    }

    pub fn clear(&self) -> Result<()> {
        self.entries.write().map_err(lock_poisoned)?.clear();
        Ok(())
    }

    pub fn len(&self) -> usize { self.entries.read().map(|e| e.len()).unwrap_or(0) }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
