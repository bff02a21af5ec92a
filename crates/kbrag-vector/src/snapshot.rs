//! JSON snapshots of the index so a process can reload vectors instead of
//! re-embedding the knowledge base.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use kbrag_core::error::{Error, Result};
use kbrag_core::traits::Embedder;
use kbrag_core::types::EmbeddedChunk;

use crate::index::{IndexState, VectorIndex};

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    model_id: String,
    dim: Option<usize>,
    saved_at: DateTime<Utc>,
    entries: Vec<EmbeddedChunk>,
}

impl VectorIndex {
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let entries = self.entries()?;
        let snapshot = Snapshot {
            model_id: self.embedder().model_id().to_string(),
            dim: self.dimension()?,
            saved_at: Utc::now(),
            entries,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(fs::File::create(path)?);
        serde_json::to_writer(writer, &snapshot)?;
        tracing::info!(path = %path.display(), entries = snapshot.entries.len(), "saved index snapshot");
        Ok(())
    }

    /// Load a snapshot written by [`VectorIndex::save_snapshot`]. The snapshot
    /// must have been produced by the same embedding model.
    pub fn load_snapshot(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let reader = BufReader::new(fs::File::open(path)?);
        let snapshot: Snapshot = serde_json::from_reader(reader)?;
        if snapshot.model_id != embedder.model_id() {
            return Err(Error::InvalidConfig(format!(
                "snapshot {} was built with '{}', current model is '{}'",
                path.display(),
                snapshot.model_id,
                embedder.model_id()
            )));
        }
        if let Some(bad) = snapshot.entries.iter().find(|e| Some(e.vector.len()) != snapshot.dim) {
            return Err(Error::DimensionMismatch {
                expected: snapshot.dim.unwrap_or_default(),
                actual: bad.vector.len(),
            });
        }
        let rows = snapshot.entries.len();
        let state = IndexState::from_entries(snapshot.entries)?;
        tracing::info!(
            path = %path.display(),
            entries = state.entries.len(),
            duplicates = rows - state.entries.len(),
            saved_at = %snapshot.saved_at,
            "loaded index snapshot"
        );
        Ok(VectorIndex::from_state(embedder, state))
    }
}
