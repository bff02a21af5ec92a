//! kbrag-vector
//!
//! In-memory cosine-similarity index with score thresholding and top-k
//! selection. A linear scan is O(N·d) per query, which is fine at
//! knowledge-base scale; an approximate structure can be slotted in behind
//! `VectorIndex::search_vector` if N outgrows it.

pub mod cache;
pub mod index;
pub mod snapshot;

pub use cache::EmbeddingCache;
pub use index::{cosine_similarity, VectorIndex};
