use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{Document, DocumentField, DocumentFilter};

/// Maps text to fixed-dimension vectors. Implementations are pure functions
/// of their input: the same text always yields the same vector.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model (e.g. `bge-m3:d1024`), used as a cache key.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Keyed document collections consumed by the structured query tool.
///
/// Unknown collections fail with `CollectionNotFound`; an unreachable backend
/// fails with `ConnectionError`.
pub trait DocumentStore: Send + Sync {
    fn collection_exists<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<bool>>;

    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: &'a DocumentFilter,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<Document>>>;

    fn count<'a>(&'a self, collection: &'a str, filter: &'a DocumentFilter) -> BoxFuture<'a, Result<usize>>;

    /// Number of documents per distinct value of `field`, sorted by value.
    fn count_by<'a>(
        &'a self,
        collection: &'a str,
        field: DocumentField,
    ) -> BoxFuture<'a, Result<Vec<(String, usize)>>>;
}
