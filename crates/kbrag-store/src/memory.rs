use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use futures::future::{self, BoxFuture};

use kbrag_core::error::{lock_poisoned, Error, Result};
use kbrag_core::traits::DocumentStore;
use kbrag_core::types::{Document, DocumentField, DocumentFilter};

/// Collections held in process memory.
///
/// Keywords match as case-insensitive substrings; exact filters compare the
/// trimmed value case-insensitively. Documents keep insertion order and are
/// upserted by `id`.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self { Self::default() }

    pub fn create_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().map_err(lock_poisoned)?;
        collections.entry(name.to_string()).or_default();
        Ok(())
    }

    /// Insert or replace documents (by id), creating the collection if needed.
    /// Returns how many new ids were added.
    pub fn insert(&self, collection: &str, documents: impl IntoIterator<Item = Document>) -> Result<usize> {
        let mut collections = self.collections.write().map_err(lock_poisoned)?;
        let docs = collections.entry(collection.to_string()).or_default();
        let mut added = 0;
        for doc in documents {
            match docs.iter_mut().find(|d| d.id == doc.id) {
                Some(existing) => *existing = doc,
                None => {
                    docs.push(doc);
                    added += 1;
                }
            }
        }
        tracing::debug!(collection, added, total = docs.len(), "inserted documents");
        Ok(added)
    }

    fn with_collection<T>(&self, collection: &str, f: impl FnOnce(&[Document]) -> T) -> Result<T> {
        let collections = self.collections.read().map_err(lock_poisoned)?;
        let docs = collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        Ok(f(docs))
    }
}

fn accepts(doc: &Document, filter: &DocumentFilter) -> bool {
    let exact = filter
        .exact
        .iter()
        .all(|m| doc.field(m.field).trim().eq_ignore_ascii_case(m.value.trim()));
    exact
        && filter.keywords.iter().all(|k| {
            let token = k.token.to_lowercase();
            k.fields.iter().any(|&f| doc.field(f).to_lowercase().contains(&token))
        })
}

impl DocumentStore for InMemoryDocumentStore {
    fn collection_exists<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<bool>> {
        let result = self
            .collections
            .read()
            .map_err(lock_poisoned)
            .map(|c| c.contains_key(collection));
        Box::pin(future::ready(result))
    }

    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: &'a DocumentFilter,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<Document>>> {
        let result: Result<Vec<Document>> = self.with_collection(collection, |docs| {
            docs.iter().filter(|d| accepts(d, filter)).take(limit).cloned().collect()
        });
        Box::pin(future::ready(result))
    }

    fn count<'a>(&'a self, collection: &'a str, filter: &'a DocumentFilter) -> BoxFuture<'a, Result<usize>> {
        let result = self.with_collection(collection, |docs| docs.iter().filter(|d| accepts(d, filter)).count());
        Box::pin(future::ready(result))
    }

    fn count_by<'a>(
        &'a self,
        collection: &'a str,
        field: DocumentField,
    ) -> BoxFuture<'a, Result<Vec<(String, usize)>>> {
        let result: Result<Vec<(String, usize)>> = self.with_collection(collection, |docs| {
            let mut groups: BTreeMap<String, usize> = BTreeMap::new();
            for doc in docs {
                *groups.entry(doc.field(field).to_string()).or_default() += 1;
            }
            groups.into_iter().collect()
        });
        Box::pin(future::ready(result))
    }
}
