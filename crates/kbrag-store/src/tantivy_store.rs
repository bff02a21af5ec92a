use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use futures::future::{self, BoxFuture};
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, TantivyError, Term};

use kbrag_core::error::{lock_poisoned, Error, Result};
use kbrag_core::traits::DocumentStore;
use kbrag_core::types::{Document, DocumentField, DocumentFilter};

use crate::tantivy_utils::{analyze, build_schema, register_tokenizers, DocFields, TEXT_TOKENIZER};

const WRITER_HEAP_BYTES: usize = 50_000_000;

fn store_error(e: TantivyError) -> Error {
    match &e {
        TantivyError::IoError(_)
        | TantivyError::OpenDirectoryError(_)
        | TantivyError::OpenReadError(_)
        | TantivyError::OpenWriteError(_)
        | TantivyError::LockFailure(..) => Error::ConnectionError(e.to_string()),
        _ => Error::Internal(e.to_string()),
    }
}

struct Collection {
    index: Index,
    reader: IndexReader,
    fields: DocFields,
    write_lock: Mutex<()>,
}

impl Collection {
    fn new(index: Index) -> Result<Self> {
        register_tokenizers(&index);
        let fields = DocFields::from_schema(&index.schema()).map_err(store_error)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(store_error)?;
        Ok(Self { index, reader, fields, write_lock: Mutex::new(()) })
    }

    fn insert(&self, documents: &[Document]) -> Result<usize> {
        let _guard = self.write_lock.lock().map_err(lock_poisoned)?;
        let mut writer: IndexWriter = self.index.writer(WRITER_HEAP_BYTES).map_err(store_error)?;
        for d in documents {
            // Ids are indexed lowercased; replacing by id is an upsert.
            writer.delete_term(Term::from_field_text(self.fields.id, &d.id.to_lowercase()));
            writer
                .add_document(doc!(
                    self.fields.id => d.id.clone(),
                    self.fields.title => d.title.clone(),
                    self.fields.content => d.content.clone(),
                    self.fields.category => d.category.clone(),
                    self.fields.source => d.source.clone(),
                ))
                .map_err(store_error)?;
        }
        writer.commit().map_err(store_error)?;
        self.reader.reload().map_err(store_error)?;
        Ok(documents.len())
    }

    /// Exact matches become term queries on the lowercased value; every
    /// analysed keyword term must hit one of its fields. Keywords made only
    /// of stop words constrain nothing.
    fn query(&self, filter: &DocumentFilter) -> Box<dyn Query> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for m in &filter.exact {
            let term = Term::from_field_text(self.fields.get(m.field), &m.value.trim().to_lowercase());
            clauses.push((Occur::Must, Box::new(TermQuery::new(term, IndexRecordOption::Basic))));
        }
        for k in &filter.keywords {
            for token in analyze(&self.index, TEXT_TOKENIZER, &k.token) {
                let per_field: Vec<(Occur, Box<dyn Query>)> = k
                    .fields
                    .iter()
                    .map(|&f| {
                        let term = Term::from_field_text(self.fields.get(f), &token);
                        (Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::Basic)) as Box<dyn Query>)
                    })
                    .collect();
                clauses.push((Occur::Must, Box::new(BooleanQuery::new(per_field))));
            }
        }
        if clauses.is_empty() {
            Box::new(AllQuery)
        } else {
            Box::new(BooleanQuery::new(clauses))
        }
    }

    fn to_document(&self, doc: &TantivyDocument) -> Document {
        let text = |field: DocumentField| {
            doc.get_first(self.fields.get(field)).and_then(|v| v.as_str()).unwrap_or_default().to_string()
        };
        Document {
            id: text(DocumentField::Id),
            title: text(DocumentField::Title),
            content: text(DocumentField::Content),
            category: text(DocumentField::Category),
            source: text(DocumentField::Source),
        }
    }

    fn find(&self, filter: &DocumentFilter, limit: usize) -> Result<Vec<Document>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let searcher = self.reader.searcher();
        let query = self.query(filter);
        let top_docs = searcher.search(&*query, &TopDocs::with_limit(limit)).map_err(store_error)?;
        top_docs
            .into_iter()
            .map(|(_, addr)| {
                let doc: TantivyDocument = searcher.doc(addr).map_err(store_error)?;
                Ok(self.to_document(&doc))
            })
            .collect()
    }

    fn count(&self, filter: &DocumentFilter) -> Result<usize> {
        let searcher = self.reader.searcher();
        searcher.search(&*self.query(filter), &Count).map_err(store_error)
    }

    fn count_by(&self, field: DocumentField) -> Result<Vec<(String, usize)>> {
        let searcher = self.reader.searcher();
        let addrs = searcher.search(&AllQuery, &DocSetCollector).map_err(store_error)?;
        let mut groups: BTreeMap<String, usize> = BTreeMap::new();
        for addr in addrs {
            let doc: TantivyDocument = searcher.doc(addr).map_err(store_error)?;
            let key = doc.get_first(self.fields.get(field)).and_then(|v| v.as_str()).unwrap_or_default();
            *groups.entry(key.to_string()).or_default() += 1;
        }
        Ok(groups.into_iter().collect())
    }
}

/// Document collections backed by tantivy, one index per collection.
///
/// `title` and `content` go through a lowercasing, stop-word-filtering
/// analyzer; `id`, `category` and `source` are indexed whole and lowercased so
/// exact filters are case-insensitive. Queries run on the blocking pool.
pub struct TantivyDocumentStore {
    root: Option<PathBuf>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl TantivyDocumentStore {
    pub fn in_ram() -> Self {
        Self { root: None, collections: RwLock::new(HashMap::new()) }
    }

    /// Open (or create) a store rooted at `root`; every subdirectory holding
    /// an index is loaded as a collection named after the directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let mut collections = HashMap::new();
        for entry in std::fs::read_dir(&root)? {
            let path = entry?.path();
            if !path.join("meta.json").exists() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            let index = Index::open_in_dir(&path).map_err(store_error)?;
            collections.insert(name, Arc::new(Collection::new(index)?));
        }
        tracing::info!(root = %root.display(), collections = collections.len(), "opened document store");
        Ok(Self { root: Some(root), collections: RwLock::new(collections) })
    }

    pub fn root(&self) -> Option<&Path> { self.root.as_deref() }

    pub fn create_collection(&self, name: &str) -> Result<()> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(Error::InvalidArgument(format!("invalid collection name '{name}'")));
        }
        let mut collections = self.collections.write().map_err(lock_poisoned)?;
        if collections.contains_key(name) {
            return Ok(());
        }
        let index = match &self.root {
            None => Index::create_in_ram(build_schema()),
            Some(root) => {
                let dir = root.join(name);
                std::fs::create_dir_all(&dir)?;
                if dir.join("meta.json").exists() {
                    Index::open_in_dir(&dir).map_err(store_error)?
                } else {
                    Index::create_in_dir(&dir, build_schema()).map_err(store_error)?
                }
            }
        };
        collections.insert(name.to_string(), Arc::new(Collection::new(index)?));
        tracing::debug!(collection = name, "created collection");
        Ok(())
    }

    /// Upsert documents by id, creating the collection if needed.
    pub fn insert(&self, collection: &str, documents: &[Document]) -> Result<usize> {
        self.create_collection(collection)?;
        let inserted = self.collection(collection)?.insert(documents)?;
        tracing::debug!(collection, inserted, "indexed documents");
        Ok(inserted)
    }

    fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.collections
            .read()
            .map_err(lock_poisoned)?
            .get(name)
            .cloned()
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }

    fn run_blocking<'a, T, F>(&'a self, collection: &'a str, f: F) -> BoxFuture<'a, Result<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Collection) -> Result<T> + Send + 'static,
    {
        Box::pin(async move {
            let handle = self.collection(collection)?;
            tokio::task::spawn_blocking(move || f(handle.as_ref()))
                .await
                .map_err(|e| Error::Internal(format!("store task failed: {e}")))?
        })
    }
}

impl DocumentStore for TantivyDocumentStore {
    fn collection_exists<'a>(&'a self, collection: &'a str) -> BoxFuture<'a, Result<bool>> {
        let result = self.collections.read().map_err(lock_poisoned).map(|c| c.contains_key(collection));
        Box::pin(future::ready(result))
    }

    fn find<'a>(
        &'a self,
        collection: &'a str,
        filter: &'a DocumentFilter,
        limit: usize,
    ) -> BoxFuture<'a, Result<Vec<Document>>> {
        let filter = filter.clone();
        self.run_blocking(collection, move |c| c.find(&filter, limit))
    }

    fn count<'a>(&'a self, collection: &'a str, filter: &'a DocumentFilter) -> BoxFuture<'a, Result<usize>> {
        let filter = filter.clone();
        self.run_blocking(collection, move |c| c.count(&filter))
    }

    fn count_by<'a>(
        &'a self,
        collection: &'a str,
        field: DocumentField,
    ) -> BoxFuture<'a, Result<Vec<(String, usize)>>> {
        self.run_blocking(collection, move |c| c.count_by(field))
    }
}
