use std::sync::Arc;

use kbrag_core::config::{AggregateOp, RetrievalConfig};
use kbrag_core::error::{Error, Result};
use kbrag_core::traits::DocumentStore;
use kbrag_core::types::{
    DocumentField, DocumentFilter, FieldMatch, KeywordMatch, StructuredHits, StructuredRecord,
};

use crate::intent::IntentVocabulary;

const KEYWORD_FIELDS: [DocumentField; 2] = [DocumentField::Title, DocumentField::Content];

/// Parse a search term into a filter.
///
/// `category:`, `source:` and `id:` prefixes are exact filters;
/// `title:` and `content:` restrict a keyword to that field; every other
/// token is a keyword that must appear in the title or the content.
pub fn parse_search_term(term: &str) -> DocumentFilter {
    let mut filter = DocumentFilter::default();
    for raw in term.split_whitespace() {
        if let Some((prefix, value)) = raw.split_once(':') {
            if let Ok(field) = prefix.parse::<DocumentField>() {
                let value = value.trim_matches(|c: char| c == '"' || c == '\'');
                if value.is_empty() {
                    continue;
                }
                if field.is_exact() {
                    filter.exact.push(FieldMatch { field, value: value.to_string() });
                } else {
                    filter.keywords.push(KeywordMatch { token: value.to_lowercase(), fields: vec![field] });
                }
                continue;
            }
        }
        let token = raw.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        if !token.is_empty() {
            filter.keywords.push(KeywordMatch { token, fields: KEYWORD_FIELDS.to_vec() });
        }
    }
    filter
}

/// Keyword search and intent-driven aggregation over a [`DocumentStore`].
pub struct StructuredQueryTool {
    store: Arc<dyn DocumentStore>,
    vocabulary: IntentVocabulary,
}

impl StructuredQueryTool {
    pub fn new(store: Arc<dyn DocumentStore>, vocabulary: IntentVocabulary) -> Self {
        Self { store, vocabulary }
    }

    pub fn from_config(store: Arc<dyn DocumentStore>, config: &RetrievalConfig) -> Self {
        Self::new(store, IntentVocabulary::from_config(config))
    }

    pub fn vocabulary(&self) -> &IntentVocabulary { &self.vocabulary }

    /// Documents of `collection` matching `term`. `count` is the total number
    /// of matches; at most `limit` documents are returned.
    pub async fn search(&self, term: &str, collection: &str, limit: usize) -> Result<StructuredHits> {
        if limit == 0 {
            return Err(Error::InvalidArgument("limit must be at least 1".into()));
        }
        self.ensure_collection(collection).await?;
        let filter = parse_search_term(term);
        let (documents, count) = futures::try_join!(
            self.store.find(collection, &filter, limit),
            self.store.count(collection, &filter)
        )?;
        tracing::debug!(collection, term, count, returned = documents.len(), "structured search");
        Ok(StructuredHits { count, results: documents.into_iter().map(StructuredRecord::Document).collect() })
    }

    /// Run the grouped computation named by `intent`.
    ///
    /// The intent is resolved before the store is touched, so an unknown
    /// intent is reported as `UnsupportedIntent` even for a missing collection.
    pub async fn aggregate(&self, intent: &str, collection: &str) -> Result<StructuredHits> {
        let rule = self
            .vocabulary
            .match_intent(intent)
            .ok_or_else(|| Error::UnsupportedIntent(intent.to_string()))?;
        self.ensure_collection(collection).await?;
        let hits = match &rule.operation {
            AggregateOp::CountAll => {
                let count = self.store.count(collection, &DocumentFilter::default()).await?;
                StructuredHits { count, results: Vec::new() }
            }
            AggregateOp::CountBy { field } => {
                let groups = self.store.count_by(collection, *field).await?;
                StructuredHits {
                    count: groups.iter().map(|(_, n)| n).sum(),
                    results: groups.into_iter().map(|(key, count)| StructuredRecord::Group { key, count }).collect(),
                }
            }
        };
        tracing::debug!(collection, intent = %rule.name, count = hits.count, "structured aggregate");
        Ok(hits)
    }

    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        if self.store.collection_exists(collection).await? {
            Ok(())
        } else {
            Err(Error::CollectionNotFound(collection.to_string()))
        }
    }
}
