//! Domain types shared by the chunker, the vector index, the structured
//! store and the orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Upsert key of an indexed chunk: `(source, position)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub source: String,
    pub position: usize,
}

/// A bounded text segment extracted from a source document.
///
/// - `text`: the payload that gets embedded
/// - `source`: stable identity of the parent document (relative path or external id)
/// - `category`: facet of the parent document (e.g. its directory)
/// - `position`: index of the window within the parent document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub category: String,
    pub position: usize,
}

impl Chunk {
    pub fn key(&self) -> ChunkKey {
        ChunkKey { source: self.source.clone(), position: self.position }
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source: self.source.clone(),
            category: self.category.clone(),
            position: self.position,
        }
    }
}

/// A chunk together with the vector that backs its index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub category: String,
    pub position: usize,
}

/// One scored candidate returned by the vector index.
///
/// `similarity_score` is a cosine similarity in `[-1, 1]`; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub content: String,
    pub similarity_score: f32,
    pub metadata: ChunkMetadata,
}

/// Named fields of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentField {
    Id,
    Title,
    Content,
    Category,
    Source,
}

impl DocumentField {
    pub const ALL: [DocumentField; 5] = [
        DocumentField::Id,
        DocumentField::Title,
        DocumentField::Content,
        DocumentField::Category,
        DocumentField::Source,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentField::Id => "id",
            DocumentField::Title => "title",
            DocumentField::Content => "content",
            DocumentField::Category => "category",
            DocumentField::Source => "source",
        }
    }

    /// Short fields compared by exact value rather than by keyword.
    pub fn is_exact(&self) -> bool {
        matches!(self, DocumentField::Id | DocumentField::Category | DocumentField::Source)
    }
}

impl fmt::Display for DocumentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for DocumentField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentField::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown document field '{s}'")))
    }
}

/// A keyed record of the external document collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub source: String,
}

impl Document {
    pub fn field(&self, field: DocumentField) -> &str {
        match field {
            DocumentField::Id => &self.id,
            DocumentField::Title => &self.title,
            DocumentField::Content => &self.content,
            DocumentField::Category => &self.category,
            DocumentField::Source => &self.source,
        }
    }
}

/// A token that must occur in at least one of `fields`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub token: String,
    pub fields: Vec<DocumentField>,
}

/// Exact (case-insensitive) equality on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub field: DocumentField,
    pub value: String,
}

/// Conjunction of keyword and exact matches; the empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilter {
    pub keywords: Vec<KeywordMatch>,
    pub exact: Vec<FieldMatch>,
}

impl DocumentFilter {
    pub fn is_empty(&self) -> bool { self.keywords.is_empty() && self.exact.is_empty() }
}

/// A row of a structured answer: a matching document or an aggregate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredRecord {
    Document(Document),
    Group { key: String, count: usize },
}

/// Answer of the structured query tool.
///
/// For searches `count` is the total number of matches (which may exceed
/// `results.len()`); for aggregates it is the number of documents considered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredHits {
    pub count: usize,
    pub results: Vec<StructuredRecord>,
}
