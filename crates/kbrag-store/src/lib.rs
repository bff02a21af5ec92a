//! kbrag-store
//!
//! Document collections behind `kbrag_core::traits::DocumentStore` and the
//! structured query tool that searches and aggregates over them.

pub mod intent;
pub mod memory;
pub mod tantivy_store;
pub mod tantivy_utils;
pub mod tool;

pub use intent::IntentVocabulary;
pub use memory::InMemoryDocumentStore;
pub use tantivy_store::TantivyDocumentStore;
pub use tool::{parse_search_term, StructuredQueryTool};
