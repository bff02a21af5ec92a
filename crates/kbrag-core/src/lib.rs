//! kbrag-core
//!
//! Shared vocabulary of the retrieval workspace: domain types, the error
//! taxonomy, configuration, the embedder and document-store boundaries, and
//! the chunker that turns knowledge-base files into indexable chunks.

pub mod chunker;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
