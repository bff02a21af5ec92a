use std::fmt::Write as _;

use serde::Serialize;

use kbrag_core::types::{SearchResult, StructuredHits, StructuredRecord};
use kbrag_core::Error;
use kbrag_memory::Exchange;

use crate::classify::{QueryClass, StructuredRequest};

pub const CONVERSATION_HEADER: &str = "### Conversation";
pub const EXCERPTS_HEADER: &str = "### Excerpts";
pub const STRUCTURED_HEADER: &str = "### Structured results";
pub const QUESTION_HEADER: &str = "### Question";

/// Outcome of one retrieval source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Complete,
    NotRequested,
    Degraded { reason: String, recoverable: bool },
}

impl SourceStatus {
    pub fn degraded(error: &Error) -> Self {
        SourceStatus::Degraded { reason: error.to_string(), recoverable: error.is_recoverable() }
    }

    pub fn is_complete(&self) -> bool { matches!(self, SourceStatus::Complete) }
    pub fn is_degraded(&self) -> bool { matches!(self, SourceStatus::Degraded { .. }) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completeness {
    pub vector: SourceStatus,
    pub structured: SourceStatus,
}

impl Completeness {
    /// No requested source was degraded.
    pub fn is_complete(&self) -> bool {
        !self.vector.is_degraded() && !self.structured.is_degraded()
    }
}

/// Everything retrieved for one query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalBundle {
    pub query: String,
    pub class: QueryClass,
    pub structured_request: Option<StructuredRequest>,
    pub vector_hits: Vec<SearchResult>,
    pub structured_hits: Option<StructuredHits>,
    pub memory_context: Vec<Exchange>,
    pub completeness: Completeness,
}

impl RetrievalBundle {
    /// Grounding prompt for a language model: prior turns, excerpts,
    /// structured results, then the question.
    pub fn render_context(&self) -> String {
        let mut out = String::new();
        if !self.memory_context.is_empty() {
            let _ = writeln!(out, "{CONVERSATION_HEADER}");
            for exchange in &self.memory_context {
                let _ = writeln!(out, "User: {}", exchange.query);
                let _ = writeln!(out, "Assistant: {}", exchange.response);
            }
            out.push('\n');
        }

        let _ = writeln!(out, "{EXCERPTS_HEADER}");
        if self.vector_hits.is_empty() {
            let _ = writeln!(out, "(none)");
        }
        for (i, hit) in self.vector_hits.iter().enumerate() {
            let _ = writeln!(
                out,
                "[{}] {} #{} (score {:.2})",
                i + 1,
                hit.metadata.source,
                hit.metadata.position,
                hit.similarity_score
            );
            let _ = writeln!(out, "{}", hit.content.trim());
        }
        if let SourceStatus::Degraded { reason, .. } = &self.completeness.vector {
            let _ = writeln!(out, "Note: excerpts unavailable ({reason})");
        }
        out.push('\n');

        if let Some(hits) = &self.structured_hits {
            let _ = writeln!(out, "{STRUCTURED_HEADER}");
            let _ = writeln!(out, "Count: {}", hits.count);
            for record in &hits.results {
                match record {
                    StructuredRecord::Document(d) => {
                        let _ = writeln!(out, "- {} [{}] ({})", d.title, d.category, d.source);
                    }
                    StructuredRecord::Group { key, count } => {
                        let _ = writeln!(out, "- {key}: {count}");
                    }
                }
            }
            out.push('\n');
        } else if let SourceStatus::Degraded { reason, .. } = &self.completeness.structured {
            let _ = writeln!(out, "{STRUCTURED_HEADER}");
            let _ = writeln!(out, "Note: structured results unavailable ({reason})");
            out.push('\n');
        }

        let _ = writeln!(out, "{QUESTION_HEADER}");
        let _ = writeln!(out, "{}", self.query);
        out
    }
}
