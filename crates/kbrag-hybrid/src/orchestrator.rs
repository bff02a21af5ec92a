use std::sync::Arc;

use serde::Serialize;
use tokio::time::{timeout_at, Instant};

use kbrag_core::config::RetrievalConfig;
use kbrag_core::error::{Error, Result};
use kbrag_core::types::{SearchResult, StructuredHits};
use kbrag_memory::ConversationMemory;
use kbrag_store::StructuredQueryTool;
use kbrag_vector::VectorIndex;

use crate::bundle::{Completeness, RetrievalBundle, SourceStatus};
use crate::classify::{QueryClassifier, StructuredRequest};
use crate::model::LanguageModel;

/// A model answer together with the evidence it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub bundle: RetrievalBundle,
}

/// Classifies each query, runs the vector and structured sources side by
/// side, and assembles a bundle with the session's recent history.
///
/// The vector index is always consulted. A failed or timed-out source is
/// reported in the bundle's `completeness`; the call only fails when no
/// requested source produced anything.
pub struct RetrievalOrchestrator {
    config: RetrievalConfig,
    index: Arc<VectorIndex>,
    tool: Arc<StructuredQueryTool>,
    memory: Arc<ConversationMemory>,
    classifier: QueryClassifier,
}

impl RetrievalOrchestrator {
    pub fn new(
        config: RetrievalConfig,
        index: Arc<VectorIndex>,
        tool: Arc<StructuredQueryTool>,
        memory: Arc<ConversationMemory>,
    ) -> Result<Self> {
        config.validate()?;
        let classifier = QueryClassifier::from_config(&config);
        Ok(Self { config, index, tool, memory, classifier })
    }

    pub fn config(&self) -> &RetrievalConfig { &self.config }
    pub fn index(&self) -> &Arc<VectorIndex> { &self.index }
    pub fn memory(&self) -> &Arc<ConversationMemory> { &self.memory }
    pub fn classifier(&self) -> &QueryClassifier { &self.classifier }

    /// Retrieve with each source bounded only by its own timeout. Without a
    /// session the bundle carries no conversation history.
    pub async fn retrieve(&self, query: &str, session_id: Option<&str>) -> Result<RetrievalBundle> {
        let deadline = Instant::now() + self.config.embed_timeout().max(self.config.store_timeout());
        self.retrieve_with_deadline(query, session_id, deadline).await
    }

    pub async fn retrieve_with_deadline(
        &self,
        query: &str,
        session_id: Option<&str>,
        deadline: Instant,
    ) -> Result<RetrievalBundle> {
        let classification = self.classifier.classify(query);
        tracing::debug!(query, class = ?classification.class, "classified query");

        let structured = async {
            match &classification.structured {
                Some(request) => Some(self.structured_query(request, deadline).await),
                None => None,
            }
        };
        let (vector, structured) = tokio::join!(self.vector_search(query, deadline), structured);

        let (vector_hits, vector_status) = match vector {
            Ok(hits) => (hits, SourceStatus::Complete),
            Err(e) => {
                tracing::warn!(error = %e, recoverable = e.is_recoverable(), "vector search degraded");
                (Vec::new(), SourceStatus::degraded(&e))
            }
        };
        let (structured_hits, structured_status) = match structured {
            None => (None, SourceStatus::NotRequested),
            Some(Ok(hits)) => (Some(hits), SourceStatus::Complete),
            Some(Err(e)) => {
                tracing::warn!(error = %e, recoverable = e.is_recoverable(), "structured query degraded");
                (None, SourceStatus::degraded(&e))
            }
        };

        if !vector_status.is_complete() && !structured_status.is_complete() {
            let reason = [("vector", &vector_status), ("structured", &structured_status)]
                .into_iter()
                .filter_map(|(name, status)| match status {
                    SourceStatus::Degraded { reason, .. } => Some(format!("{name}: {reason}")),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::RetrievalUnavailable(reason));
        }

        let memory_context = match session_id {
            Some(id) => self.memory.get_context(id)?,
            None => Vec::new(),
        };
        tracing::debug!(
            vector_hits = vector_hits.len(),
            structured = structured_hits.as_ref().map(|h| h.count),
            history = memory_context.len(),
            "assembled retrieval bundle"
        );
        Ok(RetrievalBundle {
            query: query.to_string(),
            class: classification.class,
            structured_request: classification.structured,
            vector_hits,
            structured_hits,
            memory_context,
            completeness: Completeness { vector: vector_status, structured: structured_status },
        })
    }

    pub fn record_exchange(&self, session_id: &str, query: &str, response: &str) -> Result<()> {
        self.memory.append(session_id, query, response)
    }

    /// Retrieve and complete the grounding prompt with `model`. The exchange
    /// is recorded only when a session is given.
    pub async fn answer(&self, query: &str, session_id: Option<&str>, model: &dyn LanguageModel) -> Result<Answer> {
        let bundle = self.retrieve(query, session_id).await?;
        let prompt = bundle.render_context();
        let text = model
            .complete(&prompt)
            .await
            .map_err(|e| Error::ConnectionError(format!("language model: {e:#}")))?;
        if let Some(id) = session_id {
            self.record_exchange(id, query, &text)?;
        }
        Ok(Answer { text, bundle })
    }

    async fn vector_search(&self, query: &str, deadline: Instant) -> Result<Vec<SearchResult>> {
        let index = Arc::clone(&self.index);
        let query = query.to_string();
        let (k, threshold) = (self.config.max_retrieval_results, self.config.similarity_threshold);
        let until = deadline.min(Instant::now() + self.config.embed_timeout());
        // Embedding and the linear scan are CPU-bound.
        let task = tokio::task::spawn_blocking(move || index.similarity_search(&query, k, threshold));
        match timeout_at(until, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Internal(format!("vector search task failed: {e}"))),
            Err(_) => {
                // Dropping the JoinHandle detaches the task; it runs to completion on the blocking pool.
                tracing::debug!("vector search timed out; blocking task left running");
                Err(Error::Timeout("vector search".into()))
            }
        }
    }

    async fn structured_query(&self, request: &StructuredRequest, deadline: Instant) -> Result<StructuredHits> {
        let collection = self.config.structured_collection.as_str();
        let until = deadline.min(Instant::now() + self.config.store_timeout());
        let call = async {
            match request {
                StructuredRequest::Search { term } => {
                    self.tool.search(term, collection, self.config.structured_limit).await
                }
                StructuredRequest::Aggregate { intent } => self.tool.aggregate(intent, collection).await,
            }
        };
        timeout_at(until, call)
            .await
            .map_err(|_| Error::Timeout("structured query".into()))?
    }
}
