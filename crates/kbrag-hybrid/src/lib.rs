//! kbrag-hybrid
//!
//! Query classification and the retrieval orchestrator that fuses vector
//! search, structured queries and conversation memory into one bundle.

pub mod bundle;
pub mod classify;
pub mod model;
pub mod orchestrator;

pub use bundle::{Completeness, RetrievalBundle, SourceStatus};
pub use classify::{Classification, QueryClass, QueryClassifier, StructuredRequest};
pub use model::{ExtractiveModel, LanguageModel};
pub use orchestrator::{Answer, RetrievalOrchestrator};
