use serde::{Deserialize, Serialize};

use kbrag_core::config::RetrievalConfig;
use kbrag_store::intent::{normalize_tokens, IntentVocabulary};

/// Which retrieval sources a query needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryClass {
    VectorOnly,
    StructuredOnly,
    Both,
}

/// What to ask the structured query tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredRequest {
    Search { term: String },
    Aggregate { intent: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub class: QueryClass,
    /// `None` exactly when `class` is `VectorOnly`.
    pub structured: Option<StructuredRequest>,
}

/// Words that carry no search meaning once an aggregation keyword has been
/// found ("how many *documents mention* solar").
const FILLER_WORDS: &[&str] = &[
    "a", "about", "all", "an", "any", "are", "article", "articles", "be", "by", "contain", "containing",
    "contains", "did", "do", "document", "documents", "does", "entries", "entry", "file", "files", "for",
    "have", "in", "is", "item", "items", "me", "mention", "mentioning", "mentions", "my", "note", "notes",
    "of", "on", "our", "record", "records", "refer", "referring", "refers", "that", "the", "there", "to",
    "we", "what", "which", "with",
];

pub struct QueryClassifier {
    vocabulary: IntentVocabulary,
    /// Normalised token sequences of the aggregation keywords.
    keywords: Vec<Vec<String>>,
}

impl QueryClassifier {
    pub fn new(vocabulary: IntentVocabulary, aggregation_keywords: &[String]) -> Self {
        let keywords = aggregation_keywords
            .iter()
            .map(|k| normalize_tokens(k))
            .filter(|k| !k.is_empty())
            .collect();
        Self { vocabulary, keywords }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(IntentVocabulary::from_config(config), &config.aggregation_keywords)
    }

    pub fn vocabulary(&self) -> &IntentVocabulary { &self.vocabulary }

    pub fn classify(&self, query: &str) -> Classification {
        if self.vocabulary.match_intent(query).is_some() {
            return Classification {
                class: QueryClass::StructuredOnly,
                structured: Some(StructuredRequest::Aggregate { intent: query.trim().to_string() }),
            };
        }

        let tokens = normalize_tokens(query);
        let Some(residual) = self.strip_keywords(&tokens) else {
            return Classification { class: QueryClass::VectorOnly, structured: None };
        };
        let term: Vec<&str> = residual
            .iter()
            .map(String::as_str)
            .filter(|t| !FILLER_WORDS.contains(t))
            .collect();
        if term.is_empty() {
            Classification {
                class: QueryClass::StructuredOnly,
                structured: Some(StructuredRequest::Aggregate { intent: query.trim().to_string() }),
            }
        } else {
            Classification {
                class: QueryClass::Both,
                structured: Some(StructuredRequest::Search { term: term.join(" ") }),
            }
        }
    }

    /// Tokens left after removing every keyword occurrence, or `None` when
    /// no keyword occurs.
    fn strip_keywords(&self, tokens: &[String]) -> Option<Vec<String>> {
        let mut residual = Vec::with_capacity(tokens.len());
        let mut found = false;
        let mut i = 0;
        'scan: while i < tokens.len() {
            for keyword in &self.keywords {
                if tokens[i..].starts_with(keyword) {
                    found = true;
                    i += keyword.len();
                    continue 'scan;
                }
            }
            residual.push(tokens[i].clone());
            i += 1;
        }
        found.then_some(residual)
    }
}
