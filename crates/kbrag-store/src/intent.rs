//! Aggregation intent vocabulary.
//!
//! Intents are plain data (`IntentRule`s from configuration). A query names
//! an intent when its normalised form equals one of the rule's normalised
//! phrases.

use kbrag_core::config::{IntentRule, RetrievalConfig};

/// Lowercase, strip punctuation from token edges, collapse whitespace.
pub fn normalize_tokens(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn normalize(text: &str) -> String {
    normalize_tokens(text).join(" ")
}

#[derive(Debug, Clone)]
pub struct IntentVocabulary {
    rules: Vec<IntentRule>,
    /// `(normalised phrase, rule index)`
    phrases: Vec<(String, usize)>,
}

impl IntentVocabulary {
    pub fn new(rules: Vec<IntentRule>) -> Self {
        let phrases = rules
            .iter()
            .enumerate()
            .flat_map(|(i, rule)| rule.phrases.iter().map(move |p| (normalize(p), i)))
            .filter(|(p, _)| !p.is_empty())
            .collect();
        Self { rules, phrases }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.intents.clone())
    }

    /// First rule (in configuration order) with a phrase equal to `intent`.
    pub fn match_intent(&self, intent: &str) -> Option<&IntentRule> {
        let needle = normalize(intent);
        if needle.is_empty() {
            return None;
        }
        self.phrases.iter().find(|(p, _)| *p == needle).map(|&(_, i)| &self.rules[i])
    }

    pub fn rules(&self) -> &[IntentRule] { &self.rules }
    pub fn is_empty(&self) -> bool { self.rules.is_empty() }
}

impl Default for IntentVocabulary {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}
