//! Boundary to the text-completion service that consumes retrieval bundles.

use futures::future::{self, BoxFuture};

use crate::bundle::{EXCERPTS_HEADER, STRUCTURED_HEADER};

pub trait LanguageModel: Send + Sync {
    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, anyhow::Result<String>>;
}

/// Offline stand-in that answers with the structured results and the best
/// excerpt of a prompt rendered by `RetrievalBundle::render_context`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveModel;

const NOTHING_FOUND: &str = "I could not find anything relevant in the knowledge base.";

fn section<'a>(prompt: &'a str, header: &str) -> Vec<&'a str> {
    prompt
        .lines()
        .skip_while(|l| l.trim() != header)
        .skip(1)
        .take_while(|l| !l.starts_with("### "))
        .filter(|l| !l.trim().is_empty())
        .collect()
}

impl ExtractiveModel {
    pub fn answer(prompt: &str) -> String {
        let mut parts = Vec::new();

        let structured: Vec<&str> = section(prompt, STRUCTURED_HEADER)
            .into_iter()
            .filter(|l| !l.starts_with("Note:"))
            .collect();
        if !structured.is_empty() {
            parts.push(structured.join("\n"));
        }

        // First excerpt body: lines after "[1] ..." up to the next entry.
        let best: Vec<&str> = section(prompt, EXCERPTS_HEADER)
            .into_iter()
            .skip_while(|l| !l.starts_with("[1]"))
            .skip(1)
            .take_while(|l| !l.starts_with('[') && !l.starts_with("Note:"))
            .collect();
        if !best.is_empty() {
            parts.push(best.join("\n"));
        }

        if parts.is_empty() {
            NOTHING_FOUND.to_string()
        } else {
            parts.join("\n\n")
        }
    }
}

impl LanguageModel for ExtractiveModel {
    fn complete<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(future::ready(Ok(Self::answer(prompt))))
    }
}
