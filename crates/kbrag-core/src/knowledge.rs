use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::Document;

const EXTENSIONS: &[&str] = &["txt", "md"];

/// A raw knowledge-base document before chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub source: String,
    pub category: String,
    pub title: String,
    pub content: String,
}

impl SourceDocument {
    pub fn to_document(&self) -> Document {
        Document {
            id: self.source.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            category: self.category.clone(),
            source: self.source.clone(),
        }
    }
}

/// Loads `.txt` and `.md` files under a directory; the parent directory
/// (relative to the root) becomes the category.
pub struct KnowledgeBase;

impl KnowledgeBase {
    pub fn load_directory(root: &Path) -> Result<Vec<SourceDocument>> {
        let files = list_files(root);
        if files.is_empty() {
            tracing::warn!(dir = %root.display(), "no knowledge-base files found");
            return Ok(vec![]);
        }
        let mut documents = Vec::with_capacity(files.len());
        for (index, path) in files.iter().enumerate() {
            tracing::debug!(file = %path.display(), "loading {}/{}", index + 1, files.len());
            let content = read_file_content(path)?;
            let relative = path.strip_prefix(root).unwrap_or(path);
            documents.push(SourceDocument {
                source: relative.to_string_lossy().replace('\\', "/"),
                category: category_from_path(relative),
                title: path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default(),
                content,
            });
        }
        tracing::info!(dir = %root.display(), documents = documents.len(), "loaded knowledge base");
        Ok(documents)
    }
}

fn read_file_content(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(path)?).to_string()),
    }
}

fn category_from_path(relative: &Path) -> String {
    match relative.parent().and_then(|p| p.to_str()) {
        Some(parent) if !parent.is_empty() => parent.replace('\\', "/"),
        _ => "misc".to_string(),
    }
}

fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()).is_some_and(|ext| EXTENSIONS.contains(&ext)))
        .collect();
    files.sort();
    files
}
