use std::fs;
use tempfile::TempDir;

use kbrag_core::chunker::{chunk_text, Chunker};
use kbrag_core::knowledge::KnowledgeBase;
use kbrag_core::Error;

#[test]
fn windows_overlap_by_exact_amount() {
    let windows = chunk_text("abcdefghij", 4, 1).expect("chunk");
    assert_eq!(windows, vec!["abcd", "defg", "ghij"]);
}

#[test]
fn short_document_is_a_single_window() {
    let windows = chunk_text("Short text", 100, 10).expect("chunk");
    assert_eq!(windows, vec!["Short text"]);
}

#[test]
fn chunking_counts_characters_not_bytes() {
    let windows = chunk_text("ééééé", 3, 1).expect("chunk");
    assert_eq!(windows, vec!["ééé", "ééé"]);
}

#[test]
fn overlap_not_smaller_than_size_is_invalid_config() {
    assert!(matches!(chunk_text("abc", 4, 4), Err(Error::InvalidConfig(_))));
    assert!(matches!(chunk_text("abc", 4, 9), Err(Error::InvalidConfig(_))));
    assert!(matches!(Chunker::new(0, 0), Err(Error::InvalidConfig(_))));
}

#[test]
fn empty_document_yields_no_chunks() {
    assert!(chunk_text("", 10, 2).expect("chunk").is_empty());
    assert!(chunk_text("   \n\n  ", 10, 2).expect("chunk").is_empty());
}

#[test]
fn chunking_is_deterministic() {
    let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
    let a = chunk_text(&text, 120, 30).expect("chunk");
    let b = chunk_text(&text, 120, 30).expect("chunk");
    assert_eq!(a, b);
    for pair in a.windows(2) {
        let tail: String = pair[0].chars().rev().take(30).collect::<Vec<_>>().into_iter().rev().collect();
        assert!(pair[1].starts_with(&tail), "consecutive windows share the overlap");
    }
}

#[test]
fn load_directory_assigns_source_category_and_positions() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("fire")).unwrap();
    fs::write(dir.join("fire/starting.txt"), "Use dry tinder and a ferro rod.").unwrap();
    fs::write(dir.join("water.md"), "Boil water for one minute.").unwrap();
    fs::write(dir.join("ignored.bin"), [0u8, 1, 2]).unwrap();

    let docs = KnowledgeBase::load_directory(dir).expect("load");
    assert_eq!(docs.len(), 2, "only .txt and .md files are loaded");
    assert_eq!(docs[0].source, "fire/starting.txt");
    assert_eq!(docs[0].category, "fire");
    assert_eq!(docs[0].title, "starting");
    assert_eq!(docs[1].category, "misc");

    let chunker = Chunker::new(10, 2).unwrap();
    let chunks = chunker.chunk(&docs[0]);
    assert!(chunks.len() > 1);
    for (i, c) in chunks.iter().enumerate() {
        assert_eq!(c.position, i);
        assert_eq!(c.source, "fire/starting.txt");
        assert_eq!(c.category, "fire");
    }
}

#[test]
fn load_empty_directory_is_not_an_error() {
    let tmp = TempDir::new().unwrap();
    let docs = KnowledgeBase::load_directory(tmp.path()).expect("load");
    assert!(docs.is_empty());
}

#[test]
fn chunker_positions_follow_chunk_text_windows() {
    use kbrag_core::knowledge::SourceDocument;

    let document = SourceDocument {
        source: "garden/beans.md".into(),
        category: "garden".into(),
        title: "beans".into(),
        content: "Pole beans climb. Bush beans sprawl. Both fix nitrogen.".into(),
    };
    let chunker = Chunker::new(20, 5).expect("chunker");
    let chunks = chunker.chunk(&document);
    let expected = chunk_text(&document.content, 20, 5).expect("chunk");
    assert!(expected.len() > 1);
    assert_eq!(chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>(), expected);
    assert!(chunks.iter().enumerate().all(|(i, c)| c.position == i && c.category == "garden"));
}
