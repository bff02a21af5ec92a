use std::sync::Arc;

use futures::future::{self, BoxFuture};
use tempfile::TempDir;

use kbrag_core::config::{AggregateOp, IntentRule};
use kbrag_core::traits::DocumentStore;
use kbrag_core::types::{Document, DocumentField, DocumentFilter, StructuredRecord};
use kbrag_core::Error;
use kbrag_store::intent::normalize;
use kbrag_store::{
    parse_search_term, InMemoryDocumentStore, IntentVocabulary, StructuredQueryTool, TantivyDocumentStore,
};

fn record(i: usize) -> Document {
    let (category, topic) = match i % 3 {
        0 => ("water", "rain barrel filtration"),
        1 => ("energy", "solar panel wiring"),
        _ => ("garden", "compost and seed saving"),
    };
    Document {
        id: format!("doc-{i:02}"),
        title: format!("Note {i} on {category}"),
        content: format!("Field notes about {topic}, entry {i}."),
        category: category.to_string(),
        source: format!("{category}/note-{i}.md"),
    }
}

fn forty_two_records() -> Vec<Document> {
    (0..42).map(record).collect()
}

fn memory_tool() -> StructuredQueryTool {
    let store = InMemoryDocumentStore::new();
    store.insert("documents", forty_two_records()).expect("insert");
    StructuredQueryTool::new(Arc::new(store), IntentVocabulary::default())
}

/// Every call fails as if the backend were unreachable.
struct OfflineStore;

impl DocumentStore for OfflineStore {
    fn collection_exists<'a>(&'a self, _: &'a str) -> BoxFuture<'a, kbrag_core::Result<bool>> {
        Box::pin(future::ready(Err(Error::ConnectionError("connection refused".into()))))
    }
    fn find<'a>(&'a self, _: &'a str, _: &'a DocumentFilter, _: usize) -> BoxFuture<'a, kbrag_core::Result<Vec<Document>>> {
        Box::pin(future::ready(Err(Error::ConnectionError("connection refused".into()))))
    }
    fn count<'a>(&'a self, _: &'a str, _: &'a DocumentFilter) -> BoxFuture<'a, kbrag_core::Result<usize>> {
        Box::pin(future::ready(Err(Error::ConnectionError("connection refused".into()))))
    }
    fn count_by<'a>(&'a self, _: &'a str, _: DocumentField) -> BoxFuture<'a, kbrag_core::Result<Vec<(String, usize)>>> {
        Box::pin(future::ready(Err(Error::ConnectionError("connection refused".into()))))
    }
}

#[test]
fn vocabulary_matches_normalised_phrases_only() {
    let vocab = IntentVocabulary::default();
    assert_eq!(vocab.match_intent("Count all documents").map(|r| r.name.as_str()), Some("count_all"));
    assert_eq!(vocab.match_intent("  how many   DOCUMENTS are there?? ").map(|r| r.name.as_str()), Some("count_all"));
    assert_eq!(
        vocab.match_intent("How many documents per category?").map(|r| r.name.as_str()),
        Some("count_by_category")
    );
    assert!(vocab.match_intent("how many documents mention solar").is_none());
    assert!(vocab.match_intent("").is_none());
    assert_eq!(normalize("  Hello,  World! "), "hello world");
}

#[test]
fn vocabulary_is_configurable_data() {
    let vocab = IntentVocabulary::new(vec![IntentRule {
        name: "per_source".into(),
        phrases: vec!["Tally by file".into()],
        operation: AggregateOp::CountBy { field: DocumentField::Source },
    }]);
    assert!(vocab.match_intent("tally by file").is_some());
    assert!(vocab.match_intent("count all documents").is_none());
}

#[test]
fn search_term_grammar() {
    let filter = parse_search_term("Category:Water title:barrel filtration, source:\"water/note-0.md\"");
    assert_eq!(filter.exact.len(), 2);
    assert_eq!(filter.exact[0].field, DocumentField::Category);
    assert_eq!(filter.exact[0].value, "Water");
    assert_eq!(filter.exact[1].value, "water/note-0.md");
    assert_eq!(filter.keywords.len(), 2);
    assert_eq!(filter.keywords[0].token, "barrel");
    assert_eq!(filter.keywords[0].fields, vec![DocumentField::Title]);
    assert_eq!(filter.keywords[1].token, "filtration");
    assert_eq!(filter.keywords[1].fields, vec![DocumentField::Title, DocumentField::Content]);
    assert!(parse_search_term("   ").is_empty());
}

#[tokio::test]
async fn count_all_documents_over_forty_two_records() {
    let hits = memory_tool().aggregate("count all documents", "documents").await.expect("aggregate");
    assert_eq!(hits.count, 42);
    assert!(hits.results.is_empty());
}

#[tokio::test]
async fn count_by_category_groups_sorted_by_key() {
    let hits = memory_tool().aggregate("documents per category", "documents").await.expect("aggregate");
    assert_eq!(hits.count, 42);
    assert_eq!(
        hits.results,
        vec![
            StructuredRecord::Group { key: "energy".into(), count: 14 },
            StructuredRecord::Group { key: "garden".into(), count: 14 },
            StructuredRecord::Group { key: "water".into(), count: 14 },
        ]
    );
}

#[tokio::test]
async fn search_reports_total_and_honours_limit() {
    let tool = memory_tool();
    let hits = tool.search("solar", "documents", 5).await.expect("search");
    assert_eq!(hits.count, 14);
    assert_eq!(hits.results.len(), 5);

    let hits = tool.search("category:WATER rain", "documents", 50).await.expect("search");
    assert_eq!(hits.count, 14);
    assert!(hits.results.iter().all(|r| matches!(r, StructuredRecord::Document(d) if d.category == "water")));

    let everything = tool.search("", "documents", 100).await.expect("search");
    assert_eq!(everything.count, 42);

    assert!(matches!(tool.search("solar", "documents", 0).await, Err(Error::InvalidArgument(_))));
}

#[tokio::test]
async fn unknown_collection_and_intent_errors() {
    let tool = memory_tool();
    assert!(matches!(tool.search("solar", "people", 5).await, Err(Error::CollectionNotFound(_))));
    assert!(matches!(tool.aggregate("count all documents", "people").await, Err(Error::CollectionNotFound(_))));
    assert!(matches!(tool.aggregate("average word length", "documents").await, Err(Error::UnsupportedIntent(_))));
}

#[tokio::test]
async fn unreachable_store_is_a_recoverable_connection_error() {
    let tool = StructuredQueryTool::new(Arc::new(OfflineStore), IntentVocabulary::default());
    let err = tool.search("solar", "documents", 5).await.expect_err("offline");
    assert!(matches!(err, Error::ConnectionError(_)));
    assert!(err.is_recoverable());
    assert!(matches!(tool.aggregate("count all documents", "documents").await, Err(Error::ConnectionError(_))));
}

#[tokio::test]
async fn memory_store_upserts_by_id() {
    let store = InMemoryDocumentStore::new();
    assert_eq!(store.insert("documents", forty_two_records()).expect("insert"), 42);
    let mut changed = record(0);
    changed.title = "Replaced".into();
    assert_eq!(store.insert("documents", vec![changed]).expect("upsert"), 0);
    assert_eq!(store.count("documents", &DocumentFilter::default()).await.expect("count"), 42);
    let found = store.find("documents", &parse_search_term("id:doc-00"), 10).await.expect("find");
    assert_eq!(found[0].title, "Replaced");
}

#[tokio::test]
async fn tantivy_store_searches_and_aggregates() {
    let store = TantivyDocumentStore::in_ram();
    store.insert("documents", &forty_two_records()).expect("insert");
    let tool = StructuredQueryTool::new(Arc::new(store), IntentVocabulary::default());

    let all = tool.aggregate("How many documents are there?", "documents").await.expect("aggregate");
    assert_eq!(all.count, 42);

    let solar = tool.search("Solar wiring", "documents", 3).await.expect("search");
    assert_eq!(solar.count, 14);
    assert_eq!(solar.results.len(), 3);

    let exact = tool.search("category:Garden title:note", "documents", 50).await.expect("search");
    assert_eq!(exact.count, 14);

    // Stop words alone do not narrow the match.
    let stop = tool.search("the", "documents", 1).await.expect("search");
    assert_eq!(stop.count, 42);

    let by_source = tool.aggregate("count by source", "documents").await.expect("aggregate");
    assert_eq!(by_source.results.len(), 42);
    assert_eq!(by_source.count, 42);

    assert!(matches!(tool.search("solar", "people", 5).await, Err(Error::CollectionNotFound(_))));
}

#[tokio::test]
async fn tantivy_store_persists_collections_on_disk() {
    let tmp = TempDir::new().expect("tmp");
    {
        let store = TantivyDocumentStore::open(tmp.path()).expect("open");
        store.insert("documents", &forty_two_records()).expect("insert");
        let mut changed = record(1);
        changed.content = "Replaced body about geothermal loops".into();
        store.insert("documents", &[changed]).expect("upsert");
    }
    let store = TantivyDocumentStore::open(tmp.path()).expect("reopen");
    assert!(store.collection_exists("documents").await.expect("exists"));
    assert_eq!(store.count("documents", &DocumentFilter::default()).await.expect("count"), 42);
    let hits = store.find("documents", &parse_search_term("geothermal"), 5).await.expect("find");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "doc-01");
    assert!(matches!(store.create_collection("../escape"), Err(Error::InvalidArgument(_))));
}
