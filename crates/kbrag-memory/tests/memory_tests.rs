use std::sync::Arc;
use std::time::Duration;

use kbrag_core::config::RetrievalConfig;
use kbrag_core::Error;
use kbrag_memory::ConversationMemory;

const TIMEOUT: Duration = Duration::from_secs(60);

fn queries(memory: &ConversationMemory, session: &str) -> Vec<String> {
    memory.get_context(session).expect("context").into_iter().map(|e| e.query).collect()
}

#[tokio::test(start_paused = true)]
async fn history_is_a_bounded_fifo() {
    let memory = ConversationMemory::new(3, TIMEOUT).expect("memory");
    for i in 0..4 {
        memory.append("s1", &format!("q{i}"), &format!("r{i}")).expect("append");
    }
    assert_eq!(queries(&memory, "s1"), vec!["q1", "q2", "q3"]);
    let context = memory.get_context("s1").expect("context");
    assert_eq!(context[2].response, "r3");
    assert!(context[0].at <= context[2].at);
}

#[tokio::test(start_paused = true)]
async fn unknown_session_has_no_context() {
    let memory = ConversationMemory::new(3, TIMEOUT).expect("memory");
    assert!(memory.get_context("nobody").expect("context").is_empty());
    assert_eq!(memory.session_count().expect("count"), 0);
}

#[tokio::test(start_paused = true)]
async fn idle_session_expires_on_next_access() {
    let memory = ConversationMemory::new(5, TIMEOUT).expect("memory");
    memory.append("s1", "where is the well pump manual", "in the barn binder").expect("append");
    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(queries(&memory, "s1").len(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(memory.get_context("s1").expect("context").is_empty());
    assert_eq!(memory.session_count().expect("count"), 0);
}

#[tokio::test(start_paused = true)]
async fn reading_does_not_extend_a_session() {
    let memory = ConversationMemory::new(5, TIMEOUT).expect("memory");
    memory.append("s1", "q", "r").expect("append");
    for _ in 0..3 {
        tokio::time::advance(Duration::from_secs(25)).await;
        let _ = memory.get_context("s1").expect("context");
    }
    assert!(memory.get_context("s1").expect("context").is_empty());
}

#[tokio::test(start_paused = true)]
async fn append_to_stale_session_starts_fresh() {
    let memory = ConversationMemory::new(5, TIMEOUT).expect("memory");
    memory.append("s1", "old", "r").expect("append");
    tokio::time::advance(Duration::from_secs(120)).await;
    memory.append("s1", "new", "r").expect("append");
    assert_eq!(queries(&memory, "s1"), vec!["new"]);
}

#[tokio::test(start_paused = true)]
async fn expire_if_stale_only_drops_idle_sessions() {
    let memory = ConversationMemory::new(5, TIMEOUT).expect("memory");
    memory.append("idle", "q", "r").expect("append");
    tokio::time::advance(Duration::from_secs(45)).await;
    memory.append("busy", "q", "r").expect("append");
    tokio::time::advance(Duration::from_secs(30)).await;

    assert!(!memory.expire_if_stale("busy").expect("expire"));
    assert!(memory.expire_if_stale("idle").expect("expire"));
    assert!(!memory.expire_if_stale("idle").expect("expire again"));
    assert_eq!(memory.session_count().expect("count"), 1);
}

#[tokio::test(start_paused = true)]
async fn sessions_are_independent() {
    let memory = ConversationMemory::new(2, TIMEOUT).expect("memory");
    memory.append("a", "a1", "r").expect("append");
    memory.append("b", "b1", "r").expect("append");
    memory.append("a", "a2", "r").expect("append");
    memory.append("a", "a3", "r").expect("append");
    assert_eq!(queries(&memory, "a"), vec!["a2", "a3"]);
    assert_eq!(queries(&memory, "b"), vec!["b1"]);
}

#[tokio::test(start_paused = true)]
async fn sweeper_reclaims_stale_sessions() {
    let memory = Arc::new(ConversationMemory::new(5, TIMEOUT).expect("memory"));
    for id in ["a", "b", "c"] {
        memory.append(id, "q", "r").expect("append");
    }
    assert_eq!(memory.sweep_expired().expect("sweep"), 0);

    let sweeper = memory.spawn_sweeper(Duration::from_secs(30));
    tokio::time::advance(Duration::from_secs(40)).await;
    memory.append("c", "again", "r").expect("append");
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(memory.session_count().expect("count"), 1);
    sweeper.abort();
}

#[tokio::test]
async fn concurrent_appends_to_one_session_keep_the_bound() {
    let memory = Arc::new(ConversationMemory::new(10, TIMEOUT).expect("memory"));
    let mut tasks = Vec::new();
    for t in 0..8 {
        let memory = Arc::clone(&memory);
        tasks.push(tokio::task::spawn_blocking(move || {
            for i in 0..25 {
                memory.append("shared", &format!("t{t}-q{i}"), "r").expect("append");
            }
        }));
    }
    for task in tasks {
        task.await.expect("join");
    }
    assert_eq!(memory.get_context("shared").expect("context").len(), 10);
}

#[test]
fn zero_history_is_invalid_config() {
    assert!(matches!(ConversationMemory::new(0, TIMEOUT), Err(Error::InvalidConfig(_))));
    let memory = ConversationMemory::from_config(&RetrievalConfig::default()).expect("memory");
    assert_eq!(memory.max_history(), 10);
    assert_eq!(memory.timeout(), Duration::from_secs(1800));
}
