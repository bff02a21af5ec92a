use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use kbrag_core::chunker::Chunker;
use kbrag_core::config::{expand_path, Config, DataConfig, RetrievalConfig};
use kbrag_core::knowledge::{KnowledgeBase, SourceDocument};
use kbrag_core::types::Document;
use kbrag_embed::get_default_embedder;
use kbrag_hybrid::{ExtractiveModel, RetrievalOrchestrator};
use kbrag_memory::ConversationMemory;
use kbrag_store::{StructuredQueryTool, TantivyDocumentStore};
use kbrag_vector::VectorIndex;

const EMBED_BATCH: usize = 32;

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {prog} ingest [dir]");
    eprintln!("       {prog} query [--json] \"<query>\"");
    eprintln!("       {prog} chat [--session <id>]");
    std::process::exit(1);
}

fn parse_args() -> (String, String, Vec<String>) {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.is_empty() {
        usage(&prog);
    }
    let cmd = args.remove(0);
    (prog, cmd, args)
}

fn flag_value(args: &[String], name: &str) -> Option<String> {
    args.windows(2).find(|w| w[0] == name).map(|w| w[1].clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let retrieval = config.retrieval()?;
    let data = config.data()?;
    let (prog, cmd, args) = parse_args();
    match cmd.as_str() {
        "ingest" => ingest(&retrieval, &data, args.first().map(PathBuf::from)),
        "query" => {
            let json = args.iter().any(|a| a == "--json");
            let text = args.iter().filter(|a| !a.starts_with("--")).cloned().collect::<Vec<_>>().join(" ");
            if text.trim().is_empty() {
                usage(&prog);
            }
            query(&retrieval, &data, &text, json).await
        }
        "chat" => {
            let session = flag_value(&args, "--session").unwrap_or_else(|| format!("chat-{}", std::process::id()));
            chat(&retrieval, &data, &session).await
        }
        _ => {
            eprintln!("Unknown command: {}", cmd);
            usage(&prog);
        }
    }
}

fn ingest(retrieval: &RetrievalConfig, data: &DataConfig, dir: Option<PathBuf>) -> Result<()> {
    let root = dir.unwrap_or_else(|| expand_path(&data.knowledge_dir));
    println!("Ingesting from {}", root.display());
    let documents = KnowledgeBase::load_directory(&root)?;
    if documents.is_empty() {
        bail!("no .txt or .md files under {}", root.display());
    }
    let chunker = Chunker::new(retrieval.chunk_size, retrieval.chunk_overlap)?;
    let chunks = chunker.chunk_all(&documents);

    let index = VectorIndex::new(get_default_embedder(retrieval)?);
    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    for batch in chunks.chunks(EMBED_BATCH) {
        index.index(batch)?;
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("embedded");

    let snapshot = expand_path(&data.index_snapshot);
    index.save_snapshot(&snapshot)?;

    let store = TantivyDocumentStore::open(expand_path(&data.store_dir))?;
    let records: Vec<Document> = documents.iter().map(SourceDocument::to_document).collect();
    store.insert(&retrieval.structured_collection, &records)?;

    println!(
        "Ingest complete: {} documents, {} chunks, snapshot at {}",
        documents.len(),
        chunks.len(),
        snapshot.display()
    );
    Ok(())
}

fn build_orchestrator(retrieval: &RetrievalConfig, data: &DataConfig) -> Result<RetrievalOrchestrator> {
    let embedder = get_default_embedder(retrieval)?;
    let snapshot = expand_path(&data.index_snapshot);
    let index = if snapshot.exists() {
        VectorIndex::load_snapshot(&snapshot, embedder).with_context(|| format!("loading {}", snapshot.display()))?
    } else {
        tracing::warn!(path = %snapshot.display(), "no index snapshot; run `ingest` first");
        VectorIndex::new(embedder)
    };
    let store = Arc::new(TantivyDocumentStore::open(expand_path(&data.store_dir))?);
    let tool = Arc::new(StructuredQueryTool::from_config(store, retrieval));
    let memory = Arc::new(ConversationMemory::from_config(retrieval)?);
    Ok(RetrievalOrchestrator::new(retrieval.clone(), Arc::new(index), tool, memory)?)
}

async fn query(retrieval: &RetrievalConfig, data: &DataConfig, text: &str, json: bool) -> Result<()> {
    let orchestrator = build_orchestrator(retrieval, data)?;
    let bundle = orchestrator.retrieve(text, None).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }
    println!("class: {:?}", bundle.class);
    print!("{}", bundle.render_context());
    if !bundle.completeness.is_complete() {
        eprintln!("warning: partial results: {:?}", bundle.completeness);
    }
    Ok(())
}

async fn chat(retrieval: &RetrievalConfig, data: &DataConfig, session: &str) -> Result<()> {
    let orchestrator = build_orchestrator(retrieval, data)?;
    let _sweeper = orchestrator.memory().spawn_sweeper(Duration::from_secs(60));
    let model = ExtractiveModel;
    println!("Ask a question (empty line or Ctrl-D to quit).");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            break;
        }
        match orchestrator.answer(question, Some(session), &model).await {
            Ok(answer) => {
                println!("{}", answer.text);
                if !answer.bundle.completeness.is_complete() {
                    println!("(partial results: {:?})", answer.bundle.completeness);
                }
            }
            Err(e) => eprintln!("Error: {e}"),
        }
    }
    Ok(())
}
