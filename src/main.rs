use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use codeindex::bench::{run_benchmark, BenchmarkConfig};
use codeindex::config::{load_config, Config};
use codeindex::embedding::{EmbeddingProvider, FakeEmbeddingProvider, OpenAiEmbeddingProvider};
use codeindex::indexer::Indexer;
use codeindex::progress::SpinnerProgressSink;
use codeindex::retriever::Retriever;
use codeindex::vector_store::{InMemoryVectorStore, QdrantVectorStore, VectorStore};

#[derive(Debug, Parser)]
#[command(name = "codeindex")]
#[command(version)]
#[command(about = "Incremental semantic code search over a local codebase")]
struct Cli {
    /// Root directory to index (defaults to the current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan, chunk, embed, and upsert everything that changed since the last run.
    Index,
    /// Run a semantic search and print the matching spans.
    Search {
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Drop the vector-store collection, clear the embedding cache, and delete the Merkle summary.
    Reset,
    /// Print the number of records currently held by the vector store.
    Stats,
    /// Run the retrieval benchmark harness against a BEIR-shaped dataset.
    Bench {
        corpus: PathBuf,
        queries: PathBuf,
        qrels: PathBuf,
        #[arg(long, default_value = "10000")]
        max_corpus: usize,
        #[arg(long, default_value = "1000")]
        max_queries: usize,
    },
}

fn build_embedder(cfg: &Config) -> Arc<dyn EmbeddingProvider> {
    match &cfg.openai_api_key {
        Some(key) => Arc::new(OpenAiEmbeddingProvider::new(key.clone(), cfg.embedding_model.clone(), 1536)),
        None => {
            tracing::warn!("no OPENAI_API_KEY set, falling back to the deterministic local embedder");
            Arc::new(FakeEmbeddingProvider::new(256))
        }
    }
}

fn build_store(cfg: &Config) -> Arc<dyn VectorStore> {
    if std::env::var("CODEINDEX_IN_MEMORY").is_ok() {
        return Arc::new(InMemoryVectorStore::new());
    }
    Arc::new(QdrantVectorStore::new(cfg.qdrant_url.clone(), cfg.collection_name.clone()))
}

async fn run(cli: Cli) -> Result<()> {
    let root = match cli.root {
        Some(r) => r,
        None => std::env::current_dir().context("failed to get current dir")?,
    };
    let cfg = load_config(&root);

    match cli.cmd {
        Command::Index => {
            let indexer = Indexer::new(cfg.clone(), build_embedder(&cfg), build_store(&cfg));
            indexer.init().await.context("failed to initialize vector store collection")?;
            let sink = SpinnerProgressSink::new();
            let stats = indexer.index(&sink, &CancellationToken::new()).await?;
            println!(
                "files={} chunks={} new={} cached={} elapsed_ms={}",
                stats.total_files, stats.total_chunks, stats.new_chunks, stats.cached_chunks, stats.elapsed_ms
            );
        }
        Command::Search { query, k } => {
            let retriever = Retriever::new(build_embedder(&cfg), build_store(&cfg), cfg.root_dir.clone());
            let hits = retriever.search(&query, k.unwrap_or(cfg.top_k)).await?;
            for hit in hits {
                println!(
                    "{:.4}  {}:{}-{}  {}",
                    hit.score,
                    hit.payload.path,
                    hit.payload.start_line,
                    hit.payload.end_line,
                    hit.payload.symbol_name.as_deref().unwrap_or("")
                );
                println!("{}", hit.text);
                println!("---");
            }
        }
        Command::Reset => {
            let indexer = Indexer::new(cfg.clone(), build_embedder(&cfg), build_store(&cfg));
            indexer.reset().await?;
            println!("index reset");
        }
        Command::Stats => {
            let indexer = Indexer::new(cfg.clone(), build_embedder(&cfg), build_store(&cfg));
            let count = indexer.get_stats().await?;
            println!("records={count}");
        }
        Command::Bench { corpus, queries, qrels, max_corpus, max_queries } => {
            let provider = build_embedder(&cfg);
            let bench_cfg = BenchmarkConfig {
                dataset_name: corpus.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "dataset".to_string()),
                max_corpus,
                max_queries,
                cache_dir: cfg.root_dir.join(".cache/bench"),
                ..BenchmarkConfig::default()
            };
            let report = run_benchmark(provider, &corpus, &queries, &qrels, &bench_cfg).await?;
            println!("queries={}", report.query_count);
            for (k, metrics) in &report.per_k {
                println!("k={k}  mrr={:.4}  ndcg={:.4}  recall={:.4}", metrics.mrr, metrics.ndcg, metrics.recall);
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    rt.block_on(run(cli))
}
