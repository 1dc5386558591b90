//! End-to-end scenarios against the public API: cold start, warm no-op,
//! single-file edit, file removal, oversize function splitting, and a
//! benchmark smoke run.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use codeindex::bench::{run_benchmark, BenchmarkConfig};
use codeindex::config::Config;
use codeindex::embedding::{EmbeddingProvider, FakeEmbeddingProvider};
use codeindex::error::Result;
use codeindex::indexer::Indexer;
use codeindex::progress::NullProgressSink;
use codeindex::vector_store::InMemoryVectorStore;

/// Wraps `FakeEmbeddingProvider` and counts `embed_batch` calls, so a test
/// can assert that a no-op run never touches the provider.
struct CountingProvider {
    inner: FakeEmbeddingProvider,
    batch_calls: AtomicUsize,
}

impl CountingProvider {
    fn new(dimension: usize) -> Self {
        Self { inner: FakeEmbeddingProvider::new(dimension), batch_calls: AtomicUsize::new(0) }
    }

    fn batch_call_count(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingProvider {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_batch(texts).await
    }
}

fn config_for(root: &Path) -> Config {
    Config { root_dir: root.to_path_buf(), extensions: vec!["ts".to_string()], ..Config::default() }
}

fn write_function(path: &Path, name: &str) {
    std::fs::write(path, format!("export function {name}(a: number, b: number) {{\n  return a + b;\n}}\n")).unwrap();
}

#[tokio::test]
async fn e1_cold_start_indexes_every_file() {
    let dir = tempfile::tempdir().unwrap();
    write_function(&dir.path().join("a.ts"), "add");
    write_function(&dir.path().join("b.ts"), "sub");

    let provider = Arc::new(CountingProvider::new(32));
    let indexer = Indexer::new(config_for(dir.path()), provider.clone(), Arc::new(InMemoryVectorStore::new()));
    let stats = indexer.index(&NullProgressSink, &CancellationToken::new()).await.unwrap();

    assert_eq!(stats.total_files, 2);
    assert_eq!(stats.total_chunks, 2);
    assert_eq!(stats.new_chunks, 2);
    assert_eq!(stats.cached_chunks, 0);
    assert!(provider.batch_call_count() >= 1);
}

#[tokio::test]
async fn e2_warm_rerun_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    write_function(&dir.path().join("a.ts"), "add");

    let provider = Arc::new(CountingProvider::new(32));
    let indexer = Indexer::new(config_for(dir.path()), provider.clone(), Arc::new(InMemoryVectorStore::new()));
    indexer.index(&NullProgressSink, &CancellationToken::new()).await.unwrap();
    let calls_after_first = provider.batch_call_count();

    let second = indexer.index(&NullProgressSink, &CancellationToken::new()).await.unwrap();
    assert_eq!(second.new_chunks, 0);
    assert_eq!(second.total_chunks, 0);
    assert_eq!(provider.batch_call_count(), calls_after_first, "no new embedding calls on an unchanged tree");
}

#[tokio::test]
async fn e3_editing_one_file_reprocesses_only_that_file() {
    let dir = tempfile::tempdir().unwrap();
    write_function(&dir.path().join("a.ts"), "add");
    write_function(&dir.path().join("b.ts"), "sub");

    let indexer = Indexer::new(config_for(dir.path()), Arc::new(FakeEmbeddingProvider::new(32)), Arc::new(InMemoryVectorStore::new()));
    indexer.index(&NullProgressSink, &CancellationToken::new()).await.unwrap();
    let before = indexer.get_stats().await.unwrap();

    write_function(&dir.path().join("b.ts"), "subtract");
    let stats = indexer.index(&NullProgressSink, &CancellationToken::new()).await.unwrap();
    let after = indexer.get_stats().await.unwrap();

    assert_eq!(stats.total_chunks, 1);
    assert_eq!(stats.new_chunks, 1);
    assert_eq!(before, after, "record count unchanged: one deleted, one re-added");
}

#[tokio::test]
async fn e4_removing_a_file_deletes_its_records_only() {
    let dir = tempfile::tempdir().unwrap();
    let b_path = dir.path().join("b.ts");
    write_function(&dir.path().join("a.ts"), "add");
    write_function(&b_path, "sub");

    let indexer = Indexer::new(config_for(dir.path()), Arc::new(FakeEmbeddingProvider::new(32)), Arc::new(InMemoryVectorStore::new()));
    indexer.index(&NullProgressSink, &CancellationToken::new()).await.unwrap();
    assert_eq!(indexer.get_stats().await.unwrap(), 2);

    std::fs::remove_file(&b_path).unwrap();
    indexer.index(&NullProgressSink, &CancellationToken::new()).await.unwrap();
    assert_eq!(indexer.get_stats().await.unwrap(), 1);
}

#[tokio::test]
async fn e5_oversize_function_is_split_into_multiple_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let mut body = String::from("export function bigHandler(event: Event) {\n");
    for i in 0..200 {
        body.push_str(&format!("  if (event.kind === {i}) {{\n    console.log('branch {i}');\n    return {i};\n  }}\n"));
    }
    body.push_str("  return -1;\n}\n");
    std::fs::write(dir.path().join("big.ts"), &body).unwrap();

    let cfg = Config { max_chunk_tokens: 256, min_chunk_tokens: 16, ..config_for(dir.path()) };
    let indexer = Indexer::new(cfg, Arc::new(FakeEmbeddingProvider::new(32)), Arc::new(InMemoryVectorStore::new()));
    let stats = indexer.index(&NullProgressSink, &CancellationToken::new()).await.unwrap();

    assert!(stats.total_chunks > 1, "an oversize function must be split into more than one chunk");
}

#[tokio::test]
async fn e6_benchmark_smoke_has_perfect_recall_on_a_trivial_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let corpus_path = dir.path().join("corpus.jsonl");
    let queries_path = dir.path().join("queries.jsonl");
    let qrels_path = dir.path().join("qrels.tsv");

    std::fs::write(
        &corpus_path,
        "{\"_id\":\"doc-sort\",\"text\":\"quicksort partitions an array around a pivot\"}\n\
         {\"_id\":\"doc-http\",\"text\":\"parses an incoming http request header\"}\n",
    )
    .unwrap();
    std::fs::write(&queries_path, "{\"_id\":\"q-sort\",\"text\":\"quicksort pivot partition array\"}\n").unwrap();
    std::fs::write(&qrels_path, "query-id\tcorpus-id\tscore\nq-sort\tdoc-sort\t1\nq-sort\tdoc-http\t0\n").unwrap();

    let provider: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbeddingProvider::new(64));
    let cfg = BenchmarkConfig { cache_dir: dir.path().join("cache"), ks: vec![1], ..BenchmarkConfig::default() };
    let report = run_benchmark(provider, &corpus_path, &queries_path, &qrels_path, &cfg).await.unwrap();

    assert_eq!(report.per_k[&1].mrr, 1.0);
    assert_eq!(report.per_k[&1].recall, 1.0);
}

#[tokio::test]
async fn cached_vectors_match_the_providers_declared_dimension() {
    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("a.ts");
    write_function(&file_path, "add");

    let cfg = config_for(dir.path());
    let indexer = Indexer::new(cfg.clone(), Arc::new(FakeEmbeddingProvider::new(48)), Arc::new(InMemoryVectorStore::new()));
    indexer.index(&NullProgressSink, &CancellationToken::new()).await.unwrap();

    let text = std::fs::read_to_string(&file_path).unwrap();
    let chunks = codeindex::chunk::chunk_file("a.ts", &text, cfg.max_chunk_tokens, cfg.min_chunk_tokens).unwrap();
    assert_eq!(chunks.len(), 1);

    let mut cache = codeindex::cache::EmbeddingCache::load(&cfg.cache_abs_path());
    let vector = cache.get(&chunks[0].id, 0).expect("chunk must be cached after indexing");
    assert_eq!(vector.len(), 48);
}
