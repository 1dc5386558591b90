//! Retrieval benchmark harness: load a BEIR-shaped corpus/queries/qrels
//! triple, embed both sides (with an on-disk matrix cache), run exact
//! brute-force nearest-neighbor search, and report MRR/NDCG/Recall at a set
//! of cutoffs.
//!
//! Embedding matrices are cached as raw little-endian float files keyed by
//! `(dataset, split, provider, count)`, the same content-addressed-artifact
//! shape `cache.rs` uses for chunk embeddings.

use std::collections::{HashMap, HashSet};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::embedding::{pack_batches, EmbeddingProvider};

#[derive(Debug, Clone, Deserialize)]
struct RawDoc {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorpusDoc {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Qrel {
    pub query_id: String,
    pub corpus_id: String,
    pub relevance: u32,
}

/// Load a JSONL corpus/queries file: one `{"_id", "title", "text"}` object
/// per line. `title` is prepended to `text` when present, matching the
/// common BEIR document shape.
fn load_jsonl(path: &Path) -> Result<Vec<RawDoc>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| serde_json::from_str::<RawDoc>(line).with_context(|| format!("parsing line in {}", path.display())))
        .collect()
}

pub fn load_corpus(path: &Path) -> Result<Vec<CorpusDoc>> {
    Ok(load_jsonl(path)?
        .into_iter()
        .map(|d| CorpusDoc { id: d.id, text: if d.title.is_empty() { d.text } else { format!("{}\n{}", d.title, d.text) } })
        .collect())
}

pub fn load_queries(path: &Path) -> Result<Vec<Query>> {
    Ok(load_jsonl(path)?.into_iter().map(|d| Query { id: d.id, text: d.text }).collect())
}

/// Load a tab-separated `query-id\tcorpus-id\tscore` qrels file, skipping a
/// header line if present.
pub fn load_qrels(path: &Path) -> Result<Vec<Qrel>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut out = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 3 {
            continue;
        }
        let Ok(relevance) = fields[2].parse::<u32>() else {
            continue; // header row ("query-id\tcorpus-id\tscore")
        };
        out.push(Qrel { query_id: fields[0].to_string(), corpus_id: fields[1].to_string(), relevance });
    }
    Ok(out)
}

/// Cap the corpus at `max_docs`, keeping every document referenced by a
/// positive-relevance qrel regardless of the cap, then filling remaining
/// slots with the rest of the corpus in its original order.
pub fn cap_corpus(corpus: &[CorpusDoc], qrels: &[Qrel], max_docs: usize) -> Vec<CorpusDoc> {
    let must_keep: HashSet<&str> = qrels.iter().filter(|q| q.relevance > 0).map(|q| q.corpus_id.as_str()).collect();

    let mut kept: Vec<CorpusDoc> = Vec::new();
    let mut kept_ids: HashSet<String> = HashSet::new();
    for doc in corpus {
        if must_keep.contains(doc.id.as_str()) {
            kept_ids.insert(doc.id.clone());
            kept.push(doc.clone());
        }
    }
    for doc in corpus {
        if kept.len() >= max_docs {
            break;
        }
        if !kept_ids.contains(&doc.id) {
            kept_ids.insert(doc.id.clone());
            kept.push(doc.clone());
        }
    }
    kept
}

/// Keep only queries with at least one positive-relevance corpus id still
/// present in `surviving_ids`, then cap at `max_queries`.
pub fn filter_queries(queries: &[Query], qrels: &[Qrel], surviving_ids: &HashSet<String>, max_queries: usize) -> Vec<Query> {
    let mut positives_by_query: HashMap<&str, usize> = HashMap::new();
    for q in qrels {
        if q.relevance > 0 && surviving_ids.contains(&q.corpus_id) {
            *positives_by_query.entry(q.query_id.as_str()).or_insert(0) += 1;
        }
    }
    queries
        .iter()
        .filter(|q| positives_by_query.get(q.id.as_str()).copied().unwrap_or(0) > 0)
        .take(max_queries)
        .cloned()
        .collect()
}

fn matrix_cache_path(cache_dir: &Path, dataset: &str, split: &str, provider: &str, count: usize) -> PathBuf {
    cache_dir.join(format!("{dataset}-{split}-{provider}-{count}.f32"))
}

fn write_matrix(path: &Path, vectors: &[Vec<f32>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(path)?;
    for row in vectors {
        for value in row {
            file.write_all(&value.to_le_bytes())?;
        }
    }
    Ok(())
}

fn read_matrix(path: &Path, dim: usize, count: usize) -> Option<Vec<Vec<f32>>> {
    let bytes = std::fs::read(path).ok()?;
    if bytes.len() != dim * count * 4 {
        return None;
    }
    let mut vectors = Vec::with_capacity(count);
    for chunk in bytes.chunks_exact(dim * 4) {
        let row: Vec<f32> = chunk.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect();
        vectors.push(row);
    }
    Some(vectors)
}

/// Embed `texts` in order, reusing a cached raw float matrix keyed by
/// `(dataset, split, provider_name, texts.len())` when the cache file's size
/// matches what the provider's current dimension would produce.
pub async fn embed_with_cache(
    provider: &dyn EmbeddingProvider,
    provider_name: &str,
    texts: &[String],
    cache_dir: &Path,
    dataset: &str,
    split: &str,
) -> Result<Vec<Vec<f32>>> {
    let dim = provider.dimension();
    let path = matrix_cache_path(cache_dir, dataset, split, provider_name, texts.len());
    if let Some(vectors) = read_matrix(&path, dim, texts.len()) {
        return Ok(vectors);
    }

    let mut vectors = Vec::with_capacity(texts.len());
    for batch in pack_batches(texts, 64, 512) {
        let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
        let embedded = provider.embed_batch(&batch_texts).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
        vectors.extend(embedded);
    }
    write_matrix(&path, &vectors)?;
    Ok(vectors)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Exact brute-force search: for each query vector, the corpus ids ranked by
/// descending dot product (equivalent to cosine since vectors are unit-norm),
/// truncated to the top `limit`.
pub fn brute_force_rank(query_vectors: &[Vec<f32>], corpus_ids: &[String], corpus_vectors: &[Vec<f32>], limit: usize) -> Vec<Vec<String>> {
    query_vectors
        .iter()
        .map(|qv| {
            let mut scored: Vec<(f32, &String)> = corpus_vectors.iter().zip(corpus_ids.iter()).map(|(cv, id)| (dot(qv, cv), id)).collect();
            scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            scored.into_iter().take(limit).map(|(_, id)| id.clone()).collect()
        })
        .collect()
}

fn mrr_at_k(ranked: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    for (i, id) in ranked.iter().take(k).enumerate() {
        if relevant.contains(id) {
            return 1.0 / (i as f64 + 1.0);
        }
    }
    0.0
}

fn dcg_at_k(relevances: &[u32], k: usize) -> f64 {
    relevances.iter().take(k).enumerate().map(|(i, &rel)| (2f64.powi(rel as i32) - 1.0) / ((i + 2) as f64).log2()).sum()
}

fn ndcg_at_k(ranked: &[String], relevance_by_id: &HashMap<String, u32>, k: usize) -> f64 {
    let actual: Vec<u32> = ranked.iter().take(k).map(|id| relevance_by_id.get(id).copied().unwrap_or(0)).collect();
    let dcg = dcg_at_k(&actual, k);
    let mut ideal: Vec<u32> = relevance_by_id.values().copied().collect();
    ideal.sort_unstable_by(|a, b| b.cmp(a));
    let idcg = dcg_at_k(&ideal, k);
    if idcg == 0.0 {
        0.0
    } else {
        dcg / idcg
    }
}

fn recall_at_k(ranked: &[String], relevant: &HashSet<String>, k: usize) -> Option<f64> {
    if relevant.is_empty() {
        return None;
    }
    let hits = ranked.iter().take(k).filter(|id| relevant.contains(id.as_str())).count();
    Some(hits as f64 / relevant.len() as f64)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KMetrics {
    pub mrr: f64,
    pub ndcg: f64,
    pub recall: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkReport {
    pub query_count: usize,
    pub per_k: std::collections::BTreeMap<usize, KMetrics>,
}

/// Score a set of already-ranked queries against their qrels at every cutoff
/// in `ks`. `ranked_by_query` and `queries` must be in the same order.
pub fn evaluate(queries: &[Query], qrels: &[Qrel], ranked_by_query: &[Vec<String>], ks: &[usize]) -> BenchmarkReport {
    let mut relevance_by_query: HashMap<&str, HashMap<String, u32>> = HashMap::new();
    for q in qrels {
        relevance_by_query.entry(q.query_id.as_str()).or_default().insert(q.corpus_id.clone(), q.relevance);
    }

    let mut per_k: std::collections::BTreeMap<usize, KMetrics> = ks.iter().map(|&k| (k, KMetrics::default())).collect();
    let mut recall_denominators: HashMap<usize, usize> = ks.iter().map(|&k| (k, 0usize)).collect();

    for (query, ranked) in queries.iter().zip(ranked_by_query.iter()) {
        let relevance_by_id = relevance_by_query.get(query.id.as_str()).cloned().unwrap_or_default();
        let relevant: HashSet<String> = relevance_by_id.iter().filter(|(_, &rel)| rel > 0).map(|(id, _)| id.clone()).collect();

        for &k in ks {
            let entry = per_k.get_mut(&k).unwrap();
            entry.mrr += mrr_at_k(ranked, &relevant, k);
            entry.ndcg += ndcg_at_k(ranked, &relevance_by_id, k);
            if let Some(r) = recall_at_k(ranked, &relevant, k) {
                entry.recall += r;
                *recall_denominators.get_mut(&k).unwrap() += 1;
            }
        }
    }

    let n = queries.len().max(1) as f64;
    for (&k, entry) in per_k.iter_mut() {
        entry.mrr /= n;
        entry.ndcg /= n;
        let denom = recall_denominators[&k].max(1) as f64;
        entry.recall /= denom;
    }

    BenchmarkReport { query_count: queries.len(), per_k }
}

pub struct BenchmarkConfig {
    pub dataset_name: String,
    pub split: String,
    pub provider_name: String,
    pub max_corpus: usize,
    pub max_queries: usize,
    pub cache_dir: PathBuf,
    pub ks: Vec<usize>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            dataset_name: "default".to_string(),
            split: "test".to_string(),
            provider_name: "provider".to_string(),
            max_corpus: 10_000,
            max_queries: 1_000,
            cache_dir: PathBuf::from(".cache/bench"),
            ks: vec![1, 5, 10, 100],
        }
    }
}

/// Run the full load -> cap -> embed -> rank -> score pipeline.
pub async fn run_benchmark(
    provider: Arc<dyn EmbeddingProvider>,
    corpus_path: &Path,
    queries_path: &Path,
    qrels_path: &Path,
    cfg: &BenchmarkConfig,
) -> Result<BenchmarkReport> {
    let corpus = load_corpus(corpus_path)?;
    let queries = load_queries(queries_path)?;
    let qrels = load_qrels(qrels_path)?;

    let capped_corpus = cap_corpus(&corpus, &qrels, cfg.max_corpus);
    let surviving_ids: HashSet<String> = capped_corpus.iter().map(|d| d.id.clone()).collect();
    let filtered_queries = filter_queries(&queries, &qrels, &surviving_ids, cfg.max_queries);

    let corpus_texts: Vec<String> = capped_corpus.iter().map(|d| d.text.clone()).collect();
    let corpus_ids: Vec<String> = capped_corpus.iter().map(|d| d.id.clone()).collect();
    let query_texts: Vec<String> = filtered_queries.iter().map(|q| q.text.clone()).collect();

    let corpus_vectors =
        embed_with_cache(provider.as_ref(), &cfg.provider_name, &corpus_texts, &cfg.cache_dir, &cfg.dataset_name, &format!("{}-corpus", cfg.split))
            .await?;
    let query_vectors =
        embed_with_cache(provider.as_ref(), &cfg.provider_name, &query_texts, &cfg.cache_dir, &cfg.dataset_name, &format!("{}-queries", cfg.split))
            .await?;

    let top_limit = cfg.ks.iter().copied().max().unwrap_or(10);
    let ranked = brute_force_rank(&query_vectors, &corpus_ids, &corpus_vectors, top_limit);

    Ok(evaluate(&filtered_queries, &qrels, &ranked, &cfg.ks))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qrel(q: &str, c: &str, rel: u32) -> Qrel {
        Qrel { query_id: q.to_string(), corpus_id: c.to_string(), relevance: rel }
    }

    #[test]
    fn cap_corpus_preserves_every_positive_qrel_document() {
        let corpus: Vec<CorpusDoc> = (0..10).map(|i| CorpusDoc { id: format!("d{i}"), text: format!("doc {i}") }).collect();
        let qrels = vec![qrel("q1", "d9", 1)];
        let capped = cap_corpus(&corpus, &qrels, 3);
        assert!(capped.iter().any(|d| d.id == "d9"));
        assert_eq!(capped.len(), 3);
    }

    #[test]
    fn cap_corpus_exceeds_cap_when_positives_outnumber_it() {
        let corpus: Vec<CorpusDoc> = (0..5).map(|i| CorpusDoc { id: format!("d{i}"), text: format!("doc {i}") }).collect();
        let qrels = vec![qrel("q1", "d0", 1), qrel("q1", "d1", 1), qrel("q1", "d2", 1)];
        let capped = cap_corpus(&corpus, &qrels, 2);
        assert_eq!(capped.len(), 3);
    }

    #[test]
    fn filter_queries_drops_queries_whose_positives_were_all_capped_out() {
        let queries = vec![Query { id: "q1".to_string(), text: "a".to_string() }, Query { id: "q2".to_string(), text: "b".to_string() }];
        let qrels = vec![qrel("q1", "d0", 1), qrel("q2", "d99", 1)];
        let surviving: HashSet<String> = ["d0".to_string()].into_iter().collect();
        let kept = filter_queries(&queries, &qrels, &surviving, 10);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "q1");
    }

    #[test]
    fn metrics_are_correct_on_a_synthetic_ranking() {
        // Single query, the relevant doc ranked first: MRR@1 = NDCG@1 = Recall@1 = 1.0
        let queries = vec![Query { id: "q1".to_string(), text: "".to_string() }];
        let qrels = vec![qrel("q1", "a", 1), qrel("q1", "b", 0)];
        let ranked = vec![vec!["a".to_string(), "b".to_string()]];
        let report = evaluate(&queries, &qrels, &ranked, &[1, 2]);
        assert_eq!(report.per_k[&1].mrr, 1.0);
        assert_eq!(report.per_k[&1].ndcg, 1.0);
        assert_eq!(report.per_k[&1].recall, 1.0);
    }

    #[test]
    fn mrr_reflects_rank_of_first_relevant_hit() {
        let queries = vec![Query { id: "q1".to_string(), text: "".to_string() }];
        let qrels = vec![qrel("q1", "b", 1)];
        let ranked = vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]];
        let report = evaluate(&queries, &qrels, &ranked, &[5]);
        assert!((report.per_k[&5].mrr - 0.5).abs() < 1e-9);
    }

    #[test]
    fn queries_with_zero_positives_are_skipped_for_recall() {
        let queries = vec![Query { id: "q1".to_string(), text: "".to_string() }];
        let qrels = vec![qrel("q1", "a", 0)];
        let ranked = vec![vec!["a".to_string()]];
        let report = evaluate(&queries, &qrels, &ranked, &[1]);
        assert_eq!(report.per_k[&1].recall, 0.0);
    }

    #[test]
    fn matrix_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = matrix_cache_path(dir.path(), "ds", "test", "fake", 2);
        let vectors = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
        write_matrix(&path, &vectors).unwrap();
        let loaded = read_matrix(&path, 3, 2).unwrap();
        assert_eq!(loaded, vectors);
    }

    #[test]
    fn matrix_cache_miss_on_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = matrix_cache_path(dir.path(), "ds", "test", "fake", 2);
        write_matrix(&path, &[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert!(read_matrix(&path, 4, 2).is_none());
    }

    #[tokio::test]
    async fn end_to_end_smoke_with_fake_provider_yields_perfect_recall_at_one() {
        use crate::embedding::FakeEmbeddingProvider;

        let dir = tempfile::tempdir().unwrap();
        let corpus_path = dir.path().join("corpus.jsonl");
        let queries_path = dir.path().join("queries.jsonl");
        let qrels_path = dir.path().join("qrels.tsv");

        std::fs::write(
            &corpus_path,
            "{\"_id\":\"d1\",\"text\":\"binary search over a sorted array\"}\n\
             {\"_id\":\"d2\",\"text\":\"bubble sort swaps adjacent elements\"}\n",
        )
        .unwrap();
        std::fs::write(&queries_path, "{\"_id\":\"q1\",\"text\":\"binary search sorted array\"}\n").unwrap();
        std::fs::write(&qrels_path, "query-id\tcorpus-id\tscore\nq1\td1\t1\nq1\td2\t0\n").unwrap();

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(FakeEmbeddingProvider::new(64));
        let cfg = BenchmarkConfig { cache_dir: dir.path().join("cache"), ks: vec![1], ..Default::default() };
        let report = run_benchmark(provider, &corpus_path, &queries_path, &qrels_path, &cfg).await.unwrap();

        assert_eq!(report.query_count, 1);
        assert_eq!(report.per_k[&1].recall, 1.0);
        assert_eq!(report.per_k[&1].mrr, 1.0);
    }
}
