//! The indexing pipeline: scan -> hash -> Merkle-diff -> invalidate ->
//! chunk -> cache-partition -> embed -> upsert -> persist.
//!
//! Invalidation runs before reindexing (delete-by-path for every
//! removed-or-modified file), and the Merkle summary is written only after
//! a successful upsert, so a crash mid-run always leaves the next run with
//! stale-but-consistent state to re-diff against rather than a summary that
//! claims work which never landed in the vector store.

use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

use crate::cache::EmbeddingCache;
use crate::chunk::{self, Chunk};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{IndexError, Result};
use crate::hash;
use crate::merkle;
use crate::progress::ProgressSink;
use crate::scanner::{scan_workspace, ScanOptions};
use crate::vector_store::{self, RecordPayload, SearchHit, VectorRecord, VectorStore};

/// Cap on texts per embedding batch; the per-batch token budget in
/// `embedding::pack_batches` does the rest of the packing work.
const MAX_BATCH_COUNT: usize = 64;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexStats {
    pub total_files: usize,
    pub total_chunks: usize,
    pub new_chunks: usize,
    pub cached_chunks: usize,
    pub elapsed_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

pub struct Indexer {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl Indexer {
    pub fn new(config: Config, embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self { config, embedder, store }
    }

    /// Ensure the vector-store collection exists with the provider's declared dimension.
    pub async fn init(&self) -> Result<()> {
        self.store.ensure_collection(self.embedder.dimension()).await
    }

    pub async fn index(&self, progress: &dyn ProgressSink, cancel: &CancellationToken) -> Result<IndexStats> {
        let start = Instant::now();

        // 1. Scan
        progress.on_phase("scan");
        let scan_opts = ScanOptions {
            root: self.config.root_dir.clone(),
            extensions: self.config.extensions.clone(),
            max_file_bytes: crate::config::DEFAULT_MAX_FILE_BYTES,
        };
        let files = scan_workspace(&scan_opts)?;

        // 2. Hash every path (parallel, embarrassingly parallel per §5).
        let hashes: Vec<(String, String)> = files
            .par_iter()
            .filter_map(|f| hash::sha256_file(&f.abs_path).ok().map(|h| (f.rel_path.clone(), h)))
            .collect();

        if cancel.is_cancelled() {
            return Ok(IndexStats { total_files: files.len(), elapsed_ms: start.elapsed().as_millis() as u64, ..Default::default() });
        }

        // 3. Build new summary; 4. load + diff previous
        let new_summary = merkle::build(&hashes);
        let merkle_path = self.config.merkle_path();
        let old_summary = merkle::load(&merkle_path);
        let was_empty = old_summary.is_empty();
        let diff = merkle::diff(&old_summary, &new_summary);

        // 5. No-changes shortcut
        if !was_empty && diff.is_empty() {
            progress.on_phase("no changes");
            return Ok(IndexStats {
                total_files: files.len(),
                total_chunks: 0,
                new_chunks: 0,
                cached_chunks: 0,
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }

        if cancel.is_cancelled() {
            return Ok(IndexStats { total_files: files.len(), elapsed_ms: start.elapsed().as_millis() as u64, ..Default::default() });
        }

        // 6. Invalidate: filter-delete by path for removed ∪ modified. Fatal on failure.
        progress.on_phase("invalidate");
        for path in diff.removed.iter().chain(diff.modified.iter()) {
            self.store.delete_by_path(path).await?;
        }

        // 7. Select files to process
        let to_process: Vec<&crate::scanner::FileEntry> = if was_empty {
            files.iter().collect()
        } else {
            files
                .iter()
                .filter(|f| diff.added.contains(f.rel_path.as_str()) || diff.modified.contains(f.rel_path.as_str()))
                .collect()
        };

        // 8. Chunk each selected file; I/O and parse failures are logged and skipped.
        progress.on_phase("chunk");
        let mut all_chunks: Vec<Chunk> = Vec::new();
        for f in &to_process {
            if cancel.is_cancelled() {
                break;
            }
            let text = match std::fs::read_to_string(&f.abs_path) {
                Ok(t) => t,
                Err(e) => {
                    progress.on_log(&format!("skip {}: {e}", f.rel_path));
                    continue;
                }
            };
            match chunk::chunk_file(&f.rel_path, &text, self.config.max_chunk_tokens, self.config.min_chunk_tokens) {
                Ok(mut chunks) => all_chunks.append(&mut chunks),
                Err(e) => progress.on_log(&format!("skip {}: {e}", f.rel_path)),
            }
        }

        // 9. Cache partition
        let mut cache = EmbeddingCache::load(&self.config.cache_abs_path());
        let now = now_ms();
        let mut resolved_vectors: HashMap<String, Vec<f32>> = HashMap::new();
        let mut uncached_indices: Vec<usize> = Vec::new();
        for (i, c) in all_chunks.iter().enumerate() {
            if let Some(v) = cache.get(&c.id, now) {
                resolved_vectors.insert(c.id.clone(), v);
            } else {
                uncached_indices.push(i);
            }
        }
        let cached_count = resolved_vectors.len();

        // 10. Embed uncached in batches, in original order.
        progress.on_phase("embed");
        let uncached_texts: Vec<String> = uncached_indices.iter().map(|&i| all_chunks[i].text.clone()).collect();
        let batches = embedding::pack_batches(&uncached_texts, MAX_BATCH_COUNT, self.config.max_chunk_tokens);
        let mut cancelled_early = false;
        for batch in batches {
            if cancel.is_cancelled() {
                cancelled_early = true;
                break;
            }
            let batch_texts: Vec<String> = batch.iter().map(|&j| uncached_texts[j].clone()).collect();
            let vectors = self.embedder.embed_batch(&batch_texts).await?;
            for (offset, &j) in batch.iter().enumerate() {
                let chunk_index = uncached_indices[j];
                let chunk_id = all_chunks[chunk_index].id.clone();
                let vector = vectors[offset].clone();
                cache.set(chunk_id.clone(), vector.clone(), now);
                resolved_vectors.insert(chunk_id, vector);
            }
        }

        // 11. Upsert the union (cached ∪ newly-embedded).
        progress.on_phase("upsert");
        let records: Vec<VectorRecord> = all_chunks
            .iter()
            .filter_map(|c| {
                resolved_vectors.get(&c.id).map(|vector| VectorRecord {
                    id: vector_store::derive_record_id(&c.id),
                    vector: vector.clone(),
                    payload: RecordPayload {
                        path: c.path.clone(),
                        start_line: c.start_line,
                        end_line: c.end_line,
                        content_hash: c.id.clone(),
                        node_type: c.node_kind.clone(),
                        symbol_name: c.symbol.clone(),
                    },
                })
            })
            .collect();
        if !records.is_empty() {
            self.store.upsert(records).await?;
        }

        if cancelled_early {
            // Cancelled before the summary was written: save whatever the cache
            // picked up so far, but skip the summary so the next run re-diffs
            // from the last fully-completed state instead of claiming this
            // partial one.
            if let Err(e) = cache.save() {
                progress.on_log(&format!("cache persist failed: {e}"));
            }
            return Ok(IndexStats {
                total_files: files.len(),
                total_chunks: all_chunks.len(),
                new_chunks: resolved_vectors.len().saturating_sub(cached_count),
                cached_chunks: cached_count,
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }

        // 12. Persist the new Merkle summary strictly after a successful upsert,
        // then save the cache, matching the stated pipeline order exactly.
        merkle::save(&merkle_path, &new_summary)
            .map_err(|e| IndexError::VectorStoreFailure { operation: "persist_merkle".to_string(), message: e.to_string() })?;
        if let Err(e) = cache.save() {
            progress.on_log(&format!("cache persist failed: {e}"));
        }

        // 13. Stats
        Ok(IndexStats {
            total_files: files.len(),
            total_chunks: all_chunks.len(),
            new_chunks: uncached_indices.len(),
            cached_chunks: cached_count,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let vector = self.embedder.embed(query).await?;
        self.store.search(&vector, k).await
    }

    /// Count of records currently held by the vector store for this collection.
    pub async fn get_stats(&self) -> Result<u64> {
        self.store.count().await
    }

    pub async fn reset(&self) -> Result<()> {
        self.store.delete_collection().await?;
        let mut cache = EmbeddingCache::load(&self.config.cache_abs_path());
        cache.clear();
        cache.save()?;
        let merkle_path = self.config.merkle_path();
        if merkle_path.exists() {
            let _ = std::fs::remove_file(&merkle_path);
        }
        Ok(())
    }
}
