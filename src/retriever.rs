//! Query-time retrieval: embed a query, ask the vector store for the nearest
//! chunks, then re-read the live file on disk for the hit's text rather than
//! trusting whatever was indexed at ingest time — a stale index between runs
//! should never surface text the file no longer contains.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::vector_store::{RecordPayload, VectorStore};

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub score: f32,
    pub payload: RecordPayload,
    pub text: String,
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    root_dir: std::path::PathBuf,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>, root_dir: std::path::PathBuf) -> Self {
        Self { embedder, store, root_dir }
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let vector = self.embedder.embed(query).await?;
        let hits = self.store.search(&vector, k).await?;

        Ok(hits
            .into_iter()
            .map(|hit| {
                let text = self.read_span(&hit.payload);
                RetrievedChunk { score: hit.score, payload: hit.payload, text }
            })
            .collect())
    }

    /// Re-read `payload.path` from disk and slice `[startLine, endLine]`
    /// (1-based, inclusive, clamped to the file's current length). A file
    /// that no longer exists yields a placeholder instead of an error — the
    /// index may be stale relative to the working tree between runs.
    fn read_span(&self, payload: &RecordPayload) -> String {
        let abs_path = self.root_dir.join(&payload.path);
        let Ok(contents) = std::fs::read_to_string(&abs_path) else {
            return format!("[file not found: {}]", payload.path);
        };
        let lines: Vec<&str> = contents.lines().collect();
        if lines.is_empty() {
            return String::new();
        }
        let start = (payload.start_line.max(1) as usize) - 1;
        let end = (payload.end_line as usize).min(lines.len());
        if start >= lines.len() || start + 1 > end {
            return String::new();
        }
        lines[start..end].join("\n")
    }
}
