//! Vector store abstraction: cosine-similarity k-NN over `(id, vector,
//! payload)` records, with filter-delete by payload field.
//!
//! Backend-agnostic, `async_trait`-based, content never stored alongside
//! the vector. `InMemoryVectorStore` is a brute-force cosine scan suitable
//! as a reference backend and for tests; `QdrantVectorStore` talks to a
//! real Qdrant instance over its REST API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordPayload {
    pub path: String,
    #[serde(rename = "startLine")]
    pub start_line: u32,
    #[serde(rename = "endLine")]
    pub end_line: u32,
    #[serde(rename = "contentHash")]
    pub content_hash: String,
    #[serde(rename = "nodeType")]
    pub node_type: String,
    #[serde(rename = "symbolName", skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: RecordPayload,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: RecordPayload,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collection(&self, dimension: usize) -> Result<()>;
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;
    /// Deletes every record whose payload `path` equals `path`. Returns the count removed.
    async fn delete_by_path(&self, path: &str) -> Result<u64>;
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>>;
    async fn delete_collection(&self) -> Result<()>;
    async fn count(&self) -> Result<u64>;
}

/// Derive a record id from a chunk's content-hash: first 32 hex chars,
/// dashed 8-4-4-4-12, version nibble forced to `5`, variant nibble's top two
/// bits forced to `10`.
pub fn derive_record_id(content_hash: &str) -> String {
    let mut chars: Vec<char> = content_hash.chars().take(32).collect();
    while chars.len() < 32 {
        chars.push('0');
    }
    chars[14] = '5';
    let variant_nibble = chars[19].to_digit(16).unwrap_or(0) as u8;
    let forced = (variant_nibble & 0x3) | 0x8;
    chars[19] = std::char::from_digit(forced as u32, 16).unwrap_or('8');

    let hex: String = chars.into_iter().collect();
    format!("{}-{}-{}-{}-{}", &hex[0..8], &hex[8..12], &hex[12..16], &hex[16..20], &hex[20..32])
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Brute-force, in-process reference implementation. Used by tests, the
/// benchmark harness, and any deployment too small to warrant a real vector
/// database.
#[derive(Default)]
pub struct InMemoryVectorStore {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, _dimension: usize) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut store = self.records.write().map_err(|_| {
            IndexError::VectorStoreFailure { operation: "upsert".to_string(), message: "lock poisoned".to_string() }
        })?;
        for record in records {
            store.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn delete_by_path(&self, path: &str) -> Result<u64> {
        let mut store = self.records.write().map_err(|_| IndexError::VectorStoreFailure {
            operation: "delete_by_path".to_string(),
            message: "lock poisoned".to_string(),
        })?;
        let before = store.len();
        store.retain(|_, r| r.payload.path != path);
        Ok((before - store.len()) as u64)
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let store = self.records.read().map_err(|_| IndexError::VectorStoreFailure {
            operation: "search".to_string(),
            message: "lock poisoned".to_string(),
        })?;
        let mut scored: Vec<SearchHit> = store
            .values()
            .map(|r| SearchHit { id: r.id.clone(), score: cosine_similarity(vector, &r.vector), payload: r.payload.clone() })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_collection(&self) -> Result<()> {
        let mut store = self.records.write().map_err(|_| IndexError::VectorStoreFailure {
            operation: "delete_collection".to_string(),
            message: "lock poisoned".to_string(),
        })?;
        store.clear();
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let store = self.records.read().map_err(|_| IndexError::VectorStoreFailure {
            operation: "count".to_string(),
            message: "lock poisoned".to_string(),
        })?;
        Ok(store.len() as u64)
    }
}

/// Qdrant REST-API backed implementation.
pub struct QdrantVectorStore {
    base_url: String,
    collection: String,
    client: reqwest::Client,
}

impl QdrantVectorStore {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), collection: collection.into(), client: reqwest::Client::new() }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        let body = serde_json::json!({
            "vectors": { "size": dimension, "distance": "Cosine" }
        });
        let response = self
            .client
            .put(self.collection_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::VectorStoreFailure { operation: "ensure_collection".to_string(), message: e.to_string() })?;
        if !response.status().is_success() && response.status().as_u16() != 409 {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(IndexError::VectorStoreFailure {
                operation: "ensure_collection".to_string(),
                message: format!("{status}: {text}"),
            });
        }

        let index_body = serde_json::json!({ "field_name": "path", "field_schema": "keyword" });
        self.client
            .put(format!("{}/index", self.collection_url()))
            .json(&index_body)
            .send()
            .await
            .map_err(|e| IndexError::VectorStoreFailure { operation: "ensure_collection".to_string(), message: e.to_string() })?;
        Ok(())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        let points: Vec<serde_json::Value> = records
            .into_iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "vector": r.vector,
                    "payload": r.payload,
                })
            })
            .collect();
        let body = serde_json::json!({ "points": points });
        let response = self
            .client
            .put(format!("{}/points", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::VectorStoreFailure { operation: "upsert".to_string(), message: e.to_string() })?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(IndexError::VectorStoreFailure { operation: "upsert".to_string(), message: format!("{status}: {text}") });
        }
        Ok(())
    }

    async fn delete_by_path(&self, path: &str) -> Result<u64> {
        let filter = serde_json::json!({
            "filter": { "must": [ { "key": "path", "match": { "value": path } } ] }
        });
        let response = self
            .client
            .post(format!("{}/points/delete", self.collection_url()))
            .json(&filter)
            .send()
            .await
            .map_err(|e| IndexError::VectorStoreFailure { operation: "delete_by_path".to_string(), message: e.to_string() })?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(IndexError::VectorStoreFailure {
                operation: "delete_by_path".to_string(),
                message: format!("{status}: {text}"),
            });
        }
        // Qdrant's delete-by-filter response does not report a count; the
        // caller only needs to know the call succeeded.
        Ok(0)
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({ "vector": vector, "limit": k, "with_payload": true });
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| IndexError::VectorStoreFailure { operation: "search".to_string(), message: e.to_string() })?;
        if response.status().as_u16() == 404 {
            // CollectionMissing on search: the retriever reports zero results, not an error.
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(IndexError::VectorStoreFailure { operation: "search".to_string(), message: format!("{status}: {text}") });
        }
        let parsed: QdrantSearchResponse =
            response.json().await.map_err(|e| IndexError::VectorStoreFailure { operation: "search".to_string(), message: e.to_string() })?;
        Ok(parsed
            .result
            .into_iter()
            .map(|p| SearchHit { id: p.id, score: p.score, payload: p.payload })
            .collect())
    }

    async fn delete_collection(&self) -> Result<()> {
        let response = self
            .client
            .delete(self.collection_url())
            .send()
            .await
            .map_err(|e| IndexError::VectorStoreFailure { operation: "delete_collection".to_string(), message: e.to_string() })?;
        if !response.status().is_success() && response.status().as_u16() != 404 {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(IndexError::VectorStoreFailure {
                operation: "delete_collection".to_string(),
                message: format!("{status}: {text}"),
            });
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url()))
            .json(&serde_json::json!({ "exact": true }))
            .send()
            .await
            .map_err(|e| IndexError::VectorStoreFailure { operation: "count".to_string(), message: e.to_string() })?;
        let parsed: QdrantCountResponse =
            response.json().await.map_err(|e| IndexError::VectorStoreFailure { operation: "count".to_string(), message: e.to_string() })?;
        Ok(parsed.result.count)
    }
}

#[derive(Debug, Deserialize)]
struct QdrantSearchResponse {
    result: Vec<QdrantPoint>,
}

#[derive(Debug, Deserialize)]
struct QdrantPoint {
    id: String,
    score: f32,
    payload: RecordPayload,
}

#[derive(Debug, Deserialize)]
struct QdrantCountResponse {
    result: QdrantCount,
}

#[derive(Debug, Deserialize)]
struct QdrantCount {
    count: u64,
}
