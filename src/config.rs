//! Crate configuration: defaults, `.codeindex.json`, and an environment-variable
//! overlay applied on top.
//!
//! A flat, `#[serde(default)]`-annotated struct with camelCase JSON keys; a
//! missing or corrupt config file silently falls back to defaults rooted at
//! the given directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_CHUNK_TOKENS: usize = 512;
pub const DEFAULT_MIN_CHUNK_TOKENS: usize = 30;
pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 1_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub root_dir: PathBuf,
    pub extensions: Vec<String>,
    pub qdrant_url: String,
    pub collection_name: String,
    pub embedding_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    pub max_chunk_tokens: usize,
    pub min_chunk_tokens: usize,
    pub cache_path: PathBuf,
    pub top_k: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            extensions: vec!["ts".to_string(), "tsx".to_string()],
            qdrant_url: "http://localhost:6333".to_string(),
            collection_name: "codeindex".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            openai_api_key: None,
            max_chunk_tokens: DEFAULT_MAX_CHUNK_TOKENS,
            min_chunk_tokens: DEFAULT_MIN_CHUNK_TOKENS,
            cache_path: PathBuf::from(".cache/embeddings.json"),
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl Config {
    pub fn merkle_path(&self) -> PathBuf {
        self.root_dir.join(".cache/merkle-state.json")
    }

    pub fn cache_abs_path(&self) -> PathBuf {
        self.root_dir.join(&self.cache_path)
    }

    /// Overlay `INDEX_DIR`/`QDRANT_URL`/`QDRANT_COLLECTION`/`EMBEDDING_MODEL`/`OPENAI_API_KEY`
    /// on top of whatever was loaded from file or defaults.
    pub fn apply_env_overlay(mut self) -> Self {
        if let Ok(v) = std::env::var("INDEX_DIR") {
            self.root_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("QDRANT_URL") {
            self.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("QDRANT_COLLECTION") {
            self.collection_name = v;
        }
        if let Ok(v) = std::env::var("EMBEDDING_MODEL") {
            self.embedding_model = v;
        }
        if let Ok(v) = std::env::var("OPENAI_API_KEY") {
            self.openai_api_key = Some(v);
        }
        self
    }
}

/// Load `<root>/.codeindex.json`, falling back to defaults on a missing or
/// unparseable file, then apply the environment overlay.
pub fn load_config(root: &Path) -> Config {
    let path = root.join(".codeindex.json");
    let mut base = match std::fs::read_to_string(&path) {
        Ok(text) => match serde_json::from_str::<Config>(&text) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config file unparseable, using defaults");
                Config::default()
            }
        },
        Err(_) => Config::default(),
    };
    base.root_dir = root.to_path_buf();
    base.apply_env_overlay()
}
