//! File-tree Merkle summary: builds a directory-hash tree from per-file
//! content hashes and diffs two such summaries in linear time.
//!
//! A directory's hash is derived from its sorted children's hashes, so a
//! future caller could skip whole unchanged subtrees by comparing directory
//! hashes before ever visiting their files.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::hash::sha256_text;

pub const ROOT_PATH: &str = ".";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleNode {
    pub path: String,
    pub hash: String,
    pub is_file: bool,
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MerkleSummary {
    /// Keyed by path for O(1) lookup; serialized as a plain array.
    nodes: BTreeMap<String, MerkleNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerkleDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub modified: BTreeSet<String>,
}

impl MerkleDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => ROOT_PATH,
    }
}

/// Build a Merkle summary from a sorted list of `(path, file_hash)` pairs.
/// Paths must be forward-slash, root-relative (no leading `./`).
pub fn build(files: &[(String, String)]) -> MerkleSummary {
    let mut sorted: Vec<(String, String)> = files.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut nodes: BTreeMap<String, MerkleNode> = BTreeMap::new();
    // dir -> set of direct children paths (files or subdirs)
    let mut dir_children: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    dir_children.entry(ROOT_PATH.to_string()).or_default();

    for (path, hash) in &sorted {
        nodes.insert(
            path.clone(),
            MerkleNode {
                path: path.clone(),
                hash: hash.clone(),
                is_file: true,
                children: Vec::new(),
            },
        );

        // Walk ancestors, registering each directory and its direct child.
        let mut current = path.as_str();
        loop {
            let parent = parent_of(current);
            dir_children
                .entry(parent.to_string())
                .or_default()
                .insert(current.to_string());
            if parent == ROOT_PATH {
                break;
            }
            current = parent;
        }
    }

    // Process directories deepest-first so children are already hashed.
    let mut dirs: Vec<String> = dir_children.keys().cloned().collect();
    dirs.sort_by(|a, b| {
        let da = if a == ROOT_PATH { 0 } else { a.matches('/').count() + 1 };
        let db = if b == ROOT_PATH { 0 } else { b.matches('/').count() + 1 };
        db.cmp(&da).then_with(|| a.cmp(b))
    });

    for dir in dirs {
        let mut children: Vec<String> = dir_children.get(&dir).cloned().unwrap_or_default().into_iter().collect();
        children.sort();

        let mut concat = String::new();
        for child in &children {
            if let Some(node) = nodes.get(child) {
                concat.push_str(&node.hash);
            }
        }
        let hash = sha256_text(concat.as_bytes());

        nodes.insert(
            dir.clone(),
            MerkleNode {
                path: dir.clone(),
                hash,
                is_file: false,
                children,
            },
        );
    }

    MerkleSummary { nodes }
}

impl MerkleSummary {
    pub fn nodes(&self) -> Vec<MerkleNode> {
        self.nodes.values().cloned().collect()
    }

    pub fn from_nodes(nodes: Vec<MerkleNode>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.path.clone(), n)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.values().all(|n| !n.is_file)
    }

    fn file_hashes(&self) -> BTreeMap<String, String> {
        self.nodes
            .values()
            .filter(|n| n.is_file)
            .map(|n| (n.path.clone(), n.hash.clone()))
            .collect()
    }

    pub fn root_hash(&self) -> Option<&str> {
        self.nodes.get(ROOT_PATH).map(|n| n.hash.as_str())
    }
}

/// Diff two summaries into {added, removed, modified} file sets. Directory
/// hashes are ignored by this algorithm (reserved for future prefix-skip
/// optimizations); only the file-only projection is compared.
pub fn diff(old: &MerkleSummary, new: &MerkleSummary) -> MerkleDiff {
    let old_files = old.file_hashes();
    let new_files = new.file_hashes();

    let mut out = MerkleDiff::default();
    for (path, new_hash) in &new_files {
        match old_files.get(path) {
            None => {
                out.added.insert(path.clone());
            }
            Some(old_hash) if old_hash != new_hash => {
                out.modified.insert(path.clone());
            }
            Some(_) => {}
        }
    }
    for path in old_files.keys() {
        if !new_files.contains_key(path) {
            out.removed.insert(path.clone());
        }
    }
    out
}

/// Load a summary from a JSON file. A missing or unparseable file is treated
/// as "no prior index" (empty summary) — this must never raise.
pub fn load(path: &std::path::Path) -> MerkleSummary {
    let Ok(text) = std::fs::read_to_string(path) else {
        return MerkleSummary::default();
    };
    match serde_json::from_str::<Vec<MerkleNode>>(&text) {
        Ok(nodes) => MerkleSummary::from_nodes(nodes),
        Err(_) => MerkleSummary::default(),
    }
}

/// Persist a summary as a JSON array of nodes, creating the parent directory
/// if needed.
pub fn save(path: &std::path::Path, summary: &MerkleSummary) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let nodes = summary.nodes();
    let text = serde_json::to_string(&nodes)?;
    std::fs::write(path, text)
}
