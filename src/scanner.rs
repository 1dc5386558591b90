//! Filesystem scan: walk `rootDir`, respecting `.gitignore`/`.ignore` and a
//! fixed set of high-noise build-artifact directories, keeping only files
//! whose extension is in the configured admit-set and size is under the
//! configured max.
//!
//! Uses `ignore::WalkBuilder` with an `Override` for the excluded
//! directories, same as any gitignore-aware directory walker.

use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};

const DEFAULT_EXCLUDED_DIRS: &[&str] =
    &[".git", "node_modules", "target", "dist", "build", "coverage", ".next", ".nuxt", "out"];

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub abs_path: PathBuf,
    /// Root-relative, forward-slash.
    pub rel_path: String,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: PathBuf,
    pub extensions: Vec<String>,
    pub max_file_bytes: u64,
}

fn default_overrides(root: &Path) -> Result<Override> {
    let mut builder = OverrideBuilder::new(root);
    for dir in DEFAULT_EXCLUDED_DIRS {
        builder
            .add(&format!("**/{dir}"))
            .and_then(|b| b.add(&format!("**/{dir}/**")))
            .map_err(|e| IndexError::ScanFailure(e.to_string()))?;
    }
    builder.build().map_err(|e| IndexError::ScanFailure(e.to_string()))
}

fn has_admitted_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => extensions.iter().any(|admitted| admitted.trim_start_matches('.').eq_ignore_ascii_case(ext)),
        None => false,
    }
}

fn to_rel_forward_slash(abs: &Path, root: &Path) -> Result<String> {
    let rel = abs
        .strip_prefix(root)
        .map_err(|_| IndexError::ScanFailure(format!("{} is not under {}", abs.display(), root.display())))?;
    Ok(rel.to_string_lossy().replace('\\', "/"))
}

/// Scan `opts.root`, returning files sorted by relative path.
pub fn scan_workspace(opts: &ScanOptions) -> Result<Vec<FileEntry>> {
    std::fs::metadata(&opts.root)
        .map_err(|e| IndexError::ScanFailure(format!("cannot read root {}: {e}", opts.root.display())))?;

    let overrides = default_overrides(&opts.root)?;
    let walker = WalkBuilder::new(&opts.root).standard_filters(true).overrides(overrides).build();

    let mut entries = Vec::new();
    for item in walker {
        let dent = match item {
            Ok(d) => d,
            Err(_) => continue,
        };
        if !dent.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let abs_path = dent.into_path();
        if !has_admitted_extension(&abs_path, &opts.extensions) {
            continue;
        }
        let bytes = match std::fs::metadata(&abs_path).map(|m| m.len()) {
            Ok(b) => b,
            Err(_) => continue,
        };
        if bytes == 0 || bytes > opts.max_file_bytes {
            continue;
        }
        let rel_path = to_rel_forward_slash(&abs_path, &opts.root)?;
        entries.push(FileEntry { abs_path, rel_path, bytes });
    }

    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn admits_only_configured_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.ts"), "const x = 1;").unwrap();
        fs::write(dir.path().join("b.md"), "# hello").unwrap();

        let opts = ScanOptions { root: dir.path().to_path_buf(), extensions: vec!["ts".to_string()], max_file_bytes: 1_000_000 };
        let entries = scan_workspace(&opts).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rel_path, "a.ts");
    }

    #[test]
    fn skips_excluded_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/dep.ts"), "const x = 1;").unwrap();
        fs::write(dir.path().join("kept.ts"), "const y = 1;").unwrap();

        let opts = ScanOptions { root: dir.path().to_path_buf(), extensions: vec!["ts".to_string()], max_file_bytes: 1_000_000 };
        let entries = scan_workspace(&opts).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].rel_path, "kept.ts");
    }

    #[test]
    fn skips_files_over_max_bytes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("big.ts"), "x".repeat(100)).unwrap();
        let opts = ScanOptions { root: dir.path().to_path_buf(), extensions: vec!["ts".to_string()], max_file_bytes: 10 };
        let entries = scan_workspace(&opts).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn rejects_missing_root() {
        let opts = ScanOptions { root: PathBuf::from("/does/not/exist"), extensions: vec![], max_file_bytes: 10 };
        assert!(scan_workspace(&opts).is_err());
    }

    #[test]
    fn entries_are_sorted_by_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("z.ts"), "1").unwrap();
        fs::write(dir.path().join("a.ts"), "1").unwrap();
        let opts = ScanOptions { root: dir.path().to_path_buf(), extensions: vec!["ts".to_string()], max_file_bytes: 1000 };
        let entries = scan_workspace(&opts).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["a.ts", "z.ts"]);
    }
}
