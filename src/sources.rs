//! Filesystem document loader.
//!
//! Walks each configured directory, keeps files matching its include globs
//! (case-insensitive) and not matching its exclude globs, and turns them into
//! [`SourceDocument`]s. `.git`, `target` and `node_modules` are always skipped.

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use mdsearch_core::models::SourceDocument;

use crate::config::{Config, DirectoryConfig};

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Load every matching document from all configured directories, sorted by
/// relative path.
pub fn load_documents(config: &Config) -> Result<Vec<SourceDocument>> {
    let mut docs = Vec::new();
    for dir in &config.directories {
        docs.extend(scan_directory(dir)?);
    }
    docs.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    docs.dedup_by(|a, b| a.relative_path == b.relative_path);
    Ok(docs)
}

/// Scan one directory tree.
///
/// A document's `relative_path` is the configured directory path joined with
/// the file's path inside it, using `/` separators.
pub fn scan_directory(dir: &DirectoryConfig) -> Result<Vec<SourceDocument>> {
    let root = &dir.path;
    if !root.is_dir() {
        bail!("Directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&dir.include_globs)?;
    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(dir.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut docs = Vec::new();
    for entry in WalkDir::new(root).follow_links(dir.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match load_file(path, &document_path(root, &rel_str)) {
            Ok(doc) => docs.push(doc),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable file"),
        }
    }

    debug!(dir = %root.display(), name = %dir.name, documents = docs.len(), "scanned directory");
    Ok(docs)
}

fn document_path(root: &Path, relative: &str) -> String {
    let root = root.to_string_lossy().replace('\\', "/");
    let root = root.trim_start_matches("./").trim_end_matches('/');
    if root.is_empty() || root == "." {
        relative.to_string()
    } else {
        format!("{}/{}", root, relative)
    }
}

fn load_file(path: &Path, relative_path: &str) -> Result<SourceDocument> {
    let raw_content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let title = extract_title(&raw_content).unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| relative_path.to_string())
    });
    let overview = extract_overview(&raw_content);

    Ok(SourceDocument {
        relative_path: relative_path.to_string(),
        title,
        raw_content,
        overview,
    })
}

/// Text of the first `# ` heading line.
pub fn extract_title(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// First paragraph under a `## Overview` heading, lines joined by spaces.
pub fn extract_overview(content: &str) -> String {
    let mut lines = content
        .lines()
        .map(str::trim)
        .skip_while(|line| !line.starts_with("## Overview"));
    if lines.next().is_none() {
        return String::new();
    }

    lines
        .skip_while(|line| line.is_empty())
        .take_while(|line| !line.is_empty() && !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
