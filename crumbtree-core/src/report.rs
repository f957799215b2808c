// Artifact documents and writing them to disk

use crate::error::{CrawlError, Result};
use crate::taxonomy::{Conflict, Taxonomy};
use crate::tree::TreeNode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const TREE_FILE: &str = "taxonomy_tree.json";
pub const ERRORS_FILE: &str = "taxonomy_errors.json";

/// RFC 3339 timestamp for the `generated_at` fields.
pub fn generated_at() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchErrorEntry {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub source_urls: usize,
    pub processed_urls: usize,
    pub ok_pages: usize,
    pub fetch_errors: usize,
    pub breadcrumb_pages: usize,
    pub nodes: usize,
    pub edges: usize,
    pub roots: usize,
    pub conflicts: usize,
    pub rejected_edges: usize,
}

/// Tunables the run was invoked with, echoed into the tree document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub concurrency: usize,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub delay_ms: u64,
    pub limit: usize,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeMeta {
    pub generated_at: String,
    pub source_type: String,
    pub source: String,
    pub counts: RunCounts,
    pub config: RunConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootPreview {
    pub title: String,
    pub url: String,
    pub children: usize,
    pub descendants: usize,
}

/// The full tree plus a bounded diagnostics sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDocument {
    pub meta: TreeMeta,
    pub roots_preview: Vec<RootPreview>,
    pub conflicts_sample: Vec<Conflict>,
    pub fetch_errors_sample: Vec<FetchErrorEntry>,
    pub tree: Vec<TreeNode>,
}

impl TreeDocument {
    pub fn new(
        meta: TreeMeta,
        taxonomy: &Taxonomy,
        tree: Vec<TreeNode>,
        errors: &[FetchErrorEntry],
    ) -> Self {
        let sample = meta.config.sample_size;

        let roots_preview = taxonomy
            .roots()
            .iter()
            .filter_map(|url| taxonomy.node(url))
            .take(sample)
            .map(|node| RootPreview {
                title: node.name.clone(),
                url: node.url.to_string(),
                children: node.children.len(),
                descendants: taxonomy.descendant_count(&node.url),
            })
            .collect();

        Self {
            meta,
            roots_preview,
            conflicts_sample: taxonomy.conflicts().iter().take(sample).cloned().collect(),
            fetch_errors_sample: errors.iter().take(sample).cloned().collect(),
            tree,
        }
    }
}

/// Complete failure log. Its shape is accepted back as a URL list, so a
/// later run can retry exactly these pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorsDocument {
    pub generated_at: String,
    pub source_urls: usize,
    pub processed_urls: usize,
    pub errors_count: usize,
    pub errors: Vec<FetchErrorEntry>,
}

impl ErrorsDocument {
    pub fn new(
        generated_at: String,
        source_urls: usize,
        processed_urls: usize,
        errors: Vec<FetchErrorEntry>,
    ) -> Self {
        Self {
            generated_at,
            source_urls,
            processed_urls,
            errors_count: errors.len(),
            errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub tree: PathBuf,
    pub errors: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            tree: dir.join(TREE_FILE),
            errors: dir.join(ERRORS_FILE),
        }
    }
}

/// Write both documents, creating parent directories as needed. Any failure
/// is fatal and names the path.
pub fn write_artifacts(
    paths: &ArtifactPaths,
    tree: &TreeDocument,
    errors: &ErrorsDocument,
) -> Result<()> {
    write_json(&paths.tree, tree, "tree document")?;
    write_json(&paths.errors, errors, "errors document")?;
    info!(
        "Wrote {} and {}",
        paths.tree.display(),
        paths.errors.display()
    );
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T, what: &'static str) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|source| CrawlError::Serialize { what, source })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| CrawlError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(path, json).map_err(|source| CrawlError::Write {
        path: path.to_path_buf(),
        source,
    })
}
