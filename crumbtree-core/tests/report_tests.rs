// Tests for the tree and errors documents

use crumbtree_core::report::{
    ArtifactPaths, ErrorsDocument, FetchErrorEntry, RunConfig, RunCounts, TreeDocument, TreeMeta,
    write_artifacts,
};
use crumbtree_core::seed::{dedupe_seeds, parse_url_list};
use crumbtree_core::taxonomy::TaxonomyBuilder;
use crumbtree_core::tree::build_tree;
use crumbtree_scanner::normalize;
use std::fs;
use tempfile::TempDir;

fn meta() -> TreeMeta {
    TreeMeta {
        generated_at: "2026-01-01T00:00:00+00:00".to_string(),
        source_type: "url_list".to_string(),
        source: "urls.txt".to_string(),
        counts: RunCounts::default(),
        config: RunConfig {
            concurrency: 24,
            connect_timeout_secs: 8,
            timeout_secs: 20,
            delay_ms: 0,
            limit: 0,
            sample_size: 50,
        },
    }
}

// ============================================================================
// Errors document
// ============================================================================

#[test]
fn test_errors_document_feeds_the_next_run() {
    let errors = vec![
        FetchErrorEntry {
            url: "https://shop.example/p/1".to_string(),
            error: "timeout".to_string(),
        },
        FetchErrorEntry {
            url: "https://shop.example/p/2".to_string(),
            error: "HTTP 500".to_string(),
        },
    ];
    let doc = ErrorsDocument::new("2026-01-01T00:00:00+00:00".to_string(), 5, 5, errors);
    let json = serde_json::to_string_pretty(&doc).unwrap();

    let retry = dedupe_seeds(parse_url_list(&json), 0);
    let retry: Vec<&str> = retry.iter().map(|u| u.as_str()).collect();
    assert_eq!(retry, vec!["https://shop.example/p/1", "https://shop.example/p/2"]);
}

// ============================================================================
// Tree document
// ============================================================================

#[test]
fn test_tree_document_layout() {
    let mut builder = TaxonomyBuilder::new();
    let tools = normalize("https://shop.example/tools").unwrap();
    let drills = normalize("https://shop.example/tools/drills").unwrap();
    let garden = normalize("https://shop.example/garden").unwrap();
    builder.add_name_vote(&tools, "Tools", 3);
    builder.add_name_vote(&drills, "Drills", 3);
    builder.add_edge(&tools, &drills, 2);
    builder.add_edge(&garden, &drills, 1);

    let taxonomy = builder.resolve();
    let doc = TreeDocument::new(meta(), &taxonomy, build_tree(&taxonomy), &[]);
    let value = serde_json::to_value(&doc).unwrap();

    assert_eq!(value["meta"]["source_type"], "url_list");
    assert_eq!(value["meta"]["config"]["concurrency"], 24);
    assert_eq!(value["roots_preview"][0]["title"], "Tools");
    assert_eq!(value["roots_preview"][0]["descendants"], 1);
    assert_eq!(value["conflicts_sample"][0]["url"], "https://shop.example/tools/drills");
    assert_eq!(
        value["conflicts_sample"][0]["chosen_parent"],
        "https://shop.example/tools"
    );
    assert_eq!(value["tree"][0]["children"][0]["path"], "/tools/drills");
    assert_eq!(value["fetch_errors_sample"], serde_json::json!([]));
}

#[test]
fn test_artifacts_written_under_out_dir() {
    let dir = TempDir::new().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path().join("storage/taxonomy"));
    let taxonomy = TaxonomyBuilder::new().resolve();

    let tree = TreeDocument::new(meta(), &taxonomy, Vec::new(), &[]);
    let errors = ErrorsDocument::new("now".to_string(), 0, 0, Vec::new());
    write_artifacts(&paths, &tree, &errors).unwrap();

    let errors_back: ErrorsDocument =
        serde_json::from_str(&fs::read_to_string(&paths.errors).unwrap()).unwrap();
    assert_eq!(errors_back, errors);
    assert!(paths.tree.ends_with("storage/taxonomy/taxonomy_tree.json"));
}
