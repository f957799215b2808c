// Nested tree rendering of a resolved taxonomy

use crate::taxonomy::{ResolvedNode, Taxonomy};
use crumbtree_scanner::NormalizedUrl;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub title: String,
    pub url: String,
    pub path: String,
    pub children: Vec<TreeNode>,
    /// Set when this node was reached again inside its own branch and its
    /// subtree was cut.
    #[serde(default, skip_serializing_if = "is_false")]
    pub cycle_cut: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl TreeNode {
    /// This node plus every descendant.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::node_count).sum::<usize>()
    }
}

pub fn build_tree(taxonomy: &Taxonomy) -> Vec<TreeNode> {
    let nodes: BTreeMap<&NormalizedUrl, &ResolvedNode> =
        taxonomy.nodes().map(|node| (&node.url, node)).collect();
    build_forest(&nodes, taxonomy.roots())
}

/// Render each root top-down. The visited set travels with the recursion,
/// so a URL repeated within one branch is emitted once more with
/// `cycle_cut` and no children.
pub fn build_forest(
    nodes: &BTreeMap<&NormalizedUrl, &ResolvedNode>,
    roots: &[NormalizedUrl],
) -> Vec<TreeNode> {
    roots
        .iter()
        .filter_map(|root| {
            let mut visited = HashSet::new();
            render(nodes, root, &mut visited)
        })
        .collect()
}

fn render<'a>(
    nodes: &BTreeMap<&'a NormalizedUrl, &'a ResolvedNode>,
    url: &'a NormalizedUrl,
    visited: &mut HashSet<&'a NormalizedUrl>,
) -> Option<TreeNode> {
    let node: &'a ResolvedNode = nodes.get(url).copied()?;

    if !visited.insert(url) {
        warn!("Cycle through {} cut while rendering the tree", url);
        return Some(TreeNode {
            title: node.name.clone(),
            url: url.to_string(),
            path: url.path().to_string(),
            children: Vec::new(),
            cycle_cut: true,
        });
    }

    let children = node
        .children
        .iter()
        .filter_map(|child| render(nodes, child, visited))
        .collect();

    visited.remove(url);

    Some(TreeNode {
        title: node.name.clone(),
        url: url.to_string(),
        path: url.path().to_string(),
        children,
        cycle_cut: false,
    })
}
