// Category tree reconstruction from breadcrumb observations

use crumbtree_scanner::{BreadcrumbChain, NormalizedUrl};
use petgraph::Direction;
use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// Accumulates edge weights and name votes. Accumulation is commutative, so
/// pages can be observed in any order and builders can be merged.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyBuilder {
    edges: HashMap<(NormalizedUrl, NormalizedUrl), u64>,
    votes: HashMap<NormalizedUrl, HashMap<String, u64>>,
    chains: usize,
}

impl TaxonomyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one page's chain: a name vote per item and an edge per
    /// adjacent pair. Items without a URL are skipped.
    pub fn observe(&mut self, chain: &BreadcrumbChain) {
        self.chains += 1;

        for item in chain.items() {
            if let Some(url) = &item.url {
                self.add_name_vote(url, &item.name, 1);
            }
        }

        for (parent, child) in chain.links() {
            if let (Some(parent), Some(child)) = (&parent.url, &child.url) {
                self.add_edge(parent, child, 1);
            }
        }
    }

    /// Add `weight` to the parent→child edge. Self-edges are discarded.
    pub fn add_edge(&mut self, parent: &NormalizedUrl, child: &NormalizedUrl, weight: u64) {
        if parent == child {
            return;
        }
        *self
            .edges
            .entry((parent.clone(), child.clone()))
            .or_default() += weight;
    }

    pub fn add_name_vote(&mut self, url: &NormalizedUrl, name: &str, count: u64) {
        if name.is_empty() {
            return;
        }
        *self
            .votes
            .entry(url.clone())
            .or_default()
            .entry(name.to_string())
            .or_default() += count;
    }

    pub fn merge(&mut self, other: TaxonomyBuilder) {
        for ((parent, child), weight) in other.edges {
            *self.edges.entry((parent, child)).or_default() += weight;
        }
        for (url, names) in other.votes {
            let entry = self.votes.entry(url).or_default();
            for (name, count) in names {
                *entry.entry(name).or_default() += count;
            }
        }
        self.chains += other.chains;
    }

    pub fn chain_count(&self) -> usize {
        self.chains
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Resolve into a forest. Deterministic for the same accumulated data,
    /// whatever order it was observed in.
    pub fn resolve(&self) -> Taxonomy {
        let observed: BTreeSet<&NormalizedUrl> = self
            .votes
            .keys()
            .chain(self.edges.keys().flat_map(|(p, c)| [p, c]))
            .collect();

        let names: HashMap<&NormalizedUrl, String> = observed
            .iter()
            .map(|url| (*url, self.canonical_name(url)))
            .collect();

        let mut candidates: Vec<(&NormalizedUrl, &NormalizedUrl, u64)> = self
            .edges
            .iter()
            .map(|((parent, child), weight)| (parent, child, *weight))
            .collect();
        candidates.sort_by(|a, b| {
            b.2.cmp(&a.2)
                .then_with(|| a.0.cmp(b.0))
                .then_with(|| a.1.cmp(b.1))
        });

        // First accepted edge wins; a rejected edge never gets a second look.
        let mut parent_of: HashMap<&NormalizedUrl, &NormalizedUrl> = HashMap::new();
        let mut rejected = 0usize;
        for &(parent, child, weight) in &candidates {
            if parent_of.contains_key(child) {
                continue;
            }
            if closes_cycle(&parent_of, parent, child, observed.len()) {
                debug!("Rejected {} -> {} (weight {}): closes a cycle", parent, child, weight);
                rejected += 1;
                continue;
            }
            parent_of.insert(child, parent);
        }

        let mut by_child: BTreeMap<&NormalizedUrl, Vec<(&NormalizedUrl, u64)>> = BTreeMap::new();
        for &(parent, child, weight) in &candidates {
            by_child.entry(child).or_default().push((parent, weight));
        }
        let mut conflicts: Vec<Conflict> = by_child
            .into_iter()
            .filter(|(_, parents)| parents.len() >= 2)
            .map(|(child, parents)| Conflict {
                url: child.clone(),
                name: names[child].clone(),
                chosen_parent: parent_of.get(child).map(|p| (*p).clone()),
                candidates: parents
                    .into_iter()
                    .map(|(parent, weight)| ParentCandidate {
                        url: parent.clone(),
                        name: names[parent].clone(),
                        weight,
                    })
                    .collect(),
            })
            .collect();
        conflicts.sort_by(|a, b| {
            b.candidates
                .len()
                .cmp(&a.candidates.len())
                .then_with(|| b.total_weight().cmp(&a.total_weight()))
                .then_with(|| a.url.cmp(&b.url))
        });

        let mut children: HashMap<&NormalizedUrl, Vec<&NormalizedUrl>> = HashMap::new();
        for (child, parent) in &parent_of {
            children.entry(*parent).or_default().push(*child);
        }
        for list in children.values_mut() {
            list.sort_by(|a, b| names[a].cmp(&names[b]).then_with(|| a.cmp(b)));
        }

        let nodes: BTreeMap<NormalizedUrl, ResolvedNode> = observed
            .iter()
            .map(|url| {
                let node = ResolvedNode {
                    url: (*url).clone(),
                    name: names[url].clone(),
                    parent: parent_of.get(url).map(|p| (*p).clone()),
                    children: children
                        .get(url)
                        .map(|c| c.iter().map(|u| (*u).clone()).collect())
                        .unwrap_or_default(),
                };
                ((*url).clone(), node)
            })
            .collect();

        let mut taxonomy = Taxonomy {
            nodes,
            roots: Vec::new(),
            conflicts,
            edge_count: self.edges.len(),
            rejected_edges: rejected,
        };

        let mut roots: Vec<(usize, NormalizedUrl)> = taxonomy
            .nodes
            .values()
            .filter(|node| node.parent.is_none())
            .map(|node| (taxonomy.descendant_count(&node.url), node.url.clone()))
            .collect();
        roots.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| taxonomy.nodes[&a.1].name.cmp(&taxonomy.nodes[&b.1].name))
                .then_with(|| a.1.cmp(&b.1))
        });
        taxonomy.roots = roots.into_iter().map(|(_, url)| url).collect();

        info!(
            "Resolved taxonomy: {} nodes, {} edges, {} roots, {} conflicts, {} edges rejected",
            taxonomy.node_count(),
            taxonomy.edge_count,
            taxonomy.roots.len(),
            taxonomy.conflicts.len(),
            rejected
        );
        taxonomy
    }

    /// Most-voted name; ties go to the lexically smallest. Nodes that only
    /// appear in edges fall back to their last path segment.
    fn canonical_name(&self, url: &NormalizedUrl) -> String {
        self.votes
            .get(url)
            .and_then(|names| {
                names
                    .iter()
                    .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                    .map(|(name, _)| name.clone())
            })
            .or_else(|| url.last_segment())
            .unwrap_or_else(|| url.to_string())
    }
}

/// Would `parent` becoming the parent of `child` close a loop? Walks up from
/// `parent`, bounded by the node count.
fn closes_cycle(
    parent_of: &HashMap<&NormalizedUrl, &NormalizedUrl>,
    parent: &NormalizedUrl,
    child: &NormalizedUrl,
    bound: usize,
) -> bool {
    let mut current = Some(parent);
    for _ in 0..=bound {
        match current {
            Some(node) if node == child => return true,
            Some(node) => current = parent_of.get(node).copied(),
            None => return false,
        }
    }
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedNode {
    pub url: NormalizedUrl,
    pub name: String,
    pub parent: Option<NormalizedUrl>,
    /// Sorted by name, then URL.
    pub children: Vec<NormalizedUrl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentCandidate {
    pub url: NormalizedUrl,
    pub name: String,
    pub weight: u64,
}

/// A node seen under more than one parent. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub url: NormalizedUrl,
    pub name: String,
    pub chosen_parent: Option<NormalizedUrl>,
    /// Heaviest first.
    pub candidates: Vec<ParentCandidate>,
}

impl Conflict {
    pub fn total_weight(&self) -> u64 {
        self.candidates.iter().map(|c| c.weight).sum()
    }
}

/// The resolved forest. Read-only once built.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    nodes: BTreeMap<NormalizedUrl, ResolvedNode>,
    roots: Vec<NormalizedUrl>,
    conflicts: Vec<Conflict>,
    edge_count: usize,
    rejected_edges: usize,
}

impl Taxonomy {
    pub fn node(&self, url: &NormalizedUrl) -> Option<&ResolvedNode> {
        self.nodes.get(url)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ResolvedNode> {
        self.nodes.values()
    }

    /// Parentless nodes, largest subtree first.
    pub fn roots(&self) -> &[NormalizedUrl] {
        &self.roots
    }

    /// Most contested first.
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Distinct parent→child pairs observed, before resolution.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Edges turned down because they would have closed a cycle.
    pub fn rejected_edges(&self) -> usize {
        self.rejected_edges
    }

    pub fn parent_of(&self, url: &NormalizedUrl) -> Option<&NormalizedUrl> {
        self.nodes.get(url).and_then(|n| n.parent.as_ref())
    }

    pub fn descendant_count(&self, url: &NormalizedUrl) -> usize {
        let mut count = 0;
        let mut stack: Vec<&NormalizedUrl> = vec![url];
        let mut steps = 0;
        while let Some(current) = stack.pop() {
            steps += 1;
            if steps > self.nodes.len() {
                break;
            }
            if let Some(node) = self.nodes.get(current) {
                count += node.children.len();
                stack.extend(node.children.iter());
            }
        }
        count
    }

    /// Independent check that every node has at most one parent and the
    /// parent links contain no cycle.
    pub fn is_forest(&self) -> bool {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for node in self.nodes.values() {
            graph.add_node(node.url.as_str());
            if let Some(parent) = &node.parent {
                graph.add_edge(parent.as_str(), node.url.as_str(), ());
            }
        }
        !is_cyclic_directed(&graph)
            && graph
                .nodes()
                .all(|n| graph.neighbors_directed(n, Direction::Incoming).count() <= 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crumbtree_scanner::{BreadcrumbItem, normalize};

    fn u(path: &str) -> NormalizedUrl {
        normalize(&format!("https://shop.example{}", path)).unwrap()
    }

    fn chain(items: &[(&str, &str)]) -> BreadcrumbChain {
        BreadcrumbChain::new(
            items
                .iter()
                .map(|(name, path)| BreadcrumbItem::new(*name, Some(u(path))))
                .collect(),
        )
        .unwrap()
    }

    /// Walk every node up to a root within |nodes| steps.
    fn assert_acyclic(taxonomy: &Taxonomy) {
        for node in taxonomy.nodes() {
            let mut current = Some(&node.url);
            let mut steps = 0;
            while let Some(url) = current {
                steps += 1;
                assert!(steps <= taxonomy.node_count() + 1, "cycle through {}", node.url);
                current = taxonomy.parent_of(url);
            }
        }
        assert!(taxonomy.is_forest());
    }

    #[test]
    fn test_cycle_closing_edge_rejected() {
        let mut builder = TaxonomyBuilder::new();
        builder.add_edge(&u("/a"), &u("/b"), 5);
        builder.add_edge(&u("/b"), &u("/c"), 5);
        builder.add_edge(&u("/c"), &u("/a"), 100);

        let taxonomy = builder.resolve();
        let assigned = taxonomy.nodes().filter(|n| n.parent.is_some()).count();
        assert_eq!(assigned, 2);
        assert_eq!(taxonomy.rejected_edges(), 1);
        assert_eq!(taxonomy.parent_of(&u("/a")), Some(&u("/c")));
        assert_eq!(taxonomy.parent_of(&u("/b")), Some(&u("/a")));
        assert_eq!(taxonomy.parent_of(&u("/c")), None);
        assert_eq!(taxonomy.roots(), &[u("/c")]);
        assert_acyclic(&taxonomy);
    }

    #[test]
    fn test_majority_name_wins() {
        let mut builder = TaxonomyBuilder::new();
        builder.add_name_vote(&u("/x"), "Drills", 7);
        builder.add_name_vote(&u("/x"), "drills", 3);
        let taxonomy = builder.resolve();
        assert_eq!(taxonomy.node(&u("/x")).unwrap().name, "Drills");
    }

    #[test]
    fn test_name_tie_broken_lexically() {
        let mut builder = TaxonomyBuilder::new();
        builder.add_name_vote(&u("/x"), "Saws", 2);
        builder.add_name_vote(&u("/x"), "Circular saws", 2);
        assert_eq!(builder.resolve().node(&u("/x")).unwrap().name, "Circular saws");
    }

    #[test]
    fn test_unvoted_node_named_from_url() {
        let mut builder = TaxonomyBuilder::new();
        builder.add_edge(&u("/catalog"), &u("/catalog/drills"), 1);
        let taxonomy = builder.resolve();
        assert_eq!(taxonomy.node(&u("/catalog/drills")).unwrap().name, "drills");
    }

    #[test]
    fn test_conflict_recorded_heaviest_parent_wins() {
        let mut builder = TaxonomyBuilder::new();
        builder.add_edge(&u("/a"), &u("/c"), 10);
        builder.add_edge(&u("/b"), &u("/c"), 3);

        let taxonomy = builder.resolve();
        assert_eq!(taxonomy.parent_of(&u("/c")), Some(&u("/a")));

        let conflicts = taxonomy.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].url, u("/c"));
        assert_eq!(conflicts[0].chosen_parent, Some(u("/a")));
        let candidates: Vec<(NormalizedUrl, u64)> = conflicts[0]
            .candidates
            .iter()
            .map(|c| (c.url.clone(), c.weight))
            .collect();
        assert_eq!(candidates, vec![(u("/a"), 10), (u("/b"), 3)]);
    }

    #[test]
    fn test_conflicts_sorted_most_contested_first() {
        let mut builder = TaxonomyBuilder::new();
        builder.add_edge(&u("/p1"), &u("/two"), 1);
        builder.add_edge(&u("/p2"), &u("/two"), 1);
        builder.add_edge(&u("/p1"), &u("/three"), 1);
        builder.add_edge(&u("/p2"), &u("/three"), 1);
        builder.add_edge(&u("/p3"), &u("/three"), 1);

        let conflicts = builder.resolve().conflicts().to_vec();
        assert_eq!(conflicts[0].url, u("/three"));
        assert_eq!(conflicts[1].url, u("/two"));
    }

    #[test]
    fn test_self_edges_discarded() {
        let mut builder = TaxonomyBuilder::new();
        builder.add_edge(&u("/a"), &u("/a"), 4);
        assert_eq!(builder.edge_count(), 0);
    }

    #[test]
    fn test_observation_order_does_not_matter() {
        let chains = vec![
            chain(&[("Tools", "/tools"), ("Drills", "/tools/drills"), ("D1", "/p/d1")]),
            chain(&[("Garden", "/garden"), ("Drills", "/tools/drills")]),
            chain(&[("Tools", "/tools"), ("drills", "/tools/drills"), ("D2", "/p/d2")]),
            chain(&[("Tools", "/tools"), ("Saws", "/tools/saws")]),
        ];

        let mut forward = TaxonomyBuilder::new();
        chains.iter().for_each(|c| forward.observe(c));
        let mut backward = TaxonomyBuilder::new();
        chains.iter().rev().for_each(|c| backward.observe(c));

        let a = forward.resolve();
        let b = backward.resolve();
        assert_eq!(a.nodes().cloned().collect::<Vec<_>>(), b.nodes().cloned().collect::<Vec<_>>());
        assert_eq!(a.roots(), b.roots());
        assert_eq!(a.conflicts(), b.conflicts());
        assert_eq!(a.parent_of(&u("/tools/drills")), Some(&u("/tools")));
    }

    #[test]
    fn test_merge_equals_single_builder() {
        let c1 = chain(&[("Tools", "/tools"), ("Drills", "/tools/drills")]);
        let c2 = chain(&[("Tools", "/tools"), ("Saws", "/tools/saws")]);

        let mut single = TaxonomyBuilder::new();
        single.observe(&c1);
        single.observe(&c2);

        let mut left = TaxonomyBuilder::new();
        left.observe(&c1);
        let mut right = TaxonomyBuilder::new();
        right.observe(&c2);
        left.merge(right);

        assert_eq!(left.chain_count(), 2);
        assert_eq!(
            left.resolve().nodes().cloned().collect::<Vec<_>>(),
            single.resolve().nodes().cloned().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_shared_prefix_builds_one_branch() {
        let mut builder = TaxonomyBuilder::new();
        builder.observe(&chain(&[("Tools", "/tools"), ("Drills", "/tools/drills"), ("Page 1", "/p1")]));
        builder.observe(&chain(&[("Tools", "/tools"), ("Drills", "/tools/drills"), ("Page 2", "/p2")]));

        let taxonomy = builder.resolve();
        assert_eq!(taxonomy.roots(), &[u("/tools")]);
        assert_eq!(taxonomy.node(&u("/tools")).unwrap().children, vec![u("/tools/drills")]);
        assert_eq!(
            taxonomy.node(&u("/tools/drills")).unwrap().children,
            vec![u("/p1"), u("/p2")]
        );
        assert_eq!(taxonomy.descendant_count(&u("/tools")), 3);
        assert!(taxonomy.conflicts().is_empty());
        assert_acyclic(&taxonomy);
    }

    #[test]
    fn test_roots_ordered_by_subtree_size() {
        let mut builder = TaxonomyBuilder::new();
        builder.add_edge(&u("/small"), &u("/small/x"), 1);
        builder.add_edge(&u("/big"), &u("/big/x"), 1);
        builder.add_edge(&u("/big"), &u("/big/y"), 1);
        builder.add_name_vote(&u("/lonely"), "Lonely", 1);

        let taxonomy = builder.resolve();
        assert_eq!(taxonomy.roots(), &[u("/big"), u("/small"), u("/lonely")]);
    }
}
