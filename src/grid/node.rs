//! Expandable row tree for portfolio and dependency graph grids.
//!
//! Nodes live in an arena and refer to their children by index. A tree is
//! never edited in place: structural changes build a new one and expand or
//! collapse operations return a copy.

use crate::types::NodeLayout;
use std::collections::BTreeSet;

/// Identifies a node across structure rebuilds, e.g. the IDs of the
/// portfolio nodes from the root down.
pub type NodePath = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsNode {
    pub start_row: usize,
    pub end_row: usize,
    pub children: Vec<usize>,
    pub collapsed: bool,
    pub path: NodePath,
}

/// Nested form used while building a tree.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    pub path: NodePath,
    pub start_row: usize,
    pub end_row: usize,
    pub children: Vec<NodeBuilder>,
}

impl NodeBuilder {
    pub fn new(path: NodePath, start_row: usize) -> Self {
        Self {
            path,
            start_row,
            end_row: start_row,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeTree {
    nodes: Vec<AnalyticsNode>,
}

impl NodeTree {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Flatten a nested tree into the arena. The root ends up at index 0.
    pub fn build(root: NodeBuilder) -> Self {
        let mut tree = Self::default();
        tree.push(root);
        tree
    }

    fn push(&mut self, builder: NodeBuilder) -> usize {
        let index = self.nodes.len();
        self.nodes.push(AnalyticsNode {
            start_row: builder.start_row,
            end_row: builder.end_row,
            children: Vec::new(),
            collapsed: false,
            path: builder.path,
        });
        let children: Vec<usize> = builder
            .children
            .into_iter()
            .map(|child| self.push(child))
            .collect();
        self.nodes[index].children = children;
        index
    }

    pub fn root(&self) -> Option<&AnalyticsNode> {
        self.nodes.first()
    }

    pub fn node(&self, index: usize) -> Option<&AnalyticsNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node that starts at `row`, if any.
    pub fn node_at_row(&self, row: usize) -> Option<&AnalyticsNode> {
        self.nodes.iter().find(|n| n.start_row == row)
    }

    /// Paths of every node that isn't collapsed.
    pub fn expanded_paths(&self) -> BTreeSet<NodePath> {
        self.nodes
            .iter()
            .filter(|n| !n.collapsed)
            .map(|n| n.path.clone())
            .collect()
    }

    pub fn all_paths(&self) -> BTreeSet<NodePath> {
        self.nodes.iter().map(|n| n.path.clone()).collect()
    }

    /// Copy with only the nodes in `expanded` (and the root) expanded.
    pub fn with_expanded(&self, expanded: &BTreeSet<NodePath>) -> Self {
        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| AnalyticsNode {
                collapsed: i != 0 && !expanded.contains(&n.path),
                ..n.clone()
            })
            .collect();
        Self { nodes }
    }

    pub fn to_layout(&self) -> Option<NodeLayout> {
        (!self.nodes.is_empty()).then(|| self.layout_of(0))
    }

    fn layout_of(&self, index: usize) -> NodeLayout {
        let node = &self.nodes[index];
        NodeLayout {
            start_row: node.start_row,
            end_row: node.end_row,
            collapsed: node.collapsed,
            children: node.children.iter().map(|&c| self.layout_of(c)).collect(),
        }
    }

    /// Every node's range covers its children's and children don't overlap.
    pub fn is_well_formed(&self) -> bool {
        self.nodes.iter().all(|node| {
            let mut previous_end: Option<usize> = None;
            node.start_row <= node.end_row
                && node.children.iter().all(|&c| {
                    let child = &self.nodes[c];
                    let ordered = previous_end.map_or(true, |end| child.start_row > end);
                    previous_end = Some(child.end_row);
                    ordered && child.start_row > node.start_row && child.end_row <= node.end_row
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(ids: &[&str]) -> NodePath {
        ids.iter().map(|s| s.to_string()).collect()
    }

    // root 0..=4, child a 1..=2, child b 3..=4
    fn sample() -> NodeTree {
        let mut root = NodeBuilder::new(path(&["r"]), 0);
        let mut a = NodeBuilder::new(path(&["r", "a"]), 1);
        a.end_row = 2;
        let mut b = NodeBuilder::new(path(&["r", "b"]), 3);
        b.end_row = 4;
        root.children = vec![a, b];
        root.end_row = 4;
        NodeTree::build(root)
    }

    #[test]
    fn test_build_flattens_depth_first() {
        let tree = sample();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.root().unwrap().children, vec![1, 2]);
        assert_eq!(tree.node_at_row(3).unwrap().path, path(&["r", "b"]));
        assert!(tree.is_well_formed());
    }

    #[test]
    fn test_with_expanded_keeps_root_open() {
        let tree = sample().with_expanded(&BTreeSet::new());
        assert!(!tree.root().unwrap().collapsed);
        assert!(tree.node(1).unwrap().collapsed);
        assert!(tree.node(2).unwrap().collapsed);

        let mut expanded = BTreeSet::new();
        expanded.insert(path(&["r", "b"]));
        let tree = tree.with_expanded(&expanded);
        assert!(tree.node(1).unwrap().collapsed);
        assert!(!tree.node(2).unwrap().collapsed);
    }

    #[test]
    fn test_overlapping_children_not_well_formed() {
        let mut root = NodeBuilder::new(path(&["r"]), 0);
        let mut a = NodeBuilder::new(path(&["r", "a"]), 1);
        a.end_row = 3;
        let b = NodeBuilder::new(path(&["r", "b"]), 2);
        root.children = vec![a, b];
        root.end_row = 3;
        assert!(!NodeTree::build(root).is_well_formed());
    }
}
