//! Root-to-leaf paths.

use std::ops::Index;

use crate::clock::Clock;
use crate::state::State;

use super::node::NodeId;
use super::Tree;

/// An ordered run of nodes starting at a root.
///
/// Paths returned by [`Tree::all_possible_paths`] end at a leaf; paths from
/// [`Tree::path_to`] end at the requested node. A path is a snapshot: it is
/// not updated when the tree grows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    nodes: Vec<NodeId>,
}

impl Path {
    pub(crate) fn new(nodes: Vec<NodeId>) -> Self {
        Self { nodes }
    }

    /// Number of nodes on the path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true for an empty path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node at `index`, counted from the root.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.nodes.get(index).copied()
    }

    /// The root the path starts at.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    /// The node the path ends at.
    #[must_use]
    pub fn last(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    /// Position of `node` on the path.
    #[must_use]
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.nodes.iter().position(|&n| n == node)
    }

    /// Returns true if `node` lies on the path.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.position(node).is_some()
    }

    /// Length of the prefix shared with `other`.
    #[must_use]
    pub fn common_prefix_len(&self, other: &Self) -> usize {
        self.nodes
            .iter()
            .zip(&other.nodes)
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Last node whose clock is at or before `clock`.
    ///
    /// Relies on clocks never decreasing along a path.
    #[must_use]
    pub fn node_by_clock<S: State>(&self, tree: &Tree<S>, clock: Clock) -> Option<NodeId> {
        let end = self
            .nodes
            .partition_point(|&id| tree.get(id).is_some_and(|n| n.clock() <= clock));
        end.checked_sub(1).map(|i| self.nodes[i])
    }

    /// Members from root onward.
    #[must_use]
    pub fn as_slice(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Iterates members from root onward.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }
}

impl Index<usize> for Path {
    type Output = NodeId;

    fn index(&self, index: usize) -> &NodeId {
        &self.nodes[index]
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a NodeId;
    type IntoIter = std::slice::Iter<'a, NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
