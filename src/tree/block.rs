//! Blocks: compressed runs of unforked nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;

use super::node::NodeId;

/// Stable handle of a block inside one [`Tree`](super::Tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(usize);

impl BlockId {
    /// Creates an id from a raw arena index.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block#{}", self.0)
    }
}

/// A run of at least two consecutive nodes with no fork among them.
///
/// Every member except the last has exactly one child, the next member.
/// Blocks are owned by the tree and rebuilt as forks appear, so a `Block`
/// borrowed from a tree always matches its current topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    id: BlockId,
    nodes: Vec<NodeId>,
}

impl Block {
    pub(crate) fn new(id: BlockId, nodes: Vec<NodeId>) -> Self {
        debug_assert!(nodes.len() >= 2, "a block holds at least two nodes");
        Self { id, nodes }
    }

    /// This block's id.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Number of member nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a live block.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Member at `index`, counted from the block's first node.
    pub fn get(&self, index: usize) -> Result<NodeId, TreeError> {
        self.nodes
            .get(index)
            .copied()
            .ok_or(TreeError::BlockIndexOutOfRange {
                block: self.id,
                index,
                len: self.nodes.len(),
            })
    }

    /// First member; its parent, if any, is outside the block.
    #[must_use]
    pub fn first(&self) -> NodeId {
        self.nodes[0]
    }

    /// Last member; its children, if any, are outside the block.
    #[must_use]
    pub fn last(&self) -> NodeId {
        self.nodes[self.nodes.len() - 1]
    }

    /// Position of `node` within the block.
    #[must_use]
    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.nodes.iter().position(|&n| n == node)
    }

    /// Returns true if `node` is a member.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.index_of(node).is_some()
    }

    /// Members in parent-to-child order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Iterates members in parent-to-child order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub(crate) fn push(&mut self, node: NodeId) {
        self.nodes.push(node);
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&NodeId) -> bool) {
        self.nodes.retain(keep);
    }
}
