//! Tree nodes.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::state::State;

use super::block::BlockId;

/// Stable handle of a node inside one [`Tree`](super::Tree).
///
/// Ids are arena indices and are never reused, so an id of a pruned node
/// keeps failing lookups instead of aliasing a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
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

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// One recorded state and its position in the tree.
pub struct Node<S> {
    pub(crate) id: NodeId,
    pub(crate) state: Arc<S>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) block: Option<BlockId>,
    pub(crate) depth: usize,
}

impl<S: State> Node<S> {
    pub(crate) fn new(id: NodeId, state: Arc<S>, parent: Option<NodeId>, depth: usize) -> Self {
        Self {
            id,
            state,
            parent,
            children: Vec::new(),
            block: None,
            depth,
        }
    }

    /// This node's id.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// The recorded state.
    #[must_use]
    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    /// Clock of the recorded state.
    #[must_use]
    pub fn clock(&self) -> Clock {
        self.state.clock()
    }

    /// Parent node, `None` for a root.
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in branch creation order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Number of edges between this node and its root.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Returns true if this node has no parent.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Returns true if this node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns true if this node has two or more children.
    #[must_use]
    pub fn is_fork(&self) -> bool {
        self.children.len() >= 2
    }

    /// Block currently containing this node, without triggering pending merges.
    #[must_use]
    pub const fn soft_get_block(&self) -> Option<BlockId> {
        self.block
    }
}

impl<S: State> fmt::Debug for Node<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("clock", &self.clock())
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("block", &self.block)
            .finish_non_exhaustive()
    }
}
