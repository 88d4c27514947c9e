//! Structural iteration over tree members.

use std::collections::VecDeque;

use crate::state::State;

use super::block::BlockId;
use super::node::NodeId;
use super::Tree;

/// A structurally distinct element of a tree: a block or an unblocked node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeMember {
    /// A node not absorbed into a block, or a blockful node when requested.
    Node(NodeId),
    /// A compressed run of nodes.
    Block(BlockId),
}

/// Depth-first iterator returned by [`Tree::iterate_tree_members`].
///
/// Roots are visited in creation order and children in insertion order. A
/// block is yielded where its first node would be, followed by its members
/// when blockful nodes are included.
pub struct TreeMembers<'a, S> {
    tree: &'a Tree<S>,
    stack: Vec<NodeId>,
    queued: VecDeque<TreeMember>,
    include_blockful_nodes: bool,
}

impl<'a, S: State> TreeMembers<'a, S> {
    pub(crate) fn new(tree: &'a Tree<S>, include_blockful_nodes: bool) -> Self {
        Self {
            tree,
            stack: tree.roots().iter().rev().copied().collect(),
            queued: VecDeque::new(),
            include_blockful_nodes,
        }
    }

    fn push_children(&mut self, id: NodeId) {
        if let Some(node) = self.tree.get(id) {
            self.stack.extend(node.children().iter().rev());
        }
    }
}

impl<S: State> Iterator for TreeMembers<'_, S> {
    type Item = TreeMember;

    fn next(&mut self) -> Option<TreeMember> {
        if let Some(member) = self.queued.pop_front() {
            return Some(member);
        }

        let tree = self.tree;
        loop {
            let id = self.stack.pop()?;
            let Some(node) = tree.get(id) else {
                continue;
            };

            let block = node
                .soft_get_block()
                .and_then(|block_id| tree.block(block_id).ok());

            let Some(block) = block else {
                self.push_children(id);
                return Some(TreeMember::Node(id));
            };

            // Traversal always enters a block through its first node.
            if self.include_blockful_nodes {
                self.queued.extend(block.iter().map(TreeMember::Node));
            }
            self.push_children(block.last());
            return Some(TreeMember::Block(block.id()));
        }
    }
}
