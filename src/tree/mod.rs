//! The branching history tree.
//!
//! # Layout
//!
//! Nodes and blocks live in arenas addressed by [`NodeId`] and [`BlockId`].
//! Parent/child links are ids, never references, so the whole structure can
//! be mutated under one coarse lock ([`TreeLock`]).
//!
//! Node slots are never reused: callers and crunching jobs hold [`NodeId`]s,
//! and an id whose node was pruned must keep failing with
//! [`TreeError::UnknownNode`] rather than alias a newer node. Block slots are
//! recycled through a free list, so block churn from repeated fork/prune
//! cycles does not grow the block arena.
//!
//! # Blocks
//!
//! Long unforked chains are compressed into [`Block`]s. The tree keeps blocks
//! consistent with its fork topology as it grows:
//! - appending to the last node of a block extends the block;
//! - giving a node its second child dissolves the block around it and rebuilds
//!   the chains on either side, so no fork is ever a block member;
//! - pruning a subtree truncates the blocks it cut through, then re-merges
//!   the chain around the pruned node's parent, which may no longer be a fork.
//!
//! [`Tree::get_block`] recomputes the chain through a node before answering;
//! [`Tree::soft_get_block`] only reads the stored compression.
//!
//! A block always holds at least two nodes; a lone unforked node stays
//! unblocked.

mod block;
mod members;
mod node;
mod path;

pub use block::{Block, BlockId};
pub use members::{TreeMember, TreeMembers};
pub use node::{Node, NodeId};
pub use path::Path;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::error::{ForklineError, ForklineResult, TreeError};
use crate::state::State;

fn state_key<S>(state: &Arc<S>) -> usize {
    Arc::as_ptr(state) as usize
}

/// Owner of every node and block of one simulation history.
pub struct Tree<S> {
    nodes: Vec<Option<Node<S>>>,
    blocks: Vec<Option<Block>>,
    roots: Vec<NodeId>,
    by_state: HashMap<usize, NodeId>,
    free_blocks: Vec<BlockId>,
    live_nodes: usize,
}

impl<S> Default for Tree<S> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            blocks: Vec::new(),
            roots: Vec::new(),
            by_state: HashMap::new(),
            free_blocks: Vec::new(),
            live_nodes: 0,
        }
    }
}

impl<S: State> Tree<S> {
    /// Create a new empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_nodes
    }

    /// Returns true if the tree holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_nodes == 0
    }

    /// Root nodes in creation order.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Iterates live nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node<S>> {
        self.nodes.iter().flatten()
    }

    /// Iterates live blocks.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().flatten()
    }

    /// Number of live blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks().count()
    }

    /// Looks up a node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node<S>> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Looks up a node, failing if it is unknown or pruned.
    pub fn node(&self, id: NodeId) -> Result<&Node<S>, TreeError> {
        self.get(id).ok_or(TreeError::UnknownNode { node: id })
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<S>, TreeError> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(TreeError::UnknownNode { node: id })
    }

    /// Looks up a block.
    pub fn block(&self, id: BlockId) -> Result<&Block, TreeError> {
        self.blocks
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(TreeError::UnknownBlock { block: id })
    }

    /// Node recording exactly this state allocation, if any.
    #[must_use]
    pub fn node_of_state(&self, state: &Arc<S>) -> Option<NodeId> {
        self.by_state.get(&state_key(state)).copied()
    }

    /// Records `state` as a new root.
    ///
    /// Fails if this very state (by identity) is already recorded.
    pub fn root_this_state(&mut self, state: impl Into<Arc<S>>) -> Result<NodeId, TreeError> {
        let state = state.into();
        self.ensure_unrecorded(&state)?;
        let id = self.insert_node(state, None, 0);
        self.roots.push(id);
        Ok(id)
    }

    /// Records `state` as a new child of `parent` and returns the new node.
    ///
    /// The child is placed after any existing children. Blocks are extended
    /// or split so that they keep matching the fork topology.
    pub fn add_child(&mut self, parent: NodeId, state: impl Into<Arc<S>>) -> Result<NodeId, TreeError> {
        let state = state.into();
        let (parent_clock, parent_depth, siblings, parent_block, grandparent) = {
            let p = self.node(parent)?;
            (p.clock(), p.depth, p.children.len(), p.block, p.parent)
        };
        self.ensure_unrecorded(&state)?;
        let child_clock = state.clock();
        if child_clock < parent_clock {
            return Err(TreeError::ClockRegression {
                parent,
                parent_clock,
                child_clock,
            });
        }

        let id = self.insert_node(state, Some(parent), parent_depth + 1);
        self.node_mut(parent)?.children.push(id);

        match siblings {
            0 => {
                let extends_block = parent_block.and_then(|b| {
                    let block = self.blocks.get_mut(b.index())?.as_mut()?;
                    (block.last() == parent).then(|| {
                        block.push(id);
                        b
                    })
                });
                match extends_block {
                    Some(b) => self.node_mut(id)?.block = Some(b),
                    None => self.rebuild_chain_through(parent)?,
                }
            }
            1 => {
                let first_child = self.node(parent)?.children[0];
                if let Some(b) = parent_block {
                    self.dissolve_block(b)?;
                    debug!(block = %b, fork = %parent, "split block at new fork");
                }
                if let Some(gp) = grandparent {
                    self.rebuild_chain_through(gp)?;
                }
                self.rebuild_chain_through(first_child)?;
            }
            _ => {}
        }

        Ok(id)
    }

    /// Block containing `node`, recomputing the chain through it first.
    pub fn get_block(&mut self, node: NodeId) -> Result<Option<BlockId>, TreeError> {
        self.rebuild_chain_through(node)?;
        Ok(self.node(node)?.block)
    }

    /// Block containing `node` as currently compressed. Never recomputes.
    pub fn soft_get_block(&self, node: NodeId) -> Result<Option<BlockId>, TreeError> {
        Ok(self.node(node)?.block)
    }

    /// Returns true if `ancestor` lies strictly above `node`.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> Result<bool, TreeError> {
        self.node(ancestor)?;
        let mut cursor = self.node(node)?.parent;
        while let Some(id) = cursor {
            if id == ancestor {
                return Ok(true);
            }
            cursor = self.node(id)?.parent;
        }
        Ok(false)
    }

    /// Returns true if `descendant` lies strictly below `node`.
    pub fn is_descendant(&self, descendant: NodeId, node: NodeId) -> Result<bool, TreeError> {
        self.is_ancestor(node, descendant)
    }

    /// Path from the root down to `node` inclusive.
    pub fn path_to(&self, node: NodeId) -> Result<Path, TreeError> {
        let mut nodes = Vec::with_capacity(self.node(node)?.depth + 1);
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            nodes.push(id);
            cursor = self.node(id)?.parent;
        }
        nodes.reverse();
        Ok(Path::new(nodes))
    }

    /// States from the root down to `node`'s parent, root first.
    pub fn history_before(&self, node: NodeId) -> Result<Vec<Arc<S>>, TreeError> {
        let path = self.path_to(node)?;
        let mut states = Vec::with_capacity(path.len());
        for id in path.iter().take(path.len() - 1) {
            states.push(Arc::clone(self.node(id)?.state()));
        }
        Ok(states)
    }

    /// Path from the root through `node`, continuing down first children to a leaf.
    pub fn default_path_through(&self, node: NodeId) -> Result<Path, TreeError> {
        let mut nodes = self.path_to(node)?.as_slice().to_vec();
        let mut cursor = node;
        while let Some(&next) = self.node(cursor)?.children.first() {
            nodes.push(next);
            cursor = next;
        }
        Ok(Path::new(nodes))
    }

    /// Leaves in depth-first order.
    #[must_use]
    pub fn leaves(&self) -> Vec<NodeId> {
        self.all_possible_paths()
            .iter()
            .filter_map(Path::last)
            .collect()
    }

    /// One path per leaf, depth-first: roots in creation order, children in
    /// insertion order.
    #[must_use]
    pub fn all_possible_paths(&self) -> Vec<Path> {
        let mut paths = Vec::new();
        let mut current: Vec<NodeId> = Vec::new();
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            current.truncate(node.depth);
            current.push(id);
            if node.is_leaf() {
                paths.push(Path::new(current.clone()));
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        paths
    }

    /// Lazily iterates structurally distinct members: unblocked nodes and one
    /// entry per block, plus every blockful node when `include_blockful_nodes`.
    ///
    /// Each call starts a fresh traversal.
    #[must_use]
    pub fn iterate_tree_members(&self, include_blockful_nodes: bool) -> TreeMembers<'_, S> {
        TreeMembers::new(self, include_blockful_nodes)
    }

    /// Removes `node` and its whole subtree. Returns the number of nodes removed.
    ///
    /// If the parent stops being a fork, its chain is merged before returning.
    pub fn prune(&mut self, node: NodeId) -> Result<usize, TreeError> {
        let parent = self.node(node)?.parent;

        let mut doomed = Vec::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let n = self.node(id)?;
            stack.extend(n.children.iter().copied());
            doomed.push(id);
        }
        let doomed_set: HashSet<NodeId> = doomed.iter().copied().collect();

        let touched_blocks: BTreeSet<BlockId> = doomed
            .iter()
            .filter_map(|&id| self.get(id).and_then(Node::soft_get_block))
            .collect();
        for b in touched_blocks {
            let remaining = {
                let block = self
                    .blocks
                    .get_mut(b.index())
                    .and_then(Option::as_mut)
                    .ok_or(TreeError::UnknownBlock { block: b })?;
                block.retain(|n| !doomed_set.contains(n));
                block.len()
            };
            if remaining < 2 {
                self.dissolve_block(b)?;
            }
        }

        for &id in &doomed {
            if let Some(n) = self.nodes.get_mut(id.index()).and_then(Option::take) {
                self.by_state.remove(&state_key(&n.state));
                self.live_nodes -= 1;
            }
        }

        match parent {
            Some(p) => {
                self.node_mut(p)?.children.retain(|&c| c != node);
                self.rebuild_chain_through(p)?;
            }
            None => self.roots.retain(|&r| r != node),
        }

        info!(node = %node, removed = doomed.len(), "pruned subtree");
        Ok(doomed.len())
    }

    fn ensure_unrecorded(&self, state: &Arc<S>) -> Result<(), TreeError> {
        match self.node_of_state(state) {
            Some(node) => Err(TreeError::StateAlreadyInTree { node }),
            None => Ok(()),
        }
    }

    fn insert_node(&mut self, state: Arc<S>, parent: Option<NodeId>, depth: usize) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.by_state.insert(state_key(&state), id);
        self.nodes.push(Some(Node::new(id, state, parent, depth)));
        self.live_nodes += 1;
        id
    }

    fn dissolve_block(&mut self, block: BlockId) -> Result<(), TreeError> {
        let Some(removed) = self.blocks.get_mut(block.index()).and_then(Option::take) else {
            return Err(TreeError::UnknownBlock { block });
        };
        for id in removed.iter() {
            if let Some(n) = self.nodes.get_mut(id.index()).and_then(Option::as_mut) {
                n.block = None;
            }
        }
        self.free_blocks.push(block);
        Ok(())
    }

    /// Recomputes the maximal unforked chain through `node` and makes it a
    /// single block (or no block, if the chain is a lone node).
    fn rebuild_chain_through(&mut self, node: NodeId) -> Result<(), TreeError> {
        if self.node(node)?.is_fork() {
            return Ok(());
        }

        let mut top = node;
        while let Some(p) = self.node(top)?.parent {
            if self.node(p)?.children.len() != 1 {
                break;
            }
            top = p;
        }

        let mut chain = vec![top];
        let mut cursor = top;
        loop {
            let n = self.node(cursor)?;
            if n.children.len() != 1 {
                break;
            }
            let next = n.children[0];
            if self.node(next)?.is_fork() {
                break;
            }
            chain.push(next);
            cursor = next;
        }

        let existing: BTreeSet<BlockId> = chain
            .iter()
            .filter_map(|&id| self.get(id).and_then(Node::soft_get_block))
            .collect();

        if existing.len() == 1 {
            if let Some(&b) = existing.iter().next() {
                if self.block(b)?.nodes() == chain.as_slice() {
                    return Ok(());
                }
            }
        }
        for b in existing {
            self.dissolve_block(b)?;
        }

        if chain.len() >= 2 {
            let b = self.free_blocks.pop().unwrap_or_else(|| {
                self.blocks.push(None);
                BlockId::from_index(self.blocks.len() - 1)
            });
            for &id in &chain {
                self.node_mut(id)?.block = Some(b);
            }
            self.blocks[b.index()] = Some(Block::new(b, chain));
        }
        Ok(())
    }
}

impl<S: State> fmt::Debug for Tree<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("nodes", &self.live_nodes)
            .field("roots", &self.roots)
            .field("blocks", &self.block_count())
            .field("block_slots", &self.blocks.len())
            .finish()
    }
}

/// Shared handle to a tree behind a reader/writer lock.
///
/// Readers run concurrently with each other, never with a writer. A call
/// that must both read and write takes one write guard and does both through
/// it; the guard is never re-acquired while held.
pub struct TreeLock<S> {
    inner: Arc<RwLock<Tree<S>>>,
}

impl<S> Clone for TreeLock<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: State> Default for TreeLock<S> {
    fn default() -> Self {
        Self::new(Tree::new())
    }
}

impl<S: State> TreeLock<S> {
    /// Wraps a tree in a lock.
    #[must_use]
    pub fn new(tree: Tree<S>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(tree)),
        }
    }

    /// Acquires shared read access.
    pub fn read(&self) -> ForklineResult<RwLockReadGuard<'_, Tree<S>>> {
        self.inner
            .read()
            .map_err(|_| ForklineError::LockPoisoned { context: "tree.read" })
    }

    /// Acquires exclusive write access.
    pub fn write(&self) -> ForklineResult<RwLockWriteGuard<'_, Tree<S>>> {
        self.inner
            .write()
            .map_err(|_| ForklineError::LockPoisoned { context: "tree.write" })
    }
}

impl<S: State> fmt::Debug for TreeLock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeLock").finish_non_exhaustive()
    }
}
