//! Compacted suffix tree over an externally owned symbol sequence.
//!
//! Each node identifies a contiguous slice `[start, end)` of the sequence
//! whose string is the node's full context. A child's context extends its
//! parent's toward the past: the parent's string is a proper suffix of the
//! child's. Matching therefore walks the context in reverse, most recent
//! symbol first, and edges can span several symbols (path compaction), so
//! inserting a context may split an existing edge.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]; the tree owns one
//! payload per node. Children are kept in a `BTreeMap` keyed by the first
//! symbol past the parent's context, which makes DFS order deterministic.

use std::collections::BTreeMap;
use std::ops::Bound;

use thiserror::Error;

use crate::Symbol;

/// Index of a node in the tree arena.
pub type NodeId = usize;

const ROOT: NodeId = 0;

/// Errors from exact-context lookups.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("no node for context [{start}, {end})")]
    NodeNotFound { start: usize, end: usize },
}

/// One element of a root-first path: a node together with its context slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathNode {
    pub id: NodeId,
    pub start: usize,
    pub end: usize,
}

impl PathNode {
    /// Context length of the node.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True for the root (empty context).
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// How an insertion changed the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAction {
    /// The context extended the tree (or already existed) without cutting an
    /// edge.
    NoSplit,
    /// An edge was cut; the new intermediate is the second-to-last path
    /// element and the inserted context is the last.
    Split,
    /// The inserted context is itself the new intermediate (last path
    /// element); the pre-existing longer node was pushed below it.
    SplitSuffix,
}

/// Result of [`ContextTree::insert`].
#[derive(Debug, Clone)]
pub struct InsertionResult {
    /// Root-first path to the inserted context.
    pub path: Vec<PathNode>,
    pub action: InsertAction,
    /// The pre-existing node whose edge was cut (the node whose seating
    /// state must be re-partitioned), present iff `action` is a split.
    pub split_child: Option<NodeId>,
}

#[derive(Debug)]
struct Node {
    start: usize,
    end: usize,
    children: BTreeMap<Symbol, NodeId>,
}

impl Node {
    fn len(&self) -> usize {
        self.end - self.start
    }
}

/// Compacted suffix tree with one payload per node.
#[derive(Debug)]
pub struct ContextTree<P> {
    nodes: Vec<Node>,
    payloads: Vec<P>,
}

impl<P: Default> ContextTree<P> {
    /// Create a tree holding only the root (empty context).
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                start: 0,
                end: 0,
                children: BTreeMap::new(),
            }],
            payloads: vec![P::default()],
        }
    }

    fn add_node(&mut self, start: usize, end: usize) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            start,
            end,
            children: BTreeMap::new(),
        });
        self.payloads.push(P::default());
        id
    }

    /// Insert the context `seq[start..end)`, reporting any edge split.
    pub fn insert(&mut self, seq: &[Symbol], start: usize, end: usize) -> InsertionResult {
        let qlen = end - start;
        let mut path = vec![self.path_node(ROOT)];
        let mut cur = ROOT;
        loop {
            let cur_len = self.nodes[cur].len();
            if cur_len == qlen {
                // the context is already a node
                return InsertionResult {
                    path,
                    action: InsertAction::NoSplit,
                    split_child: None,
                };
            }
            let key = seq[end - 1 - cur_len];
            let child = match self.nodes[cur].children.get(&key).copied() {
                Some(c) => c,
                None => {
                    let leaf = self.add_node(start, end);
                    self.nodes[cur].children.insert(key, leaf);
                    path.push(self.path_node(leaf));
                    return InsertionResult {
                        path,
                        action: InsertAction::NoSplit,
                        split_child: None,
                    };
                }
            };
            let child_len = self.nodes[child].len();
            let child_end = self.nodes[child].end;
            let matched = self.match_edge(seq, end, qlen, cur_len, child_end, child_len);
            if matched == child_len {
                path.push(self.path_node(child));
                cur = child;
                continue;
            }
            let down_key = seq[child_end - 1 - matched];
            if matched == qlen {
                // the inserted context ends inside the edge: it becomes the
                // new intermediate itself
                let mid = self.add_node(start, end);
                self.nodes[cur].children.insert(key, mid);
                self.nodes[mid].children.insert(down_key, child);
                path.push(self.path_node(mid));
                return InsertionResult {
                    path,
                    action: InsertAction::SplitSuffix,
                    split_child: Some(child),
                };
            }
            // mismatch inside the edge: cut at the matched depth, then hang
            // the inserted context beside the old child
            let mid = self.add_node(child_end - matched, child_end);
            self.nodes[cur].children.insert(key, mid);
            self.nodes[mid].children.insert(down_key, child);
            let leaf = self.add_node(start, end);
            self.nodes[mid].children.insert(seq[end - 1 - matched], leaf);
            path.push(self.path_node(mid));
            path.push(self.path_node(leaf));
            return InsertionResult {
                path,
                action: InsertAction::Split,
                split_child: Some(child),
            };
        }
    }

    /// Longest-matching-depth walk along one edge. Depths count back from
    /// the most recent symbol; matching starts at the parent's length.
    fn match_edge(
        &self,
        seq: &[Symbol],
        end: usize,
        qlen: usize,
        from: usize,
        child_end: usize,
        child_len: usize,
    ) -> usize {
        let limit = child_len.min(qlen);
        let mut depth = from;
        while depth < limit && seq[child_end - 1 - depth] == seq[end - 1 - depth] {
            depth += 1;
        }
        depth
    }

    /// Root-first path of existing nodes whose labels form the longest
    /// suffix of `seq[start..end)` present in the tree.
    pub fn find_longest_suffix(&self, seq: &[Symbol], start: usize, end: usize) -> Vec<PathNode> {
        let (offset, mut path) = self.suffix_walk(seq, start, end);
        if offset != 0 {
            // the walk ended inside an edge; only fully matched nodes count
            path.pop();
        }
        path
    }

    /// As [`find_longest_suffix`](Self::find_longest_suffix), but the path
    /// may end at a node below a virtual split of an existing edge. The
    /// returned offset is the context length of the virtual intermediate
    /// (0 when the walk stopped exactly at a node boundary).
    pub fn find_longest_suffix_virtual(
        &self,
        seq: &[Symbol],
        start: usize,
        end: usize,
    ) -> (usize, Vec<PathNode>) {
        self.suffix_walk(seq, start, end)
    }

    fn suffix_walk(&self, seq: &[Symbol], start: usize, end: usize) -> (usize, Vec<PathNode>) {
        let qlen = end - start;
        let mut path = vec![self.path_node(ROOT)];
        let mut cur = ROOT;
        loop {
            let cur_len = self.nodes[cur].len();
            if cur_len == qlen {
                return (0, path);
            }
            let key = seq[end - 1 - cur_len];
            let child = match self.nodes[cur].children.get(&key) {
                Some(&c) => c,
                None => return (0, path),
            };
            let child_len = self.nodes[child].len();
            let child_end = self.nodes[child].end;
            let matched = self.match_edge(seq, end, qlen, cur_len, child_end, child_len);
            if matched == child_len {
                path.push(self.path_node(child));
                cur = child;
                continue;
            }
            // partial progress into the edge: the walk would have ended at a
            // virtual node of length `matched` above `child`
            path.push(self.path_node(child));
            return (matched, path);
        }
    }

    /// Path to the exact node for context `seq[start..end)`.
    pub fn find_node(
        &self,
        seq: &[Symbol],
        start: usize,
        end: usize,
    ) -> Result<Vec<PathNode>, TreeError> {
        let (offset, path) = self.suffix_walk(seq, start, end);
        let leaf = path.last().expect("path always contains the root");
        if offset == 0 && leaf.len() == end - start {
            Ok(path)
        } else {
            Err(TreeError::NodeNotFound { start, end })
        }
    }

    fn path_node(&self, id: NodeId) -> PathNode {
        let node = &self.nodes[id];
        PathNode {
            id,
            start: node.start,
            end: node.end,
        }
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The path element for a node id.
    pub fn node(&self, id: NodeId) -> PathNode {
        self.path_node(id)
    }

    pub fn payload(&self, id: NodeId) -> &P {
        &self.payloads[id]
    }

    pub fn payload_mut(&mut self, id: NodeId) -> &mut P {
        &mut self.payloads[id]
    }

    /// Mutable access to two distinct payloads at once (split handling).
    pub fn payload_pair_mut(&mut self, a: NodeId, b: NodeId) -> (&mut P, &mut P) {
        assert_ne!(a, b, "payload_pair_mut requires distinct nodes");
        if a < b {
            let (left, right) = self.payloads.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.payloads.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    /// Iterate over all payloads in arena order.
    pub fn payloads(&self) -> impl Iterator<Item = &P> {
        self.payloads.iter()
    }

    fn next_child(&self, id: NodeId, after: Option<Symbol>) -> Option<(Symbol, NodeId)> {
        let children = &self.nodes[id].children;
        let mut range = match after {
            None => children.range(..),
            Some(key) => children.range((Bound::Excluded(key), Bound::Unbounded)),
        };
        range.next().map(|(&k, &c)| (k, c))
    }

    /// Iterator over root-first paths, one per node, in DFS pre-order.
    pub fn dfs_paths(&self) -> DfsPaths {
        DfsPaths {
            stack: vec![(ROOT, None)],
            started: false,
        }
    }

    /// Visit every node in DFS pre-order with its depth (path length above
    /// it).
    pub fn visit<F: FnMut(PathNode, usize)>(&self, mut f: F) {
        let mut dfs = self.dfs_paths();
        while let Some(path) = dfs.next(self) {
            let leaf = *path.last().expect("non-empty path");
            f(leaf, path.len() - 1);
        }
    }

    /// Visit every node together with its children.
    pub fn visit_with_children<F: FnMut(PathNode, &[PathNode])>(&self, mut f: F) {
        for id in 0..self.nodes.len() {
            let children: Vec<PathNode> = self.nodes[id]
                .children
                .values()
                .map(|&c| self.path_node(c))
                .collect();
            f(self.path_node(id), &children);
        }
    }
}

impl<P: Default> Default for ContextTree<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// DFS pre-order path iterator. Holds no borrow of the tree between steps,
/// so callers may mutate payloads while iterating; the tree's structure must
/// not change mid-iteration.
#[derive(Debug)]
pub struct DfsPaths {
    stack: Vec<(NodeId, Option<Symbol>)>,
    started: bool,
}

impl DfsPaths {
    /// Advance to the next path, or `None` once the traversal is complete.
    pub fn next<P: Default>(&mut self, tree: &ContextTree<P>) -> Option<Vec<PathNode>> {
        if !self.started {
            self.started = true;
            return Some(self.materialize(tree));
        }
        loop {
            let (top, after) = *self.stack.last()?;
            match tree.next_child(top, after) {
                Some((key, child)) => {
                    self.stack.last_mut().expect("non-empty stack").1 = Some(key);
                    self.stack.push((child, None));
                    return Some(self.materialize(tree));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }

    fn materialize<P: Default>(&self, tree: &ContextTree<P>) -> Vec<PathNode> {
        self.stack.iter().map(|&(id, _)| tree.path_node(id)).collect()
    }
}
