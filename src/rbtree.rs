//! Red-black tree over an arena of nodes.
//!
//! Nodes live in a `Vec` and refer to each other by [`NodeId`]. Each node keeps an
//! explicit parent link, so walking towards the root costs O(1) per step instead of a
//! fresh descent from the root. There is no removal: ids stay valid for the lifetime of
//! the tree and dropping the tree releases every node at once.
//!
//! Insertion reports which nodes had their child links rewritten (the attachment parent
//! plus every node touched by a rotation). Layers that cache per-node data derived from
//! children, such as subtree digests, use that set to know exactly what to refresh.

use std::cmp::Ordering;
use std::fmt;

use smallvec::SmallVec;
use tracing::trace;

// =============================================================================
// Node storage
// =============================================================================

/// Stable handle to a node in an [`RbTree`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    fn idx(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Color {
    Red,
    Black,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Side {
    Left,
    Right,
}

impl Side {
    #[inline]
    fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

#[derive(Clone, Debug)]
struct Node<K> {
    key: K,
    color: Color,
    left: Option<NodeId>,
    right: Option<NodeId>,
    parent: Option<NodeId>,
}

/// Nodes whose children changed during one insertion.
pub type Relinked = SmallVec<[NodeId; 8]>;

/// Outcome of a successful [`RbTree::insert`].
#[derive(Clone, Debug)]
pub struct Inserted {
    /// The newly created node.
    pub node: NodeId,
    /// Every node whose `left`/`right` links were rewritten, without duplicates.
    pub relinked: Relinked,
}

/// One row of the diagnostic in-order dump.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NodeReport<K> {
    pub key: K,
    /// Number of nodes on the longest path from this node down to an absent child.
    pub height: usize,
    pub color: Color,
}

// =============================================================================
// RbTree
// =============================================================================

/// A red-black tree of unique keys.
///
/// Invariants after every insertion:
/// - BST ordering: left subtree keys < node key < right subtree keys
/// - the root is black
/// - a red node never has a red child
/// - every root-to-absent-child path crosses the same number of black nodes
#[derive(Clone)]
pub struct RbTree<K> {
    nodes: Vec<Node<K>>,
    root: Option<NodeId>,
}

impl<K> RbTree<K> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            root: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    #[inline]
    pub fn key(&self, id: NodeId) -> &K {
        &self.nodes[id.idx()].key
    }

    #[inline]
    pub fn color(&self, id: NodeId) -> Color {
        self.nodes[id.idx()].color
    }

    #[inline]
    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.idx()].left
    }

    #[inline]
    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.idx()].right
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.idx()].parent
    }

    /// Both children, if the node has exactly two.
    #[inline]
    pub fn children(&self, id: NodeId) -> Option<(NodeId, NodeId)> {
        let node = &self.nodes[id.idx()];
        node.left.zip(node.right)
    }

    /// Longest path, counted in nodes, from `node` down to an absent child.
    ///
    /// Recursive and O(size of subtree); meant for diagnostics only.
    pub fn height(&self, node: Option<NodeId>) -> usize {
        match node {
            None => 0,
            Some(id) => 1 + self.height(self.left(id)).max(self.height(self.right(id))),
        }
    }

    /// Height of the whole tree.
    pub fn depth(&self) -> usize {
        self.height(self.root)
    }

    /// Keys in ascending order.
    pub fn iter(&self) -> Iter<'_, K> {
        let mut iter = Iter {
            tree: self,
            stack: Vec::new(),
        };
        iter.push_left(self.root);
        iter
    }

    /// All node ids, children before parents.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(NodeId, bool)> = Vec::new();
        if let Some(root) = self.root {
            stack.push((root, false));
        }
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                out.push(id);
                continue;
            }
            stack.push((id, true));
            if let Some(r) = self.right(id) {
                stack.push((r, false));
            }
            if let Some(l) = self.left(id) {
                stack.push((l, false));
            }
        }
        out
    }

    #[inline]
    fn is_red(&self, id: NodeId) -> bool {
        self.nodes[id.idx()].color == Color::Red
    }

    #[inline]
    fn set_color(&mut self, id: NodeId, color: Color) {
        self.nodes[id.idx()].color = color;
    }

    #[inline]
    fn child(&self, id: NodeId, side: Side) -> Option<NodeId> {
        match side {
            Side::Left => self.left(id),
            Side::Right => self.right(id),
        }
    }

    #[inline]
    fn set_child(&mut self, id: NodeId, side: Side, child: Option<NodeId>) {
        let node = &mut self.nodes[id.idx()];
        match side {
            Side::Left => node.left = child,
            Side::Right => node.right = child,
        }
    }

    /// Which side of `parent` the node `id` hangs from.
    #[inline]
    fn side_of(&self, id: NodeId, parent: NodeId) -> Side {
        if self.left(parent) == Some(id) {
            Side::Left
        } else {
            Side::Right
        }
    }

    fn alloc(&mut self, key: K, parent: Option<NodeId>) -> NodeId {
        debug_assert!(self.nodes.len() < u32::MAX as usize);
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            key,
            color: Color::Red,
            left: None,
            right: None,
            parent,
        });
        id
    }
}

#[inline]
fn mark(relinked: &mut Relinked, id: NodeId) {
    if !relinked.contains(&id) {
        relinked.push(id);
    }
}

impl<K: Ord> RbTree<K> {
    /// Descend from the root by comparison.
    pub fn search(&self, key: &K) -> Option<NodeId> {
        let mut cur = self.root;
        while let Some(id) = cur {
            let node = &self.nodes[id.idx()];
            match key.cmp(&node.key) {
                Ordering::Less => cur = node.left,
                Ordering::Greater => cur = node.right,
                Ordering::Equal => return Some(id),
            }
        }
        None
    }

    pub fn contains(&self, key: &K) -> bool {
        self.search(key).is_some()
    }

    /// Parent of the node holding `key`. `None` if the key is absent or is the root.
    pub fn parent_of(&self, key: &K) -> Option<NodeId> {
        self.search(key).and_then(|id| self.parent(id))
    }

    /// Insert `key`, then restore the red-black invariants.
    ///
    /// A duplicate key leaves the tree untouched and returns the existing node in `Err`.
    pub fn insert(&mut self, key: K) -> Result<Inserted, NodeId> {
        let mut parent = None;
        let mut side = Side::Left;
        let mut cur = self.root;
        while let Some(id) = cur {
            let node = &self.nodes[id.idx()];
            match key.cmp(&node.key) {
                Ordering::Less => {
                    parent = Some(id);
                    side = Side::Left;
                    cur = node.left;
                }
                Ordering::Greater => {
                    parent = Some(id);
                    side = Side::Right;
                    cur = node.right;
                }
                Ordering::Equal => return Err(id),
            }
        }

        let mut relinked = Relinked::new();
        let node = self.alloc(key, parent);
        match parent {
            None => self.root = Some(node),
            Some(p) => {
                self.set_child(p, side, Some(node));
                mark(&mut relinked, p);
            }
        }

        self.fixup(node, &mut relinked);
        if let Some(root) = self.root {
            self.set_color(root, Color::Black);
        }

        Ok(Inserted { node, relinked })
    }

    /// Repair double-red violations upward from the freshly inserted `node`.
    fn fixup(&mut self, mut node: NodeId, relinked: &mut Relinked) {
        while let Some(parent) = self.parent(node).filter(|&p| self.is_red(p)) {
            // A red parent is never the root, so a grandparent exists.
            let Some(grandparent) = self.parent(parent) else {
                break;
            };
            let parent_side = self.side_of(parent, grandparent);
            let uncle = self.child(grandparent, parent_side.opposite());

            // Red uncle: push the blackness down from the grandparent and continue above it.
            if let Some(uncle) = uncle.filter(|&u| self.is_red(u)) {
                trace!(?grandparent, "recolor");
                self.set_color(grandparent, Color::Red);
                self.set_color(parent, Color::Black);
                self.set_color(uncle, Color::Black);
                node = grandparent;
                continue;
            }

            // Inner grandchild: straighten the triangle; the next pass handles the line.
            if self.side_of(node, parent) != parent_side {
                self.rotate(parent, parent_side, relinked);
                node = parent;
                continue;
            }

            // Outer grandchild: rotate the grandparent away from the line.
            self.rotate(grandparent, parent_side.opposite(), relinked);
            self.set_color(parent, Color::Black);
            self.set_color(grandparent, Color::Red);
            break;
        }
    }

    /// Rotate `pivot` towards `dir`, promoting its child on the opposite side.
    ///
    /// The promoted child's inner subtree moves under `pivot`, and whichever link pointed
    /// at `pivot` (its parent's child slot, or the root) now points at the promoted node.
    fn rotate(&mut self, pivot: NodeId, dir: Side, relinked: &mut Relinked) {
        let promoted_side = dir.opposite();
        let promoted = match self.child(pivot, promoted_side) {
            Some(id) => id,
            None => return,
        };
        trace!(?pivot, ?promoted, ?dir, "rotate");

        let inner = self.child(promoted, dir);
        self.set_child(pivot, promoted_side, inner);
        if let Some(inner) = inner {
            self.nodes[inner.idx()].parent = Some(pivot);
        }

        let above = self.parent(pivot);
        self.nodes[promoted.idx()].parent = above;
        match above {
            None => self.root = Some(promoted),
            Some(above) => {
                let slot = self.side_of(pivot, above);
                self.set_child(above, slot, Some(promoted));
                mark(relinked, above);
            }
        }

        self.set_child(promoted, dir, Some(pivot));
        self.nodes[pivot.idx()].parent = Some(promoted);

        mark(relinked, pivot);
        mark(relinked, promoted);
    }

    /// Check every structural invariant. Returns the black height on success.
    pub fn check_invariants(&self) -> Result<usize, String>
    where
        K: fmt::Debug,
    {
        let Some(root) = self.root else {
            return if self.nodes.is_empty() {
                Ok(0)
            } else {
                Err(format!("empty root but {} nodes", self.nodes.len()))
            };
        };
        if self.is_red(root) {
            return Err("root is red".to_string());
        }
        if self.parent(root).is_some() {
            return Err("root has a parent link".to_string());
        }

        let mut seen = 0usize;
        let black_height = self.check_subtree(root, None, None, &mut seen)?;
        if seen != self.nodes.len() {
            return Err(format!(
                "reachable nodes {seen} != allocated nodes {}",
                self.nodes.len()
            ));
        }
        Ok(black_height)
    }

    fn check_subtree(
        &self,
        id: NodeId,
        lower: Option<&K>,
        upper: Option<&K>,
        seen: &mut usize,
    ) -> Result<usize, String>
    where
        K: fmt::Debug,
    {
        *seen += 1;
        let node = &self.nodes[id.idx()];
        if lower.is_some_and(|lo| node.key <= *lo) || upper.is_some_and(|hi| node.key >= *hi) {
            return Err(format!("key {:?} out of order", node.key));
        }

        let mut heights = [0usize; 2];
        for (i, child) in [node.left, node.right].into_iter().enumerate() {
            let Some(child) = child else {
                continue;
            };
            if self.parent(child) != Some(id) {
                return Err(format!("broken parent link below {:?}", node.key));
            }
            if node.color == Color::Red && self.is_red(child) {
                return Err(format!("red node {:?} has a red child", node.key));
            }
            heights[i] = if i == 0 {
                self.check_subtree(child, lower, Some(&node.key), seen)?
            } else {
                self.check_subtree(child, Some(&node.key), upper, seen)?
            };
        }
        if heights[0] != heights[1] {
            return Err(format!(
                "black height differs under {:?}: {} vs {}",
                node.key, heights[0], heights[1]
            ));
        }
        Ok(heights[0] + usize::from(node.color == Color::Black))
    }
}

impl<K: Copy> RbTree<K> {
    /// In-order dump of key, height and color for every node.
    pub fn report(&self) -> Vec<NodeReport<K>> {
        let mut heights = vec![0usize; self.nodes.len()];
        for id in self.post_order() {
            let left = self.left(id).map_or(0, |c| heights[c.idx()]);
            let right = self.right(id).map_or(0, |c| heights[c.idx()]);
            heights[id.idx()] = 1 + left.max(right);
        }

        let mut out = Vec::with_capacity(self.nodes.len());
        let mut iter = self.iter();
        while let Some(id) = iter.next_id() {
            out.push(NodeReport {
                key: *self.key(id),
                height: heights[id.idx()],
                color: self.color(id),
            });
        }
        out
    }
}

impl<K> Default for RbTree<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug> fmt::Debug for RbTree<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn go<K: fmt::Debug>(
            tree: &RbTree<K>,
            f: &mut fmt::Formatter<'_>,
            node: Option<NodeId>,
            offset: usize,
        ) -> fmt::Result {
            match node {
                None => writeln!(f, "{:width$}[B] <nil>", "", width = offset),
                Some(id) => {
                    let marker = match tree.color(id) {
                        Color::Red => "R",
                        Color::Black => "B",
                    };
                    writeln!(f, "{:width$}[{marker}] {:?}", "", tree.key(id), width = offset)?;
                    go(tree, f, tree.left(id), offset + 2)?;
                    go(tree, f, tree.right(id), offset + 2)
                }
            }
        }
        go(self, f, self.root, 0)
    }
}

/// In-order iterator over the keys of an [`RbTree`].
pub struct Iter<'a, K> {
    tree: &'a RbTree<K>,
    stack: Vec<NodeId>,
}

impl<'a, K> Iter<'a, K> {
    fn push_left(&mut self, mut cur: Option<NodeId>) {
        while let Some(id) = cur {
            self.stack.push(id);
            cur = self.tree.left(id);
        }
    }

    fn next_id(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.push_left(self.tree.right(id));
        Some(id)
    }
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        self.next_id().map(|id| tree.key(id))
    }
}
