//! Authenticated layer: digests on top of the red-black index.
//!
//! Every index node contributes one digest to its parent. A node with two children
//! contributes `SHA256(left || right)`; a node with fewer children contributes a stored
//! digest that is never derived (the caller's digest for items, a seed for anchors).
//!
//! Each item inserted after the first gets a structural *anchor* node ordered directly
//! below it. Anchors carry no caller data; they exist so that neighbouring items gain a
//! summarizing ancestor. Anchor keys live in their own [`Role`] and can never collide
//! with caller keys.
//!
//! Digests are kept consistent eagerly: the index reports exactly which nodes had their
//! children rewritten by an insertion, and each of those is re-derived up to the root.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, trace};

use crate::config::Config;
use crate::digest::Digest;
use crate::error::TreeError;
use crate::rbtree::{NodeId, NodeReport, RbTree};

/// Caller-facing item key.
pub type Key = u64;

/// What an index node stands for. Anchors sort before the item with the same key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum Role {
    Anchor,
    Item,
}

/// Key of a node in the index: a caller key plus the role of the node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct NodeKey {
    pub key: Key,
    pub role: Role,
}

impl NodeKey {
    #[inline]
    pub const fn item(key: Key) -> Self {
        Self {
            key,
            role: Role::Item,
        }
    }

    /// The structural ancestor synthesized when `key` was inserted.
    #[inline]
    pub const fn anchor(key: Key) -> Self {
        Self {
            key,
            role: Role::Anchor,
        }
    }

    #[inline]
    pub fn is_anchor(&self) -> bool {
        self.role == Role::Anchor
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            Role::Item => write!(f, "{}", self.key),
            Role::Anchor => write!(f, "anchor({})", self.key),
        }
    }
}

// =============================================================================
// Digest store
// =============================================================================

/// Digests owned by a [`MerkleTree`], kept apart from the index nodes.
#[derive(Clone, Default, Debug)]
pub struct DigestStore {
    /// Digest handed in by the caller for each item. Never re-derived.
    supplied: HashMap<Key, Digest>,
    /// Digest each index node contributes to its parent.
    nodes: HashMap<NodeKey, Digest>,
}

impl DigestStore {
    pub fn with_capacity(items: usize, nodes: usize) -> Self {
        Self {
            supplied: HashMap::with_capacity(items),
            nodes: HashMap::with_capacity(nodes),
        }
    }

    pub fn supplied(&self, key: Key) -> Option<&Digest> {
        self.supplied.get(&key)
    }

    pub fn node(&self, key: &NodeKey) -> Option<&Digest> {
        self.nodes.get(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// =============================================================================
// Verification result
// =============================================================================

/// Outcome of [`MerkleTree::verify`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[must_use]
pub enum Verification {
    Verified,
    /// The item key is not in the index.
    NotFound,
    /// The claimed digest differs from the one stored for the item.
    DigestMismatch,
    /// An ancestor's stored digest differs from the digest derived from its children.
    ChainBroken { at: NodeKey },
}

impl Verification {
    #[inline]
    pub fn is_verified(&self) -> bool {
        matches!(self, Verification::Verified)
    }

    pub fn into_result(self, key: Key) -> Result<(), TreeError> {
        match self {
            Verification::Verified => Ok(()),
            Verification::NotFound => Err(TreeError::NotFound(NodeKey::item(key))),
            Verification::DigestMismatch => Err(TreeError::DigestMismatch(key)),
            Verification::ChainBroken { at } => Err(TreeError::ChainBroken(at)),
        }
    }
}

// =============================================================================
// MerkleTree
// =============================================================================

/// A red-black index whose nodes are authenticated by digests.
#[derive(Clone)]
pub struct MerkleTree {
    index: RbTree<NodeKey>,
    store: DigestStore,
    config: Config,
}

impl MerkleTree {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let nodes = config.index_capacity(config.initial_capacity);
        Self {
            index: RbTree::with_capacity(nodes),
            store: DigestStore::with_capacity(config.initial_capacity, nodes),
            config,
        }
    }

    /// Number of caller items.
    #[inline]
    pub fn len(&self) -> usize {
        self.store.supplied.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.store.supplied.is_empty()
    }

    /// Number of index nodes, anchors included.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read access to the underlying index.
    pub fn index(&self) -> &RbTree<NodeKey> {
        &self.index
    }

    pub fn store(&self) -> &DigestStore {
        &self.store
    }

    pub fn contains(&self, key: Key) -> bool {
        self.index.contains(&NodeKey::item(key))
    }

    /// The digest the caller supplied for `key`.
    pub fn digest(&self, key: Key) -> Option<&Digest> {
        self.store.supplied(key)
    }

    /// The digest the node at `key` contributes to its parent.
    pub fn node_digest(&self, key: &NodeKey) -> Option<&Digest> {
        self.store.node(key)
    }

    pub fn root(&self) -> Option<NodeKey> {
        self.index.root().map(|id| *self.index.key(id))
    }

    pub fn root_digest(&self) -> Option<Digest> {
        self.index
            .root()
            .and_then(|id| self.store.node(self.index.key(id)).copied())
    }

    /// Insert an item with its precomputed digest.
    ///
    /// Duplicate keys are rejected and leave the tree unchanged. Every insertion after
    /// the first also inserts `NodeKey::anchor(key)`.
    pub fn insert_leaf(&mut self, digest: Digest, key: Key) -> Result<(), TreeError> {
        let item = NodeKey::item(key);
        if self.index.contains(&item) {
            debug!(key, "rejecting duplicate item");
            return Err(TreeError::DuplicateKey(key));
        }
        let first = self.index.is_empty();

        self.store.supplied.insert(key, digest);
        self.store.nodes.insert(item, digest);
        let inserted = self
            .index
            .insert(item)
            .map_err(|_| TreeError::DuplicateKey(key))?;
        debug!(key, "inserted item");

        let mut dirty = inserted.relinked;
        dirty.push(inserted.node);

        if !first && self.config.synthesize_anchors {
            let anchor = NodeKey::anchor(key);
            // Only read while the anchor has fewer than two children.
            self.store
                .nodes
                .insert(anchor, Digest::hash(digest.as_bytes()));
            let inserted = self
                .index
                .insert(anchor)
                .map_err(|_| TreeError::DuplicateKey(key))?;
            debug!(%anchor, "synthesized anchor");
            dirty.extend(inserted.relinked);
            dirty.push(inserted.node);
        }

        for id in dirty {
            self.propagate_from(id)?;
        }
        trace!(root = ?self.root_digest(), "insert complete");
        Ok(())
    }

    /// Digest of the node at `key` computed from the current structure.
    ///
    /// Does not touch the store.
    pub fn derive_digest(&self, key: &NodeKey) -> Result<Digest, TreeError> {
        let id = self.index.search(key).ok_or(TreeError::NotFound(*key))?;
        self.derive_at(id)
    }

    /// Re-derive the node at `key` and write the result into the store.
    pub fn record_digest(&mut self, key: &NodeKey) -> Result<Digest, TreeError> {
        let id = self.index.search(key).ok_or(TreeError::NotFound(*key))?;
        self.record_at(id)
    }

    /// Re-derive `key` and every ancestor up to the root. No-op if `key` is absent.
    pub fn propagate_up(&mut self, key: &NodeKey) -> Result<(), TreeError> {
        match self.index.search(key) {
            Some(id) => self.propagate_from(id),
            None => Ok(()),
        }
    }

    /// Check a claimed digest for `key` against the stored digests up to the root.
    pub fn verify(&self, digest: &Digest, key: Key) -> Verification {
        let Some(id) = self.index.search(&NodeKey::item(key)) else {
            debug!(key, "verify: not found");
            return Verification::NotFound;
        };

        if self.store.supplied(key) != Some(digest) {
            debug!(key, "verify: digest mismatch");
            return Verification::DigestMismatch;
        }

        let mut cur = self.index.parent(id);
        while let Some(ancestor) = cur {
            let at = *self.index.key(ancestor);
            let consistent = match (self.derive_at(ancestor), self.store.node(&at)) {
                (Ok(derived), Some(stored)) => derived == *stored,
                _ => false,
            };
            if !consistent {
                debug!(key, %at, "verify: chain broken");
                return Verification::ChainBroken { at };
            }
            cur = self.index.parent(ancestor);
        }

        Verification::Verified
    }

    /// Re-derive every node digest, children before parents.
    pub fn rebuild_digests(&mut self) -> Result<(), TreeError> {
        for id in self.index.post_order() {
            self.record_at(id)?;
        }
        Ok(())
    }

    /// In-order key/height/color dump of the index.
    pub fn report(&self) -> Vec<NodeReport<NodeKey>> {
        self.index.report()
    }

    #[cfg(test)]
    pub(crate) fn tamper_node_digest(&mut self, key: NodeKey, digest: Digest) {
        self.store.nodes.insert(key, digest);
    }

    fn derive_at(&self, id: NodeId) -> Result<Digest, TreeError> {
        if let Some((left, right)) = self.index.children(id) {
            let left = self.stored_node(left)?;
            let right = self.stored_node(right)?;
            return Ok(Digest::combine(&left, &right));
        }

        let key = *self.index.key(id);
        let stored = match key.role {
            Role::Item => self.store.supplied(key.key),
            Role::Anchor => self.store.node(&key),
        };
        stored.copied().ok_or(TreeError::MissingDigest(key))
    }

    fn record_at(&mut self, id: NodeId) -> Result<Digest, TreeError> {
        let digest = self.derive_at(id)?;
        let key = *self.index.key(id);
        trace!(%key, ?digest, "record digest");
        self.store.nodes.insert(key, digest);
        Ok(digest)
    }

    fn propagate_from(&mut self, id: NodeId) -> Result<(), TreeError> {
        let mut cur = Some(id);
        while let Some(id) = cur {
            self.record_at(id)?;
            cur = self.index.parent(id);
        }
        Ok(())
    }

    fn stored_node(&self, id: NodeId) -> Result<Digest, TreeError> {
        let key = self.index.key(id);
        self.store
            .node(key)
            .copied()
            .ok_or(TreeError::MissingDigest(*key))
    }
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MerkleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MerkleTree root={:?} items={}", self.root_digest(), self.len())?;
        fmt::Debug::fmt(&self.index, f)
    }
}
