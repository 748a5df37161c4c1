//! # merkle-rb
//!
//! An authenticated ordered index: a red-black tree whose nodes carry SHA-256 digests,
//! so that an item's digest can be checked against the chain of digests up to the root.
//!
//! The crate has two layers:
//!
//! - [`RbTree`]: a red-black tree over an arena of nodes with explicit parent links.
//!   Insertion reports which nodes had their children rewritten by rotations.
//! - [`MerkleTree`]: owns an `RbTree<NodeKey>` and a [`DigestStore`]. Nodes with two
//!   children derive their digest as `SHA256(left || right)`; every other node keeps a
//!   stored digest. Rebalancing re-derives exactly the nodes it relinked.
//!
//! ## Example
//!
//! ```rust
//! use merkle_rb::{Digest, MerkleTree, NodeKey, Verification};
//!
//! let mut tree = MerkleTree::new();
//! let a = Digest::hash(b"alpha");
//! let b = Digest::hash(b"beta");
//! tree.insert_leaf(a, 100).unwrap();
//! tree.insert_leaf(b, 200).unwrap();
//!
//! // The second insertion synthesized an anchor that aggregates both items.
//! assert_eq!(tree.node_digest(&NodeKey::anchor(200)), Some(&Digest::combine(&a, &b)));
//!
//! assert!(tree.verify(&a, 100).is_verified());
//! assert_eq!(tree.verify(&b, 100), Verification::DigestMismatch);
//! assert_eq!(tree.verify(&a, 300), Verification::NotFound);
//! ```
//!
//! ## Cost model
//!
//! Search is O(log n). Parent access is O(1) through the stored parent links, so
//! re-deriving a node and its ancestors costs O(log n), and an insertion re-derives a
//! constant number of such paths.

#![deny(unsafe_code)]

pub mod config;
pub mod digest;
pub mod error;
pub mod merkle;
pub mod rbtree;

pub use config::Config;
pub use digest::{Digest, DIGEST_LEN};
pub use error::TreeError;
pub use merkle::{DigestStore, Key, MerkleTree, NodeKey, Role, Verification};
pub use rbtree::{Color, Inserted, NodeId, NodeReport, RbTree};

#[cfg(test)]
mod proptests;
