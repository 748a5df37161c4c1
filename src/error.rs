use crate::merkle::{Key, NodeKey};

/// Errors reported by [`MerkleTree`](crate::MerkleTree) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("key {0} is not in the index")]
    NotFound(NodeKey),
    #[error("digest supplied for key {0} does not match the stored digest")]
    DigestMismatch(Key),
    #[error("stored digest of {0} does not match the digest derived from its children")]
    ChainBroken(NodeKey),
    #[error("key {0} is already present")]
    DuplicateKey(Key),
    #[error("digest must be {expected} bytes, got {actual}")]
    InvalidDigestLength { expected: usize, actual: usize },
    /// An index node has no entry in the digest store.
    #[error("no digest recorded for {0}")]
    MissingDigest(NodeKey),
}
