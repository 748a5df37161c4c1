//! Fixed-length digests and the hash primitives used by the authenticated layer.
//!
//! Every digest is a SHA-256 output. Internal nodes combine their children with
//! `SHA256(left || right)`; leaf digests are supplied by the caller and stored as-is.

use std::fmt;

use sha2::{Digest as _, Sha256};

use crate::error::TreeError;

/// Length in bytes of every digest stored in the tree.
pub const DIGEST_LEN: usize = 32;

/// A 32-byte SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    #[inline]
    pub const fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// SHA-256 of `data`.
    pub fn hash(data: &[u8]) -> Self {
        let out = Sha256::digest(data);
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&out);
        Self(bytes)
    }

    /// SHA-256 of `left || right`, the digest of a node with two children.
    pub fn combine(left: &Digest, right: &Digest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(left.0);
        hasher.update(right.0);
        let out = hasher.finalize();
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&out);
        Self(bytes)
    }

    /// Copy a digest out of a byte slice. The slice must be exactly [`DIGEST_LEN`] bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TreeError> {
        if bytes.len() != DIGEST_LEN {
            return Err(TreeError::InvalidDigestLength {
                expected: DIGEST_LEN,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn from_hex(s: &str) -> Result<Self, TreeError> {
        let bytes = hex::decode(s).map_err(|_| TreeError::InvalidDigestLength {
            expected: DIGEST_LEN,
            actual: s.len() / 2,
        })?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Returns a copy with bit `bit` (0..256) flipped.
    pub fn with_bit_flipped(mut self, bit: usize) -> Self {
        let bit = bit % (DIGEST_LEN * 8);
        self.0[bit / 8] ^= 1 << (bit % 8);
        self
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = TreeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(bytes)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight hex chars is enough to tell digests apart in tree dumps.
        write!(f, "Digest({}..)", &self.to_hex()[..8])
    }
}
