/// Configuration for a [`MerkleTree`](crate::MerkleTree).
#[derive(Debug, Clone)]
pub struct Config {
    /// Initial capacity hint for the number of items.
    pub initial_capacity: usize,
    /// Insert a structural anchor node below every item after the first one.
    ///
    /// Anchors are the summarizing ancestors whose digests aggregate neighbouring items.
    /// With this off, every index node is a caller item.
    pub synthesize_anchors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_capacity: 1024,
            synthesize_anchors: true,
        }
    }
}

impl Config {
    pub fn with_initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    pub fn with_anchors(mut self, synthesize_anchors: bool) -> Self {
        self.synthesize_anchors = synthesize_anchors;
        self
    }

    /// Index nodes needed for `items` items under this configuration.
    pub(crate) fn index_capacity(&self, items: usize) -> usize {
        if self.synthesize_anchors {
            items.saturating_mul(2)
        } else {
            items
        }
    }
}
