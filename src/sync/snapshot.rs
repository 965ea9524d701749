use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::core::NeighborSnapshot;

/// Single-writer value handed to readers by atomic pointer swap
///
/// Readers always get a complete value, either the previous one or the new
/// one. Writers replace the whole value; nothing is mutated in place.
pub struct Shared<T> {
    inner: Arc<ArcSwap<T>>,
}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Shared {
            inner: Arc::new(ArcSwap::from_pointee(value)),
        }
    }

    /// Current value
    pub fn load(&self) -> Arc<T> {
        self.inner.load_full()
    }

    /// Replaces the value
    pub fn store(&self, value: T) {
        self.inner.store(Arc::new(value));
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Shared::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shared").field(&*self.inner.load()).finish()
    }
}

/// Neighbor snapshot shared between the slow and fast loops of one run
pub type SnapshotCell = Shared<NeighborSnapshot>;

impl SnapshotCell {
    /// Cell holding `len` disabled neighbors
    pub fn with_neighbors(len: usize) -> Self {
        Shared::new(NeighborSnapshot::disabled(len))
    }
}
