//! Specialized collection types

pub use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Stable reference to a [`RenderableHandle`](crate::ui::handle::RenderableHandle) in a canvas
    pub struct HandleKey;

    /// Stable reference to a [`MeshProxy`](crate::render::proxy::MeshProxy) in a bridge
    pub struct ProxyKey;
}

/// Handle-based map using slot map for stable references
pub type HandleMap<K, T> = SlotMap<K, T>;

/// Stack of reusable objects
///
/// Released items are handed back out in LIFO order so recently used
/// allocations stay warm.
#[derive(Debug)]
pub struct Pool<T> {
    available: Vec<T>,
}

impl<T> Pool<T> {
    /// Create an empty pool
    pub fn new() -> Self {
        Self {
            available: Vec::new(),
        }
    }

    /// Create a pool holding `count` items built by `make`
    pub fn prewarmed(count: usize, mut make: impl FnMut() -> T) -> Self {
        Self {
            available: (0..count).map(|_| make()).collect(),
        }
    }

    /// Take an item if one is available
    pub fn acquire(&mut self) -> Option<T> {
        self.available.pop()
    }

    /// Take an item, building a fresh one when the pool is empty
    pub fn acquire_or_else(&mut self, make: impl FnOnce() -> T) -> T {
        self.available.pop().unwrap_or_else(make)
    }

    /// Return an item for reuse
    pub fn release(&mut self, item: T) {
        self.available.push(item);
    }

    /// Number of items waiting to be reused
    pub fn len(&self) -> usize {
        self.available.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}
