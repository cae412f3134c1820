//! Batch construction: descriptors, the greedy merge and buffer merging

pub mod batch_buffer;
pub mod descriptor;
pub mod merge_engine;

pub use batch_buffer::{BatchBuffer, BatchSection, MergedBuffer, MergedVertices};
pub use descriptor::{BatchDescriptor, BatchFlags};
pub use merge_engine::{BatchMergeEngine, Placement, ProxyDirectory};

/// Counters from one canvas update, for profiling and tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Handles walked by the merge pass
    pub handles_visited: usize,
    /// Handles assigned to a descriptor
    pub handles_merged: usize,
    /// Handles that could not render or were detached
    pub handles_skipped: usize,
    /// Descriptors produced
    pub descriptors: usize,
    /// Proxies whose merged buffer was rebuilt
    pub proxies_rebuilt: usize,
    /// Proxies reused without a rebuild
    pub proxies_reused: usize,
    /// Proxies returned to the pool
    pub proxies_released: usize,
    /// Incremental patches applied
    pub patches_applied: usize,
    /// Incremental patches dropped as stale
    pub patches_dropped: usize,
}

impl BatchStats {
    /// Average handles per descriptor
    pub fn avg_handles_per_batch(&self) -> f32 {
        if self.descriptors == 0 {
            0.0
        } else {
            self.handles_merged as f32 / self.descriptors as f32
        }
    }
}
