//! Bounded-memory frame cache and its budget.

/// Byte budget resolution and host memory probing.
pub mod budget;
/// Decoded frame map, prefetch worker and eviction.
pub mod frame_cache;

pub use budget::{BufferBudget, HostMemory};
pub use frame_cache::{CacheStats, CacheWindow, FrameBufferCache, RequestPolicy};
