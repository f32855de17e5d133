use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic per-view counter. A poll cycle captures the value at its start
/// and may only commit while that value is still current; cancelling or
/// re-scoping the view advances it, turning every in-flight cycle stale.
#[derive(Debug, Clone, Default)]
pub struct GenerationToken(Arc<AtomicU64>);

impl GenerationToken {
    #[inline]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Invalidate everything captured so far. Returns the new generation.
    #[inline]
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    #[inline]
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}
