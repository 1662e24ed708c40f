//! Interpreter configuration.

/// Tunables for specialization and inline caching.
///
/// Defaults match the shipped limits; embeddings override per tree.
#[derive(Debug, Clone, Copy)]
pub struct InterpConfig {
    /// Maximum guarded alternatives per specializing call site before the
    /// site goes megamorphic.
    pub poly_limit: usize,
    /// Maximum simultaneously cached compile-cache entries per call site.
    pub cache_limit: usize,
    /// Escape hatch: never trim the compile cache, caching every distinct
    /// key (trades memory for recompute avoidance).
    pub keep_all_compiled: bool,
}

impl InterpConfig {
    /// Default polymorphic guard limit.
    pub const DEFAULT_POLY_LIMIT: usize = 4;
    /// Default per-site compile-cache limit.
    pub const DEFAULT_CACHE_LIMIT: usize = 4;

    /// Configuration with a different compile-cache limit.
    pub fn with_cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = limit;
        self
    }

    /// Configuration with a different polymorphic guard limit.
    pub fn with_poly_limit(mut self, limit: usize) -> Self {
        self.poly_limit = limit;
        self
    }

    /// Configuration with unbounded per-site compile caching.
    pub fn keep_all(mut self) -> Self {
        self.keep_all_compiled = true;
        self
    }
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            poly_limit: Self::DEFAULT_POLY_LIMIT,
            cache_limit: Self::DEFAULT_CACHE_LIMIT,
            keep_all_compiled: false,
        }
    }
}
