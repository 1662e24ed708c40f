//! Bounded per-call-site compile cache.
//!
//! A call site that compiles `(pattern, flags)` pairs through an
//! external compiler caches up to `limit` guarded artifacts. Guard keys
//! compare by value; the cached cell is invalidatable (`None` means not
//! yet computed or invalidated). Compilation always happens outside any
//! tree-mutation lock; the publish into the cell is a single atomic
//! store, so racing duplicate compiles are tolerated but can never
//! corrupt the cell.
//!
//! Once more distinct keys than the limit have been seen, the site
//! degrades permanently to an uncached path that recomputes every time —
//! unless the `keep_all` escape hatch trades memory for recompute
//! avoidance. Compiler failures propagate identically on every path:
//! caching changes performance, never error behavior.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use regex::RegexBuilder;
use smallvec::SmallVec;

use arbor_core::intern::InternedString;
use arbor_core::LanguageError;

use crate::specialize::{DeoptReason, DeoptSink};

// =============================================================================
// External Compiler Interface
// =============================================================================

/// A compiled pattern artifact.
pub struct CompiledPattern {
    regex: regex::Regex,
    pattern: InternedString,
    flags: InternedString,
}

impl CompiledPattern {
    /// Test `input` against this pattern.
    #[inline]
    pub fn is_match(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }

    #[inline]
    pub fn pattern(&self) -> &InternedString {
        &self.pattern
    }

    #[inline]
    pub fn flags(&self) -> &InternedString {
        &self.flags
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompiledPattern(/{}/{})", self.pattern, self.flags)
    }
}

/// The external pattern compiler consumed by the cache.
///
/// Must be callable off any lock held by the specialization engine;
/// failures are language-level errors visible to the program.
pub trait PatternCompiler: Send + Sync {
    fn compile(
        &self,
        pattern: &InternedString,
        flags: &InternedString,
    ) -> Result<Arc<CompiledPattern>, LanguageError>;
}

/// Default compiler backed by the `regex` crate.
///
/// Recognized flags: `i` (case-insensitive), `m` (multi-line),
/// `s` (dot-matches-newline), `x` (ignore whitespace).
#[derive(Debug, Default)]
pub struct RegexCompiler;

impl PatternCompiler for RegexCompiler {
    fn compile(
        &self,
        pattern: &InternedString,
        flags: &InternedString,
    ) -> Result<Arc<CompiledPattern>, LanguageError> {
        let mut builder = RegexBuilder::new(pattern.as_str());
        for flag in flags.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                other => {
                    return Err(LanguageError::syntax(format!(
                        "invalid pattern flag '{}'",
                        other
                    )))
                }
            };
        }
        let regex = builder
            .build()
            .map_err(|e| LanguageError::syntax(format!("invalid pattern: {}", e)))?;
        Ok(Arc::new(CompiledPattern {
            regex,
            pattern: pattern.clone(),
            flags: flags.clone(),
        }))
    }
}

// =============================================================================
// Cache
// =============================================================================

/// One guarded entry: two value-compared keys plus an invalidatable
/// artifact cell.
struct CacheEntry {
    pattern: InternedString,
    flags: InternedString,
    /// `None`: not yet computed, or invalidated.
    cell: RwLock<Option<Arc<CompiledPattern>>>,
}

impl CacheEntry {
    fn matches(&self, pattern: &InternedString, flags: &InternedString) -> bool {
        self.pattern == *pattern && self.flags == *flags
    }
}

enum CacheState {
    /// Guarded entries, bounded by the limit (unless `keep_all`).
    Bounded(SmallVec<[Arc<CacheEntry>; 4]>),
    /// Terminal uncached path: always recompute.
    Megamorphic,
}

/// A per-call-site bounded polymorphic compile cache.
pub struct CompileCache {
    state: RwLock<CacheState>,
    compiler: Arc<dyn PatternCompiler>,
    limit: usize,
    keep_all: bool,
    deopt: Arc<dyn DeoptSink>,
}

impl CompileCache {
    /// Create a cache over `compiler` with a per-site entry limit.
    pub fn new(
        compiler: Arc<dyn PatternCompiler>,
        limit: usize,
        keep_all: bool,
        deopt: Arc<dyn DeoptSink>,
    ) -> Self {
        Self {
            state: RwLock::new(CacheState::Bounded(SmallVec::new())),
            compiler,
            limit: limit.max(1),
            keep_all,
            deopt,
        }
    }

    /// Look up or compile the artifact for `(pattern, flags)`.
    ///
    /// Failure propagates identically whether the key is cached, newly
    /// registered, or served by the megamorphic path.
    pub fn get_or_compile(
        &self,
        pattern: &InternedString,
        flags: &InternedString,
    ) -> Result<Arc<CompiledPattern>, LanguageError> {
        // Fast path: existing guarded entry.
        if let Some(entry) = self.find_entry(pattern, flags) {
            if let Some(artifact) = entry.cell.read().clone() {
                return Ok(artifact);
            }
            // Empty or invalidated cell: compute now, outside any lock.
            let artifact = self.compiler.compile(pattern, flags)?;
            // Single atomic publish; a racing thread's duplicate result
            // is equally authoritative.
            *entry.cell.write() = Some(Arc::clone(&artifact));
            return Ok(artifact);
        }

        // Unknown key: try to register a guard, then compile.
        if self.register(pattern, flags) {
            let artifact = self.compiler.compile(pattern, flags)?;
            if let Some(entry) = self.find_entry(pattern, flags) {
                *entry.cell.write() = Some(Arc::clone(&artifact));
            }
            return Ok(artifact);
        }

        // Megamorphic: recompute every time.
        self.compiler.compile(pattern, flags)
    }

    /// Invalidate the cached artifact for a key; the entry's guard stays
    /// registered and the next request recompiles.
    pub fn invalidate(&self, pattern: &InternedString, flags: &InternedString) {
        if let Some(entry) = self.find_entry(pattern, flags) {
            self.deopt.invalidate(DeoptReason::Invalidated);
            *entry.cell.write() = None;
        }
    }

    /// Whether the site has degraded to the uncached path.
    pub fn is_megamorphic(&self) -> bool {
        matches!(&*self.state.read(), CacheState::Megamorphic)
    }

    /// Number of registered guarded entries.
    pub fn entry_count(&self) -> usize {
        match &*self.state.read() {
            CacheState::Bounded(entries) => entries.len(),
            CacheState::Megamorphic => 0,
        }
    }

    fn find_entry(
        &self,
        pattern: &InternedString,
        flags: &InternedString,
    ) -> Option<Arc<CacheEntry>> {
        match &*self.state.read() {
            CacheState::Bounded(entries) => entries
                .iter()
                .find(|e| e.matches(pattern, flags))
                .cloned(),
            CacheState::Megamorphic => None,
        }
    }

    /// Register a guard for a new key. Returns false when the site is
    /// (or just became) megamorphic.
    fn register(&self, pattern: &InternedString, flags: &InternedString) -> bool {
        let mut state = self.state.write();
        match &mut *state {
            CacheState::Megamorphic => false,
            CacheState::Bounded(entries) => {
                // A racing thread may have registered the key already.
                if entries.iter().any(|e| e.matches(pattern, flags)) {
                    return true;
                }
                if entries.len() >= self.limit && !self.keep_all {
                    // Prune: the whole cache collapses to the generic
                    // fallback once the bound is exceeded.
                    self.deopt.invalidate(DeoptReason::CacheOverflow);
                    tracing::debug!(
                        target: "arbor::cache",
                        limit = self.limit,
                        "compile cache went megamorphic"
                    );
                    *state = CacheState::Megamorphic;
                    return false;
                }
                entries.push(Arc::new(CacheEntry {
                    pattern: pattern.clone(),
                    flags: flags.clone(),
                    cell: RwLock::new(None),
                }));
                true
            }
        }
    }
}

impl fmt::Debug for CompileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileCache")
            .field("entries", &self.entry_count())
            .field("limit", &self.limit)
            .field("megamorphic", &self.is_megamorphic())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
