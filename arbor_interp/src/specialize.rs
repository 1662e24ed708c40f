//! The specialization / rewrite engine.
//!
//! Each specializing call site carries a `DispatchEngine`: an explicit
//! tagged state (`Uninitialized → Specialized → Polymorphic →
//! Megamorphic`) behind a read-write lock. Lookups scan guards in
//! registration order under the read lock; transitions happen under the
//! brief write lock and never perform unbounded work while holding it —
//! candidates are built outside and only the result is published.
//!
//! Structural rewriting (`replace_self`) swaps a fully built replacement
//! node into the parent's child slot, inheriting source and tags
//! first-wins. Every assumption-breaking transition notifies the
//! injectable `DeoptSink` *before* the transition so downstream compiled
//! artifacts are invalidated first.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::node::{Node, NodeRef};

// =============================================================================
// Deoptimization
// =============================================================================

/// Why an assumption broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeoptReason {
    /// A type guard observed an unexpected operand shape.
    TypeGuard = 0,
    /// Integer arithmetic left the i64 range.
    Overflow = 1,
    /// A call site saw more shapes than the polymorphic limit.
    PolymorphicOverflow = 2,
    /// A compile cache exceeded its per-site entry limit.
    CacheOverflow = 3,
    /// A cached artifact was explicitly invalidated.
    Invalidated = 4,
}

/// Receiver for "transfer to generic interpretation and invalidate
/// compiled artifacts" signals.
///
/// Implementations must be idempotent and cheap when no compiled
/// artifact exists — the signal may fire from the hot path. A no-op
/// implementation is valid for a pure tree-walking backend.
pub trait DeoptSink: Send + Sync {
    fn invalidate(&self, reason: DeoptReason);
}

/// No-op sink for tree-walking embeddings.
#[derive(Debug, Default)]
pub struct NullDeoptSink;

impl DeoptSink for NullDeoptSink {
    #[inline]
    fn invalidate(&self, _reason: DeoptReason) {}
}

/// Sink counting invalidations per reason; used by tests and embeddings
/// that tune specialization limits.
#[derive(Debug, Default)]
pub struct CountingDeoptSink {
    counts: [AtomicU64; 5],
}

impl CountingDeoptSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidations recorded for `reason`.
    pub fn count(&self, reason: DeoptReason) -> u64 {
        self.counts[reason as usize].load(Ordering::Relaxed)
    }

    /// Total invalidations.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }
}

impl DeoptSink for CountingDeoptSink {
    fn invalidate(&self, reason: DeoptReason) {
        self.counts[reason as usize].fetch_add(1, Ordering::Relaxed);
        tracing::debug!(target: "arbor::deopt", ?reason, "assumption invalidated");
    }
}

// =============================================================================
// Dispatch State Machine
// =============================================================================

/// A guarded alternative: a key the guard checks plus the payload to
/// dispatch to on a match.
pub trait GuardedImpl: Clone {
    type Key: PartialEq + Copy + fmt::Debug;

    /// The key this alternative is guarded on.
    fn key(&self) -> Self::Key;
}

/// Per-site dispatch state.
#[derive(Debug, Clone)]
pub enum DispatchState<G> {
    /// No assumption yet.
    Uninitialized,
    /// One guarded fast path.
    Specialized(G),
    /// Several guarded alternatives, tried in registration order.
    Polymorphic(SmallVec<[G; 4]>),
    /// Terminal: guards abandoned, generic path only.
    Megamorphic,
}

/// What `observe` did with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The candidate's key was already registered.
    AlreadyKnown,
    /// The candidate became the first specialization.
    Specialized,
    /// The candidate was appended to the polymorphic guard list.
    Polymorphic,
    /// The limit was exceeded; the site is now (or already was)
    /// megamorphic.
    Megamorphic,
}

/// The per-call-site specialization engine.
pub struct DispatchEngine<G: GuardedImpl> {
    state: RwLock<DispatchState<G>>,
    limit: usize,
    deopt: Arc<dyn DeoptSink>,
}

impl<G: GuardedImpl> DispatchEngine<G> {
    /// A fresh, uninitialized engine.
    pub fn new(limit: usize, deopt: Arc<dyn DeoptSink>) -> Self {
        Self {
            state: RwLock::new(DispatchState::Uninitialized),
            limit: limit.max(1),
            deopt,
        }
    }

    /// Look up the alternative guarding `key`, in registration order.
    /// `None` means uninitialized, unknown key, or megamorphic — the
    /// caller distinguishes the last via [`is_megamorphic`].
    ///
    /// [`is_megamorphic`]: Self::is_megamorphic
    #[inline]
    pub fn lookup(&self, key: G::Key) -> Option<G> {
        match &*self.state.read() {
            DispatchState::Uninitialized | DispatchState::Megamorphic => None,
            DispatchState::Specialized(guard) => (guard.key() == key).then(|| guard.clone()),
            DispatchState::Polymorphic(guards) => {
                guards.iter().find(|g| g.key() == key).cloned()
            }
        }
    }

    /// Whether the site has degraded to the generic path.
    #[inline]
    pub fn is_megamorphic(&self) -> bool {
        matches!(&*self.state.read(), DispatchState::Megamorphic)
    }

    /// Number of registered guards.
    pub fn guard_count(&self) -> usize {
        match &*self.state.read() {
            DispatchState::Uninitialized | DispatchState::Megamorphic => 0,
            DispatchState::Specialized(_) => 1,
            DispatchState::Polymorphic(guards) => guards.len(),
        }
    }

    /// Register a candidate built *outside* any lock. Runs under the
    /// write lock only long enough to publish the new state.
    ///
    /// Promotion past the limit invalidates downstream assumptions
    /// before the state changes.
    pub fn observe(&self, candidate: G) -> Transition {
        let mut state = self.state.write();
        match &mut *state {
            DispatchState::Megamorphic => Transition::Megamorphic,
            DispatchState::Uninitialized => {
                *state = DispatchState::Specialized(candidate);
                tracing::trace!(target: "arbor::specialize", "site specialized");
                Transition::Specialized
            }
            DispatchState::Specialized(existing) => {
                if existing.key() == candidate.key() {
                    return Transition::AlreadyKnown;
                }
                if self.limit < 2 {
                    self.deopt.invalidate(DeoptReason::PolymorphicOverflow);
                    *state = DispatchState::Megamorphic;
                    return Transition::Megamorphic;
                }
                let mut guards = SmallVec::new();
                guards.push(existing.clone());
                guards.push(candidate);
                *state = DispatchState::Polymorphic(guards);
                tracing::trace!(target: "arbor::specialize", "site went polymorphic");
                Transition::Polymorphic
            }
            DispatchState::Polymorphic(guards) => {
                if guards.iter().any(|g| g.key() == candidate.key()) {
                    return Transition::AlreadyKnown;
                }
                if guards.len() >= self.limit {
                    // Signal before the transition: compiled code relying
                    // on the guard set must unwind first.
                    self.deopt.invalidate(DeoptReason::PolymorphicOverflow);
                    *state = DispatchState::Megamorphic;
                    tracing::debug!(target: "arbor::specialize", "site went megamorphic");
                    return Transition::Megamorphic;
                }
                guards.push(candidate);
                Transition::Polymorphic
            }
        }
    }

    /// Drop all guards and return to the generic path permanently.
    pub fn collapse(&self, reason: DeoptReason) {
        self.deopt.invalidate(reason);
        *self.state.write() = DispatchState::Megamorphic;
    }

    /// The sink this engine reports to.
    pub fn deopt_sink(&self) -> &Arc<dyn DeoptSink> {
        &self.deopt
    }
}

impl<G: GuardedImpl + fmt::Debug> fmt::Debug for DispatchEngine<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("state", &*self.state.read())
            .field("limit", &self.limit)
            .finish()
    }
}

// =============================================================================
// Structural Rewriting
// =============================================================================

/// Replace `node` with `replacement` inside its parent's child slot.
///
/// The replacement must be fully built before this call; the swap is a
/// single atomic publication, so concurrent readers observe either the
/// old node or the new node, never a partially constructed one. Source
/// reference and tags transfer first-wins.
///
/// Panics if `node` is not adopted (a tree-structure invariant
/// violation — programmer error, not part of the recoverable taxonomy).
pub fn replace_self(node: &dyn Node, replacement: NodeRef, reason: &str) -> NodeRef {
    let parent = node
        .header()
        .parent()
        .expect("replace_self on an unadopted node");
    for slot in parent.children() {
        if slot.holds(node) {
            return slot.replace(replacement, reason);
        }
    }
    unreachable!("parent does not own the node being replaced");
}

// =============================================================================
// Tests
// =============================================================================
