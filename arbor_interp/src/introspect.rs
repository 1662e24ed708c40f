//! Scope introspection for tools and debuggers.
//!
//! Walks parent links upward from a node to the nearest enclosing
//! lexical scope or frame-backed scope. Both walks terminate because an
//! adopted tree's root is itself a frame scope; walking from an
//! unadopted node is a programmer error and panics.

use rustc_hash::FxHashSet;

use arbor_core::Value;

use crate::frame::Frame;
use crate::node::{Node, NodeRef};
use crate::slots::{ScopedName, PARENT_SLOT_INDEX};
use crate::wrapper;

/// The nearest enclosing lexical-scope node, starting at `node` itself.
pub fn find_scope_node(node: &NodeRef) -> NodeRef {
    find_upward(node, |n| n.is_scope())
}

/// The nearest enclosing scope node backed by its own frame.
pub fn find_frame_scope_node(node: &NodeRef) -> NodeRef {
    find_upward(node, |n| n.is_frame_scope())
}

fn find_upward(node: &NodeRef, pred: impl Fn(&dyn Node) -> bool) -> NodeRef {
    let mut current = node.clone();
    loop {
        if pred(&*current) {
            // A wrapper answers for its delegate; hand back the
            // semantic node.
            return wrapper::unwrap(current);
        }
        if current.is_root() {
            // The root reports as a frame scope, so the predicate must
            // have matched above.
            unreachable!("scope walk passed the tree root");
        }
        current = current
            .header()
            .parent()
            .expect("scope walk from an unadopted node");
    }
}

/// Debugger view of the identifiers visible from a frame.
///
/// Walks the frame chain outward; inner declarations shadow outer ones,
/// and the reserved parent link is not a visible identifier.
pub struct ScopeView {
    frame: Frame,
}

impl ScopeView {
    pub fn of(frame: &Frame) -> Self {
        Self {
            frame: frame.materialize(),
        }
    }

    /// Visible `(name, current value)` pairs, innermost first.
    pub fn visible(&self) -> Vec<(ScopedName, Value)> {
        let mut seen: FxHashSet<ScopedName> = FxHashSet::default();
        let mut out = Vec::new();
        let mut current = Some(self.frame.clone());
        while let Some(frame) = current {
            for (index, slot) in frame.layout().iter().enumerate() {
                if frame.layout().has_parent_slot() && index as u32 == PARENT_SLOT_INDEX {
                    continue;
                }
                if seen.insert(slot.name().clone()) {
                    out.push((slot.name().clone(), frame.get(index as u32)));
                }
            }
            current = frame.parent();
        }
        out
    }
}
