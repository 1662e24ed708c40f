//! Instrumentation wrappers.
//!
//! A wrapper interposes on a child slot and forwards execution to its
//! delegate, surrounding it with observation callbacks. Wrappers are
//! transparent to structural queries: scope flags and result-type hints
//! forward to the delegate, and `unwrap` recovers the semantic node.
//!
//! Nesting order is fixed: a probe always sits outside a trace wrapper,
//! so peeling proceeds probe, then trace, then the semantic node.
//! Insertion is only legal while the owning tree is still unfrozen.

use std::fmt;
use std::sync::Arc;

use arbor_core::{LanguageError, Value};

use crate::frame::Frame;
use crate::node::{ChildSlot, Node, NodeHeader, NodeRef, TreeRoot};
use crate::shapes::ValueKind;

// =============================================================================
// Wrapper Contract
// =============================================================================

/// Which instrumentation layer a wrapper implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WrapperKind {
    /// Outer layer: user hook callbacks.
    Probe,
    /// Inner layer: structured trace events.
    Trace,
}

/// The wrapper view a node exposes through `Node::as_wrapper`.
pub trait WrapperNode: Send + Sync {
    fn kind(&self) -> WrapperKind;

    /// The wrapped delegate's slot.
    fn delegate_slot(&self) -> &ChildSlot;
}

/// Whether `node` is a wrapper (of any nesting).
#[inline]
pub fn is_wrapper(node: &dyn Node) -> bool {
    node.as_wrapper().is_some()
}

/// Peel all wrapper layers and return the semantic node.
///
/// Terminates because wrapper chains are finite and strictly ordered;
/// the result is never itself a wrapper.
pub fn unwrap(node: NodeRef) -> NodeRef {
    let mut current = node;
    let mut last: Option<WrapperKind> = None;
    loop {
        let next = match current.as_wrapper() {
            Some(wrapper) => {
                debug_assert!(
                    last.map_or(true, |prev| prev <= wrapper.kind()),
                    "wrapper nesting must peel probe before trace"
                );
                last = Some(wrapper.kind());
                wrapper.delegate_slot().get()
            }
            None => break,
        };
        current = next;
    }
    debug_assert!(current.as_wrapper().is_none());
    current
}

// =============================================================================
// Hooks
// =============================================================================

/// Observation callbacks fired by a probe wrapper. All methods default
/// to no-ops so hooks implement only what they need.
pub trait InstrumentHook: Send + Sync {
    fn on_enter(&self, _node: &dyn Node, _frame: &Frame) {}

    fn on_return(&self, _node: &dyn Node, _frame: &Frame, _result: &Value) {}

    fn on_throw(&self, _node: &dyn Node, _frame: &Frame, _error: &LanguageError) {}
}

// =============================================================================
// Errors
// =============================================================================

/// Instrumentation structural errors. Never surfaced to the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrumentError {
    /// The tree is frozen; wrappers insert only during construction.
    TreeFrozen,
}

impl fmt::Display for InstrumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentError::TreeFrozen => {
                write!(f, "cannot insert instrumentation into a frozen tree")
            }
        }
    }
}

impl std::error::Error for InstrumentError {}

// =============================================================================
// Probe Wrapper
// =============================================================================

/// Outer wrapper invoking an `InstrumentHook` around delegate execution.
pub struct ProbeWrapper {
    header: NodeHeader,
    delegate: ChildSlot,
    hook: Arc<dyn InstrumentHook>,
}

impl ProbeWrapper {
    /// Interpose a probe on `slot` within `root`'s tree.
    pub fn insert(
        root: &TreeRoot,
        slot: &ChildSlot,
        hook: Arc<dyn InstrumentHook>,
    ) -> Result<NodeRef, InstrumentError> {
        if root.is_frozen() {
            return Err(InstrumentError::TreeFrozen);
        }
        let wrapper: NodeRef = Arc::new(Self {
            header: NodeHeader::new(),
            delegate: ChildSlot::new(slot.get()),
            hook,
        });
        Ok(slot.replace(wrapper, "probe insertion"))
    }
}

impl Node for ProbeWrapper {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    fn execute(&self, frame: &Frame) -> Result<Value, LanguageError> {
        let delegate = self.delegate.get();
        self.hook.on_enter(&*delegate, frame);
        match delegate.execute(frame) {
            Ok(value) => {
                self.hook.on_return(&*delegate, frame, &value);
                Ok(value)
            }
            Err(error) => {
                self.hook.on_throw(&*delegate, frame, &error);
                Err(error)
            }
        }
    }

    fn children(&self) -> Vec<&ChildSlot> {
        vec![&self.delegate]
    }

    fn as_wrapper(&self) -> Option<&dyn WrapperNode> {
        Some(self)
    }

    fn is_scope(&self) -> bool {
        self.delegate.get().is_scope()
    }

    fn is_frame_scope(&self) -> bool {
        self.delegate.get().is_frame_scope()
    }

    fn is_result_always_of(&self, kind: ValueKind) -> bool {
        self.delegate.get().is_result_always_of(kind)
    }
}

impl WrapperNode for ProbeWrapper {
    fn kind(&self) -> WrapperKind {
        WrapperKind::Probe
    }

    fn delegate_slot(&self) -> &ChildSlot {
        &self.delegate
    }
}

impl fmt::Debug for ProbeWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProbeWrapper({:?})", self.delegate)
    }
}

// =============================================================================
// Trace Wrapper
// =============================================================================

/// Inner wrapper emitting structured trace events around execution.
pub struct TraceWrapper {
    header: NodeHeader,
    delegate: ChildSlot,
}

impl TraceWrapper {
    /// Interpose a trace layer on `slot` within `root`'s tree.
    ///
    /// If the slot already holds a probe, the trace layer is threaded
    /// beneath it so the probe stays outermost.
    pub fn insert(root: &TreeRoot, slot: &ChildSlot) -> Result<NodeRef, InstrumentError> {
        if root.is_frozen() {
            return Err(InstrumentError::TreeFrozen);
        }
        let current = slot.get();
        if let Some(wrapper) = current.as_wrapper() {
            if wrapper.kind() == WrapperKind::Probe {
                return Self::insert(root, wrapper.delegate_slot());
            }
        }
        let wrapper: NodeRef = Arc::new(Self {
            header: NodeHeader::new(),
            delegate: ChildSlot::new(current),
        });
        Ok(slot.replace(wrapper, "trace insertion"))
    }
}

impl Node for TraceWrapper {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    fn execute(&self, frame: &Frame) -> Result<Value, LanguageError> {
        let delegate = self.delegate.get();
        tracing::trace!(target: "arbor::instrument", node = ?delegate, "enter");
        match delegate.execute(frame) {
            Ok(value) => {
                tracing::trace!(target: "arbor::instrument", node = ?delegate, result = %value, "return");
                Ok(value)
            }
            Err(error) => {
                tracing::trace!(target: "arbor::instrument", node = ?delegate, error = %error, "throw");
                Err(error)
            }
        }
    }

    fn children(&self) -> Vec<&ChildSlot> {
        vec![&self.delegate]
    }

    fn as_wrapper(&self) -> Option<&dyn WrapperNode> {
        Some(self)
    }

    fn is_scope(&self) -> bool {
        self.delegate.get().is_scope()
    }

    fn is_frame_scope(&self) -> bool {
        self.delegate.get().is_frame_scope()
    }

    fn is_result_always_of(&self, kind: ValueKind) -> bool {
        self.delegate.get().is_result_always_of(kind)
    }
}

impl WrapperNode for TraceWrapper {
    fn kind(&self) -> WrapperKind {
        WrapperKind::Trace
    }

    fn delegate_slot(&self) -> &ChildSlot {
        &self.delegate
    }
}

impl fmt::Debug for TraceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceWrapper({:?})", self.delegate)
    }
}

// =============================================================================
// Tests
// =============================================================================
