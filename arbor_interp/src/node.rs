//! The executable tree unit and the replacement protocol.
//!
//! Every node exposes a typed execution contract (`execute` plus
//! narrowed variants), carries a packed source/tag header, and can be
//! structurally replaced within its parent. The tree is single-owner:
//! each node lives in exactly one `ChildSlot`; the parent back-reference
//! exists for structural operations only, never for execution.
//!
//! Replacement publishes a fully built node with a single atomic swap of
//! the child pointer — a concurrent reader (e.g. a background compiler)
//! sees the old node consistently or the new one consistently, never a
//! partially constructed one.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use arbor_core::{LanguageError, Source, SourceError, SourceSection, Value};

use crate::frame::Frame;
use crate::slots::FrameLayout;
use crate::wrapper::WrapperNode;

/// Shared handle to a tree node.
pub type NodeRef = Arc<dyn Node>;

/// Outcome of a narrowed execute that did not produce the requested
/// type.
///
/// `Value` is a specialization-quality signal: the node ran fine but the
/// result did not narrow; the caller falls back to generic handling and
/// the mismatch never surfaces to the running program. `Thrown` is a
/// genuine language-level error to propagate unchanged.
#[derive(Debug)]
pub enum Unexpected {
    /// Execution succeeded with a value of the wrong type.
    Value(Value),
    /// Execution raised a language-level error.
    Thrown(LanguageError),
}

impl Unexpected {
    /// Recover the generic result, propagating thrown errors.
    #[inline]
    pub fn into_result(self) -> Result<Value, LanguageError> {
        match self {
            Unexpected::Value(v) => Ok(v),
            Unexpected::Thrown(e) => Err(e),
        }
    }
}

/// Error adding an instrumentation tag after the owning tree froze.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagError;

impl fmt::Display for TagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("cannot add instrumentation tags to a frozen tree")
    }
}

impl std::error::Error for TagError {}

// =============================================================================
// Node Contract
// =============================================================================

/// One executable unit of the AST.
pub trait Node: Send + Sync + fmt::Debug {
    /// The packed source/tag/parent header.
    fn header(&self) -> &NodeHeader;

    /// Execute this node against a frame and return the result value.
    fn execute(&self, frame: &Frame) -> Result<Value, LanguageError>;

    /// Like `execute`, narrowing the result to an integer. Nodes that
    /// can produce an int without boxing override this.
    fn execute_int(&self, frame: &Frame) -> Result<i64, Unexpected> {
        match self.execute(frame) {
            Ok(Value::Int(v)) => Ok(v),
            Ok(other) => Err(Unexpected::Value(other)),
            Err(e) => Err(Unexpected::Thrown(e)),
        }
    }

    /// Like `execute`, narrowing the result to a float. Ints widen when
    /// the conversion is exact; a float never narrows to an int.
    fn execute_float(&self, frame: &Frame) -> Result<f64, Unexpected> {
        match self.execute(frame) {
            Ok(value) => match value.as_float() {
                Some(v) => Ok(v),
                None => Err(Unexpected::Value(value)),
            },
            Err(e) => Err(Unexpected::Thrown(e)),
        }
    }

    /// Like `execute`, narrowing the result to a boolean.
    fn execute_bool(&self, frame: &Frame) -> Result<bool, Unexpected> {
        match self.execute(frame) {
            Ok(Value::Bool(v)) => Ok(v),
            Ok(other) => Err(Unexpected::Value(other)),
            Err(e) => Err(Unexpected::Thrown(e)),
        }
    }

    /// Execute for effect, discarding the result.
    fn execute_void(&self, frame: &Frame) -> Result<(), LanguageError> {
        self.execute(frame).map(|_| ())
    }

    /// Child slots, for adoption and structural replacement.
    fn children(&self) -> Vec<&ChildSlot> {
        Vec::new()
    }

    /// Instrumentation wrappers return their wrapper view here.
    fn as_wrapper(&self) -> Option<&dyn WrapperNode> {
        None
    }

    /// Whether this node opens a lexical scope.
    fn is_scope(&self) -> bool {
        false
    }

    /// Whether this node's scope is backed by its own frame.
    fn is_frame_scope(&self) -> bool {
        false
    }

    /// Whether this node is an adopted tree root.
    fn is_root(&self) -> bool {
        false
    }

    /// Whether this node is the root of a frozen tree. Non-root nodes
    /// answer through their root via the parent chain.
    fn is_frozen_root(&self) -> bool {
        false
    }

    /// Static result-type hint; lets the assembler skip re-specializing
    /// nodes whose result kind is fixed.
    fn is_result_always_of(&self, _kind: crate::shapes::ValueKind) -> bool {
        false
    }
}

// =============================================================================
// Node Header: packed source reference + tag bitset
// =============================================================================

/// Statement tag, packed into the high bit of the length word.
const STATEMENT_TAG_BIT: u32 = 1 << 31;
/// Call tag, second-highest bit of the length word.
const CALL_TAG_BIT: u32 = 1 << 30;
/// Payload mask of the length word.
const CHAR_LENGTH_MASK: u32 = !(STATEMENT_TAG_BIT | CALL_TAG_BIT);

/// Root-body tag, packed into the high bit of the index word.
const ROOT_BODY_TAG_BIT: u32 = 1 << 31;
/// Expression tag, second-highest bit of the index word.
const EXPRESSION_TAG_BIT: u32 = 1 << 30;
/// Payload mask of the index word.
const CHAR_INDEX_MASK: u32 = !(ROOT_BODY_TAG_BIT | EXPRESSION_TAG_BIT);

/// The four instrumentation tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Statement,
    Call,
    RootBody,
    Expression,
}

/// Source slot: either an unresolved source + packed offset/length, or
/// a resolved section cached after first resolution.
enum SourceSlot {
    None,
    Raw(Arc<Source>),
    Resolved(SourceSection),
}

/// Per-node header: source reference, tag bitset, parent back-reference.
///
/// The offset/length payload and the four tag bits pack into two `u32`
/// words to keep per-node memory small; tag reads on the hot path are
/// single relaxed loads.
pub struct NodeHeader {
    source: Mutex<SourceSlot>,
    char_index: AtomicU32,
    char_length: AtomicU32,
    parent: Mutex<Option<Weak<dyn Node>>>,
}

impl NodeHeader {
    /// A header with no source reference.
    pub fn new() -> Self {
        Self {
            source: Mutex::new(SourceSlot::None),
            char_index: AtomicU32::new(0),
            char_length: AtomicU32::new(0),
            parent: Mutex::new(None),
        }
    }

    /// A header covering `(offset, length)` of `source`. Bounds-checked;
    /// malformed bounds are a construction-time error.
    pub fn with_source(source: &Arc<Source>, offset: u32, length: u32) -> Result<Self, SourceError> {
        source.check_bounds(offset, length)?;
        debug_assert!(offset <= CHAR_INDEX_MASK && length <= CHAR_LENGTH_MASK);
        let header = Self::new();
        *header.source.lock() = SourceSlot::Raw(Arc::clone(source));
        header.char_index.store(offset & CHAR_INDEX_MASK, Ordering::Relaxed);
        header.char_length.store(length & CHAR_LENGTH_MASK, Ordering::Relaxed);
        Ok(header)
    }

    /// Whether this node owns a source reference.
    pub fn has_source(&self) -> bool {
        !matches!(*self.source.lock(), SourceSlot::None)
    }

    /// Resolve (and cache) the source section. Diagnostics path only —
    /// never called during hot execution.
    pub fn source_section(&self) -> Option<SourceSection> {
        let mut slot = self.source.lock();
        match &*slot {
            SourceSlot::None => None,
            SourceSlot::Resolved(section) => Some(section.clone()),
            SourceSlot::Raw(source) => {
                let offset = self.char_index.load(Ordering::Relaxed) & CHAR_INDEX_MASK;
                let length = self.char_length.load(Ordering::Relaxed) & CHAR_LENGTH_MASK;
                // Bounds were validated when the source was attached.
                let section = source
                    .section(offset, length)
                    .expect("validated source bounds");
                *slot = SourceSlot::Resolved(section.clone());
                Some(section)
            }
        }
    }

    /// Set a tag bit. Rejected once the owning tree is frozen; nodes
    /// not yet adopted into a tree are still under construction and may
    /// always be tagged.
    pub fn add_tag(&self, tag: Tag) -> Result<(), TagError> {
        if self.owning_root().is_some_and(|root| root.is_frozen_root()) {
            return Err(TagError);
        }
        match tag {
            Tag::Statement => self.char_length.fetch_or(STATEMENT_TAG_BIT, Ordering::Relaxed),
            Tag::Call => self.char_length.fetch_or(CALL_TAG_BIT, Ordering::Relaxed),
            Tag::RootBody => self.char_index.fetch_or(ROOT_BODY_TAG_BIT, Ordering::Relaxed),
            Tag::Expression => self.char_index.fetch_or(EXPRESSION_TAG_BIT, Ordering::Relaxed),
        };
        Ok(())
    }

    /// The adopted root above this node, if any.
    fn owning_root(&self) -> Option<NodeRef> {
        let mut current = self.parent()?;
        loop {
            if current.is_root() {
                return Some(current);
            }
            current = current.header().parent()?;
        }
    }

    /// Whether a tag bit is set.
    pub fn has_tag(&self, tag: Tag) -> bool {
        match tag {
            Tag::Statement => self.char_length.load(Ordering::Relaxed) & STATEMENT_TAG_BIT != 0,
            Tag::Call => self.char_length.load(Ordering::Relaxed) & CALL_TAG_BIT != 0,
            Tag::RootBody => self.char_index.load(Ordering::Relaxed) & ROOT_BODY_TAG_BIT != 0,
            Tag::Expression => self.char_index.load(Ordering::Relaxed) & EXPRESSION_TAG_BIT != 0,
        }
    }

    /// Whether any must-survive-simplification tag is set. Callers that
    /// flatten trees check this before dropping a node.
    pub fn has_important_tag(&self) -> bool {
        let index = self.char_index.load(Ordering::Relaxed);
        let length = self.char_length.load(Ordering::Relaxed);
        index & (ROOT_BODY_TAG_BIT | EXPRESSION_TAG_BIT) != 0
            || length & (STATEMENT_TAG_BIT | CALL_TAG_BIT) != 0
    }

    /// Inherit source reference and tags from `from` — first-wins: the
    /// receiver keeps its own source if it already has one; its existing
    /// tag bits are preserved and merged with the donor's.
    pub fn transfer_from(&self, from: &NodeHeader) {
        if self.has_source() || !from.has_source() {
            // Still merge nothing: a node with its own source keeps its
            // own position and tags untouched.
            return;
        }
        let from_index = from.char_index.load(Ordering::Relaxed);
        let from_length = from.char_length.load(Ordering::Relaxed);
        let own_tags_index = self.char_index.load(Ordering::Relaxed) & !CHAR_INDEX_MASK;
        let own_tags_length = self.char_length.load(Ordering::Relaxed) & !CHAR_LENGTH_MASK;
        self.char_index.store(from_index | own_tags_index, Ordering::Relaxed);
        self.char_length.store(from_length | own_tags_length, Ordering::Relaxed);

        let donor = from.source.lock();
        let mut own = self.source.lock();
        *own = match &*donor {
            SourceSlot::None => SourceSlot::None,
            SourceSlot::Raw(source) => SourceSlot::Raw(Arc::clone(source)),
            SourceSlot::Resolved(section) => SourceSlot::Resolved(section.clone()),
        };
    }

    /// The parent node, if adopted.
    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_parent(&self, parent: &NodeRef) {
        *self.parent.lock() = Some(Arc::downgrade(parent));
    }
}

impl Default for NodeHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHeader")
            .field("has_source", &self.has_source())
            .field("important", &self.has_important_tag())
            .finish()
    }
}

// =============================================================================
// Child Slots: atomic parent → child links
// =============================================================================

/// An atomically swappable owned child link.
///
/// Readers clone the `Arc` under a brief read lock; replacement swaps a
/// fully built node under the write lock. Rewrites are rare relative to
/// execution, so the cost sits on the write side.
pub struct ChildSlot {
    node: RwLock<NodeRef>,
}

impl ChildSlot {
    /// Wrap a fully initialized node.
    pub fn new(node: NodeRef) -> Self {
        Self {
            node: RwLock::new(node),
        }
    }

    /// The current child.
    #[inline]
    pub fn get(&self) -> NodeRef {
        Arc::clone(&self.node.read())
    }

    /// Replace the child with `replacement`, transferring the source
    /// reference and tags from the outgoing node (first-wins) and
    /// adopting the replacement into the outgoing node's parent.
    ///
    /// The swap is the single publication point: `replacement` must be
    /// fully built before this call.
    pub fn replace(&self, replacement: NodeRef, reason: &str) -> NodeRef {
        let mut guard = self.node.write();
        let old = Arc::clone(&guard);
        replacement.header().transfer_from(old.header());
        if let Some(parent) = old.header().parent() {
            replacement.header().set_parent(&parent);
        }
        adopt_children(&replacement);
        tracing::debug!(target: "arbor::rewrite", reason, old = ?old, new = ?replacement, "node replaced");
        *guard = Arc::clone(&replacement);
        replacement
    }

    /// Whether this slot currently holds `node`.
    pub fn holds(&self, node: &dyn Node) -> bool {
        let current = self.node.read();
        std::ptr::addr_eq(Arc::as_ptr(&*current), node as *const dyn Node)
    }
}

impl fmt::Debug for ChildSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChildSlot({:?})", self.node.read())
    }
}

/// Set `parent` as the parent of every direct child of `parent`.
pub(crate) fn adopt_children(parent: &NodeRef) {
    for slot in parent.children() {
        let child = slot.get();
        child.header().set_parent(parent);
        adopt_children(&child);
    }
}

// =============================================================================
// Tree Root
// =============================================================================

/// The adopted root of an executable tree.
///
/// Owns the body slot and the frame layout; `call` allocates a fresh
/// frame per activation. Once frozen, instrumentation tags and wrapper
/// insertion are rejected; node rewrites remain allowed (they are the
/// point of the whole exercise).
pub struct TreeRoot {
    header: NodeHeader,
    layout: Arc<FrameLayout>,
    body: ChildSlot,
    frozen: AtomicBool,
}

impl TreeRoot {
    /// Create a root over `body` with the given frame layout. The tree
    /// is adopted (parent links wired) but not yet frozen.
    pub fn new(layout: Arc<FrameLayout>, body: NodeRef) -> Arc<Self> {
        let root = Arc::new(Self {
            header: NodeHeader::new(),
            layout,
            body: ChildSlot::new(body),
            frozen: AtomicBool::new(false),
        });
        let as_node: NodeRef = Arc::clone(&root) as NodeRef;
        adopt_children(&as_node);
        root
    }

    /// The frame layout activations of this tree use.
    #[inline]
    pub fn layout(&self) -> &Arc<FrameLayout> {
        &self.layout
    }

    /// The body slot (exposed for instrumentation insertion).
    #[inline]
    pub fn body(&self) -> &ChildSlot {
        &self.body
    }

    /// Freeze the tree: construction is over.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// Whether the tree is frozen.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Execute one activation of this tree.
    pub fn call(&self) -> Result<Value, LanguageError> {
        let frame = Frame::new(Arc::clone(&self.layout));
        self.body.get().execute(&frame)
    }

    /// Execute against a caller-provided frame (embedding entry point).
    pub fn call_with_frame(&self, frame: &Frame) -> Result<Value, LanguageError> {
        self.body.get().execute(frame)
    }
}

impl Node for TreeRoot {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    fn execute(&self, frame: &Frame) -> Result<Value, LanguageError> {
        self.body.get().execute(frame)
    }

    fn children(&self) -> Vec<&ChildSlot> {
        vec![&self.body]
    }

    fn is_root(&self) -> bool {
        true
    }

    fn is_frozen_root(&self) -> bool {
        self.is_frozen()
    }

    fn is_scope(&self) -> bool {
        true
    }

    fn is_frame_scope(&self) -> bool {
        true
    }
}

impl fmt::Debug for TreeRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeRoot")
            .field("slots", &self.layout.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::literal::ConstantNode;

    #[test]
    fn test_tag_roundtrip_preserves_payload() {
        let source = Source::new("t.ab", "x + y her");
        let header = NodeHeader::with_source(&source, 4, 5).unwrap();

        header.add_tag(Tag::Statement).unwrap();
        header.add_tag(Tag::Expression).unwrap();
        assert!(header.has_tag(Tag::Statement));
        assert!(header.has_tag(Tag::Expression));
        assert!(!header.has_tag(Tag::Call));
        assert!(!header.has_tag(Tag::RootBody));
        assert!(header.has_important_tag());

        // Tag bits never perturb the packed offset/length payload.
        let section = header.source_section().unwrap();
        assert_eq!(section.offset(), 4);
        assert_eq!(section.length(), 5);
    }

    #[test]
    fn test_all_tag_subsets() {
        for bits in 0u8..16 {
            let header = NodeHeader::new();
            let tags = [Tag::Statement, Tag::Call, Tag::RootBody, Tag::Expression];
            for (i, tag) in tags.iter().enumerate() {
                if bits & (1 << i) != 0 {
                    header.add_tag(*tag).unwrap();
                }
            }
            for (i, tag) in tags.iter().enumerate() {
                assert_eq!(header.has_tag(*tag), bits & (1 << i) != 0);
            }
        }
    }

    #[test]
    fn test_source_section_is_cached() {
        let source = Source::new("t.ab", "abcdef");
        let header = NodeHeader::with_source(&source, 1, 3).unwrap();
        let first = header.source_section().unwrap();
        let second = header.source_section().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.text(), "bcd");
    }

    #[test]
    fn test_malformed_source_bounds_rejected() {
        let source = Source::new("t.ab", "ab");
        assert!(NodeHeader::with_source(&source, 1, 5).is_err());
    }

    #[test]
    fn test_transfer_is_first_wins() {
        let source = Source::new("t.ab", "old text here");
        let donor = NodeHeader::with_source(&source, 0, 3).unwrap();
        donor.add_tag(Tag::Statement).unwrap();

        // Receiver without source inherits position and tags.
        let bare = NodeHeader::new();
        bare.add_tag(Tag::Call).unwrap();
        bare.transfer_from(&donor);
        assert!(bare.has_source());
        assert!(bare.has_tag(Tag::Statement));
        assert!(bare.has_tag(Tag::Call)); // own tag survives the merge
        assert_eq!(bare.source_section().unwrap().offset(), 0);

        // Receiver with its own source keeps it.
        let own = NodeHeader::with_source(&source, 4, 4).unwrap();
        own.transfer_from(&donor);
        assert_eq!(own.source_section().unwrap().offset(), 4);
    }

    #[test]
    fn test_tags_rejected_after_freeze() {
        let body = ConstantNode::boxed(Value::int(1));
        let root = TreeRoot::new(crate::slots::SlotTable::function_level().close(), body.clone());

        // Adopted but unfrozen: tagging is still construction.
        body.header().add_tag(Tag::Statement).unwrap();

        root.freeze();
        assert_eq!(body.header().add_tag(Tag::Call), Err(TagError));
        assert!(body.header().has_tag(Tag::Statement));
        assert!(!body.header().has_tag(Tag::Call));
    }

    #[test]
    fn test_child_slot_replace_publishes_new_node() {
        let slot = ChildSlot::new(ConstantNode::boxed(Value::int(1)));
        let old = slot.get();
        assert!(slot.holds(&*old));

        let replacement = ConstantNode::boxed(Value::int(2));
        slot.replace(replacement, "test swap");
        assert!(!slot.holds(&*old));
        let frame = Frame::new(crate::slots::SlotTable::function_level().close());
        assert_eq!(slot.get().execute(&frame).unwrap().as_int(), Some(2));
    }
}
