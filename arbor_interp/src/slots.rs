//! Slot tables: symbol table → storage layout.
//!
//! A `SlotTable` assigns every local or captured variable a stable
//! integer slot while the tree is under construction, then closes into
//! an immutable `FrameLayout` consumed by every frame for that tree.
//! Closing happens exactly once; adding after close is an error, never a
//! silent no-op.
//!
//! Two factory shapes exist: function-level tables are flat; block-level
//! tables reserve slot 0 for the parent scope's frame, forming a
//! singly-linked scope chain.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, OnceLock};

use dashmap::DashMap;
use rustc_hash::FxHashMap;

use arbor_core::intern::{intern, InternedString};

/// Storage kind of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Not yet observed; reads are undefined-valued.
    Illegal,
    /// Generic boxed value.
    Value,
    /// Unboxed integer.
    Int,
    /// Unboxed float.
    Float,
    /// Unboxed boolean.
    Bool,
}

/// Errors from slot-table construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// The identifier is already present in this table.
    DuplicateSlot { name: String },
    /// The table has been closed; no slot may be added.
    TableClosed { name: String },
}

impl fmt::Display for SlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotError::DuplicateSlot { name } => {
                write!(f, "duplicate slot for identifier '{}'", name)
            }
            SlotError::TableClosed { name } => {
                write!(f, "cannot add slot '{}': table is closed", name)
            }
        }
    }
}

impl std::error::Error for SlotError {}

// =============================================================================
// Scoped Identifiers
// =============================================================================

/// Opaque scope token distinguishing same-named identifiers from
/// different lexical scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeTag(u64);

impl ScopeTag {
    /// Allocate a fresh, process-unique tag.
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ScopeTag(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A possibly scope-qualified identifier.
///
/// Two scoped names are equal only when both the printable name and the
/// scope tag match; two slots with the same printable name but different
/// tags are distinct entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopedName {
    name: InternedString,
    scope: Option<ScopeTag>,
}

impl ScopedName {
    /// An unscoped name.
    pub fn plain(name: impl Into<InternedString>) -> Self {
        Self {
            name: name.into(),
            scope: None,
        }
    }

    /// A name qualified by a scope tag.
    pub fn scoped(name: impl Into<InternedString>, scope: ScopeTag) -> Self {
        Self {
            name: name.into(),
            scope: Some(scope),
        }
    }

    #[inline]
    pub fn name(&self) -> &InternedString {
        &self.name
    }

    #[inline]
    pub fn scope(&self) -> Option<ScopeTag> {
        self.scope
    }
}

impl fmt::Display for ScopedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Some(ScopeTag(tag)) => write!(f, "{}#{}", self.name, tag),
            None => f.write_str(self.name.as_str()),
        }
    }
}

impl From<&str> for ScopedName {
    fn from(s: &str) -> Self {
        ScopedName::plain(s)
    }
}

// =============================================================================
// Flag Interning
// =============================================================================

/// Mask of flag bits a slot may carry; higher bits are discarded on add.
pub const SLOT_FLAGS_MASK: u32 = 0xFFFF;

/// Flag values below this bound share a prebuilt table entry.
const SMALL_FLAG_BOUND: u32 = 256;

/// Prebuilt shared handles for the common small flag values.
static SMALL_FLAGS: LazyLock<Vec<Arc<u32>>> =
    LazyLock::new(|| (0..SMALL_FLAG_BOUND).map(Arc::new).collect());

/// Process-wide intern table for unusual flag combinations.
///
/// Insert-if-absent; many slots across independent trees sharing an
/// unusual flag value share one heap object. Grows without eviction —
/// flag combinations form a small closed set in practice. Memory
/// footprint optimization only, not a correctness requirement.
static FLAG_INTERN: LazyLock<DashMap<u32, Arc<u32>>> = LazyLock::new(DashMap::new);

/// Intern a flag value, returning the canonical shared handle.
pub fn intern_flags(bits: u32) -> Arc<u32> {
    let bits = bits & SLOT_FLAGS_MASK;
    if bits < SMALL_FLAG_BOUND {
        return Arc::clone(&SMALL_FLAGS[bits as usize]);
    }
    FLAG_INTERN
        .entry(bits)
        .or_insert_with(|| Arc::new(bits))
        .clone()
}

// =============================================================================
// Slots
// =============================================================================

/// One storage slot. Immutable once created; lives as long as the
/// owning table.
#[derive(Debug)]
pub struct Slot {
    index: u32,
    name: ScopedName,
    flags: u32,
    kind: SlotKind,
}

impl Slot {
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn name(&self) -> &ScopedName {
        &self.name
    }

    #[inline]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    #[inline]
    pub fn kind(&self) -> SlotKind {
        self.kind
    }
}

/// Table shape: flat function scope or chained block scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableShape {
    Function,
    Block,
}

/// Index of the reserved parent-frame slot in block-level tables.
pub const PARENT_SLOT_INDEX: u32 = 0;

/// A growable identifier → slot mapping, closed exactly once into a
/// `FrameLayout`.
pub struct SlotTable {
    shape: TableShape,
    slots: Vec<Arc<Slot>>,
    by_name: FxHashMap<ScopedName, u32>,
    layout: OnceLock<Arc<FrameLayout>>,
}

impl SlotTable {
    /// A flat function-level table.
    pub fn function_level() -> Self {
        Self {
            shape: TableShape::Function,
            slots: Vec::new(),
            by_name: FxHashMap::default(),
            layout: OnceLock::new(),
        }
    }

    /// A block-level table with slot 0 reserved for the parent frame.
    pub fn block_level() -> Self {
        let mut table = Self {
            shape: TableShape::Block,
            slots: Vec::new(),
            by_name: FxHashMap::default(),
            layout: OnceLock::new(),
        };
        let parent = ScopedName::plain(intern("<parent>"));
        table
            .add_slot(parent, 0, SlotKind::Value)
            .expect("fresh table cannot reject the reserved slot");
        table
    }

    #[inline]
    pub fn shape(&self) -> TableShape {
        self.shape
    }

    /// Number of slots added so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether `close()` has run.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.layout.get().is_some()
    }

    /// Add a slot for `name`. Rejects duplicates and closed tables.
    pub fn add_slot(
        &mut self,
        name: impl Into<ScopedName>,
        flags: u32,
        kind: SlotKind,
    ) -> Result<Arc<Slot>, SlotError> {
        let name = name.into();
        if self.is_closed() {
            return Err(SlotError::TableClosed {
                name: name.to_string(),
            });
        }
        if self.by_name.contains_key(&name) {
            return Err(SlotError::DuplicateSlot {
                name: name.to_string(),
            });
        }
        let index = self.slots.len() as u32;
        let slot = Arc::new(Slot {
            index,
            name: name.clone(),
            flags: flags & SLOT_FLAGS_MASK,
            kind,
        });
        self.by_name.insert(name, index);
        self.slots.push(Arc::clone(&slot));
        Ok(slot)
    }

    /// Look up an existing slot.
    pub fn find_slot(&self, name: &ScopedName) -> Option<Arc<Slot>> {
        self.by_name
            .get(name)
            .map(|&idx| Arc::clone(&self.slots[idx as usize]))
    }

    /// Common construction path: resolve or declare in one step.
    pub fn find_or_add_slot(
        &mut self,
        name: impl Into<ScopedName>,
        flags: u32,
        kind: SlotKind,
    ) -> Result<Arc<Slot>, SlotError> {
        let name = name.into();
        if let Some(slot) = self.find_slot(&name) {
            return Ok(slot);
        }
        self.add_slot(name, flags, kind)
    }

    /// Close the table, materializing the flat layout.
    ///
    /// Idempotent: repeated calls return the same layout. Closing is the
    /// permanent terminal state.
    pub fn close(&self) -> Arc<FrameLayout> {
        Arc::clone(self.layout.get_or_init(|| {
            let entries = self
                .slots
                .iter()
                .map(|slot| LayoutSlot {
                    name: slot.name.clone(),
                    kind: slot.kind,
                    flags: intern_flags(slot.flags),
                })
                .collect();
            let by_name = self
                .by_name
                .iter()
                .map(|(k, &v)| (k.clone(), v))
                .collect();
            Arc::new(FrameLayout {
                shape: self.shape,
                entries,
                by_name,
            })
        }))
    }
}

impl fmt::Debug for SlotTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotTable")
            .field("shape", &self.shape)
            .field("len", &self.slots.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Frame Layout
// =============================================================================

/// One materialized layout entry.
#[derive(Debug, Clone)]
pub struct LayoutSlot {
    name: ScopedName,
    kind: SlotKind,
    flags: Arc<u32>,
}

impl LayoutSlot {
    #[inline]
    pub fn name(&self) -> &ScopedName {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    #[inline]
    pub fn flags(&self) -> u32 {
        *self.flags
    }

    /// The interned flag handle (shared across slots and tables).
    #[inline]
    pub fn flags_handle(&self) -> &Arc<u32> {
        &self.flags
    }
}

/// The immutable, flat storage layout produced by `SlotTable::close`.
#[derive(Debug)]
pub struct FrameLayout {
    shape: TableShape,
    entries: Box<[LayoutSlot]>,
    by_name: FxHashMap<ScopedName, u32>,
}

impl FrameLayout {
    #[inline]
    pub fn shape(&self) -> TableShape {
        self.shape
    }

    /// Number of storage cells a frame for this layout needs.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Layout entry by index.
    #[inline]
    pub fn slot(&self, index: u32) -> &LayoutSlot {
        &self.entries[index as usize]
    }

    /// Index of a name in this layout.
    pub fn index_of(&self, name: &ScopedName) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Insertion-ordered entries.
    pub fn iter(&self) -> impl Iterator<Item = &LayoutSlot> {
        self.entries.iter()
    }

    /// Whether this layout carries the reserved parent-frame slot.
    #[inline]
    pub fn has_parent_slot(&self) -> bool {
        self.shape == TableShape::Block
    }
}

// =============================================================================
// Tests
// =============================================================================
