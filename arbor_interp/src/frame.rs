//! Execution frames.
//!
//! A `Frame` is the runtime activation record described by a
//! `FrameLayout`. The activation that created a frame owns it; captured
//! or child frames hold a weak link to their parent for lookup only —
//! whoever needs the parent longest (including captured closures) keeps
//! it alive with a strong handle, never the weak link itself.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use arbor_core::Value;

use crate::slots::{FrameLayout, ScopedName, SlotKind};

/// Shared frame storage: the cell array plus the parent link.
///
/// Cells are behind a read-write lock so instrumentation and debuggers
/// may inspect a live frame; execution itself is single-threaded per
/// activation, so contention on the hot path is zero.
pub struct FrameData {
    layout: Arc<FrameLayout>,
    cells: RwLock<Box<[Value]>>,
    parent: Option<Weak<FrameData>>,
}

/// Handle to a frame. Cloning shares the underlying storage (and
/// extends its lifetime — this is how closures capture their scope).
#[derive(Clone)]
pub struct Frame {
    data: Arc<FrameData>,
}

impl Frame {
    /// Create a root frame for a layout. All cells start undefined.
    pub fn new(layout: Arc<FrameLayout>) -> Self {
        let cells = vec![Value::Undefined; layout.len()].into_boxed_slice();
        Self {
            data: Arc::new(FrameData {
                layout,
                cells: RwLock::new(cells),
                parent: None,
            }),
        }
    }

    /// Create a child frame chained to `parent` through the reserved
    /// parent slot of a block-level layout.
    pub fn new_child(layout: Arc<FrameLayout>, parent: &Frame) -> Self {
        debug_assert!(
            layout.has_parent_slot(),
            "child frames require a block-level layout"
        );
        let cells = vec![Value::Undefined; layout.len()].into_boxed_slice();
        Self {
            data: Arc::new(FrameData {
                layout,
                cells: RwLock::new(cells),
                parent: Some(Arc::downgrade(&parent.data)),
            }),
        }
    }

    /// The layout this frame was allocated from.
    #[inline]
    pub fn layout(&self) -> &Arc<FrameLayout> {
        &self.data.layout
    }

    /// Read a cell.
    #[inline]
    pub fn get(&self, index: u32) -> Value {
        self.data.cells.read()[index as usize].clone()
    }

    /// Write a cell.
    #[inline]
    pub fn set(&self, index: u32, value: Value) {
        self.data.cells.write()[index as usize] = value;
    }

    /// Read a cell expecting its declared kind; `None` on mismatch.
    /// Callers treat a mismatch as a specialization-quality signal.
    pub fn get_int(&self, index: u32) -> Option<i64> {
        debug_assert!(matches!(
            self.data.layout.slot(index).kind(),
            SlotKind::Int | SlotKind::Value | SlotKind::Illegal
        ));
        self.get(index).as_int()
    }

    /// Upgrade the weak parent link. `None` for root frames or when the
    /// parent activation has already been torn down.
    pub fn parent(&self) -> Option<Frame> {
        self.data
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|data| Frame { data })
    }

    /// Resolve a name against this frame and its scope chain.
    pub fn lookup(&self, name: &ScopedName) -> Option<Value> {
        let mut current = self.clone();
        loop {
            if let Some(index) = current.data.layout.index_of(name) {
                return Some(current.get(index));
            }
            current = current.parent()?;
        }
    }

    /// Whether two handles share storage.
    #[inline]
    pub fn same(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// A strong handle suitable for capture by closures or debuggers.
    /// Alias of `clone`, named for intent.
    #[inline]
    pub fn materialize(&self) -> Frame {
        self.clone()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("slots", &self.data.layout.len())
            .field("chained", &self.data.parent.is_some())
            .finish()
    }
}
