//! Block scopes.
//!
//! A block either materializes its own frame (chained to the caller's
//! through the reserved parent slot) or, when it declares nothing,
//! executes its body directly on the enclosing frame. The second form is
//! still a lexical scope for introspection, just not a frame scope.

use std::sync::Arc;

use arbor_core::{LanguageError, Value};

use crate::frame::Frame;
use crate::node::{ChildSlot, Node, NodeHeader, NodeRef};
use crate::slots::FrameLayout;

#[derive(Debug)]
pub struct BlockScopeNode {
    header: NodeHeader,
    /// `None` for virtualized blocks with no slots of their own.
    layout: Option<Arc<FrameLayout>>,
    body: ChildSlot,
}

impl BlockScopeNode {
    /// A block backed by its own frame. The layout must be block-shaped.
    pub fn with_frame(layout: Arc<FrameLayout>, body: NodeRef) -> Self {
        debug_assert!(layout.has_parent_slot());
        Self {
            header: NodeHeader::new(),
            layout: Some(layout),
            body: ChildSlot::new(body),
        }
    }

    /// A block with no declarations: no frame is allocated.
    pub fn virtualized(body: NodeRef) -> Self {
        Self {
            header: NodeHeader::new(),
            layout: None,
            body: ChildSlot::new(body),
        }
    }

    pub fn boxed_with_frame(layout: Arc<FrameLayout>, body: NodeRef) -> NodeRef {
        Arc::new(Self::with_frame(layout, body))
    }

    pub fn boxed_virtualized(body: NodeRef) -> NodeRef {
        Arc::new(Self::virtualized(body))
    }
}

impl Node for BlockScopeNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    fn execute(&self, frame: &Frame) -> Result<Value, LanguageError> {
        match &self.layout {
            Some(layout) => {
                let child = Frame::new_child(Arc::clone(layout), frame);
                self.body.get().execute(&child)
            }
            None => self.body.get().execute(frame),
        }
    }

    fn children(&self) -> Vec<&ChildSlot> {
        vec![&self.body]
    }

    fn is_scope(&self) -> bool {
        true
    }

    fn is_frame_scope(&self) -> bool {
        self.layout.is_some()
    }
}
