//! Local slot access.
//!
//! Reads and writes address a slot by (hop count, index): the hop count
//! climbs the frame chain to the declaring scope, the index selects the
//! cell. Both are fixed at assembly time; name resolution never happens
//! during execution.

use std::sync::Arc;

use arbor_core::{LanguageError, Value};

use crate::frame::Frame;
use crate::node::{ChildSlot, Node, NodeHeader, NodeRef, Unexpected};

/// Climb `hops` parent links from `frame`.
fn resolve_frame(frame: &Frame, hops: u32) -> Result<Frame, LanguageError> {
    let mut current = frame.clone();
    for _ in 0..hops {
        current = current.parent().ok_or_else(|| {
            LanguageError::internal("frame chain shorter than resolved hop count")
        })?;
    }
    Ok(current)
}

/// Read a slot cell.
#[derive(Debug)]
pub struct ReadLocalNode {
    header: NodeHeader,
    index: u32,
    hops: u32,
}

impl ReadLocalNode {
    pub fn new(index: u32, hops: u32) -> Self {
        Self {
            header: NodeHeader::new(),
            index,
            hops,
        }
    }

    pub fn boxed(index: u32, hops: u32) -> NodeRef {
        Arc::new(Self::new(index, hops))
    }
}

impl Node for ReadLocalNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    #[inline]
    fn execute(&self, frame: &Frame) -> Result<Value, LanguageError> {
        Ok(resolve_frame(frame, self.hops)?.get(self.index))
    }

    #[inline]
    fn execute_int(&self, frame: &Frame) -> Result<i64, Unexpected> {
        let target = resolve_frame(frame, self.hops).map_err(Unexpected::Thrown)?;
        match target.get_int(self.index) {
            Some(v) => Ok(v),
            None => Err(Unexpected::Value(target.get(self.index))),
        }
    }
}

/// Write a slot cell; evaluates to the written value.
#[derive(Debug)]
pub struct WriteLocalNode {
    header: NodeHeader,
    index: u32,
    hops: u32,
    value: ChildSlot,
}

impl WriteLocalNode {
    pub fn new(index: u32, hops: u32, value: NodeRef) -> Self {
        Self {
            header: NodeHeader::new(),
            index,
            hops,
            value: ChildSlot::new(value),
        }
    }

    pub fn boxed(index: u32, hops: u32, value: NodeRef) -> NodeRef {
        Arc::new(Self::new(index, hops, value))
    }
}

impl Node for WriteLocalNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    fn execute(&self, frame: &Frame) -> Result<Value, LanguageError> {
        let value = self.value.get().execute(frame)?;
        resolve_frame(frame, self.hops)?.set(self.index, value.clone());
        Ok(value)
    }

    fn children(&self) -> Vec<&ChildSlot> {
        vec![&self.value]
    }
}
