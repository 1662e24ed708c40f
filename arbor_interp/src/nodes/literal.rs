//! Constant nodes.

use std::sync::Arc;

use arbor_core::{LanguageError, Value};

use crate::frame::Frame;
use crate::node::{Node, NodeHeader, NodeRef, Unexpected};
use crate::shapes::ValueKind;

/// A node producing a fixed value. Narrowed executes hit the typed
/// payload directly instead of round-tripping through `Value`.
#[derive(Debug)]
pub struct ConstantNode {
    header: NodeHeader,
    value: Value,
}

impl ConstantNode {
    pub fn new(value: Value) -> Self {
        Self {
            header: NodeHeader::new(),
            value,
        }
    }

    pub fn with_source(value: Value, header: NodeHeader) -> Self {
        Self { header, value }
    }

    pub fn boxed(value: Value) -> NodeRef {
        Arc::new(Self::new(value))
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Node for ConstantNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    #[inline]
    fn execute(&self, _frame: &Frame) -> Result<Value, LanguageError> {
        Ok(self.value.clone())
    }

    #[inline]
    fn execute_int(&self, _frame: &Frame) -> Result<i64, Unexpected> {
        match self.value {
            Value::Int(v) => Ok(v),
            _ => Err(Unexpected::Value(self.value.clone())),
        }
    }

    #[inline]
    fn execute_float(&self, _frame: &Frame) -> Result<f64, Unexpected> {
        match self.value.as_float() {
            Some(v) => Ok(v),
            None => Err(Unexpected::Value(self.value.clone())),
        }
    }

    #[inline]
    fn execute_bool(&self, _frame: &Frame) -> Result<bool, Unexpected> {
        match self.value {
            Value::Bool(v) => Ok(v),
            _ => Err(Unexpected::Value(self.value.clone())),
        }
    }

    fn is_result_always_of(&self, kind: ValueKind) -> bool {
        ValueKind::classify(&self.value) == kind
    }
}
