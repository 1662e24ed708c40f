//! Control flow: statement sequences and conditionals.

use std::sync::Arc;

use arbor_core::{LanguageError, Value};

use crate::frame::Frame;
use crate::node::{ChildSlot, Node, NodeHeader, NodeRef, Unexpected};

/// Executes children in order; evaluates to the last child's value, or
/// undefined when empty.
#[derive(Debug)]
pub struct SequenceNode {
    header: NodeHeader,
    statements: Vec<ChildSlot>,
}

impl SequenceNode {
    pub fn new(statements: Vec<NodeRef>) -> Self {
        Self {
            header: NodeHeader::new(),
            statements: statements.into_iter().map(ChildSlot::new).collect(),
        }
    }

    pub fn boxed(statements: Vec<NodeRef>) -> NodeRef {
        Arc::new(Self::new(statements))
    }
}

impl Node for SequenceNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    fn execute(&self, frame: &Frame) -> Result<Value, LanguageError> {
        let mut result = Value::Undefined;
        for slot in &self.statements {
            result = slot.get().execute(frame)?;
        }
        Ok(result)
    }

    fn children(&self) -> Vec<&ChildSlot> {
        self.statements.iter().collect()
    }
}

/// Two-armed conditional. The condition must produce a boolean; any
/// other result is a language-level type error.
#[derive(Debug)]
pub struct IfNode {
    header: NodeHeader,
    condition: ChildSlot,
    then_branch: ChildSlot,
    else_branch: Option<ChildSlot>,
}

impl IfNode {
    pub fn new(condition: NodeRef, then_branch: NodeRef, else_branch: Option<NodeRef>) -> Self {
        Self {
            header: NodeHeader::new(),
            condition: ChildSlot::new(condition),
            then_branch: ChildSlot::new(then_branch),
            else_branch: else_branch.map(ChildSlot::new),
        }
    }

    pub fn boxed(condition: NodeRef, then_branch: NodeRef, else_branch: Option<NodeRef>) -> NodeRef {
        Arc::new(Self::new(condition, then_branch, else_branch))
    }
}

impl Node for IfNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    fn execute(&self, frame: &Frame) -> Result<Value, LanguageError> {
        let taken = match self.condition.get().execute_bool(frame) {
            Ok(b) => b,
            Err(Unexpected::Thrown(e)) => return Err(e),
            Err(Unexpected::Value(other)) => {
                return Err(LanguageError::type_error(format!(
                    "condition must be a boolean, got {}",
                    other.type_name()
                )))
            }
        };
        if taken {
            self.then_branch.get().execute(frame)
        } else if let Some(else_branch) = &self.else_branch {
            else_branch.get().execute(frame)
        } else {
            Ok(Value::Undefined)
        }
    }

    fn children(&self) -> Vec<&ChildSlot> {
        let mut slots = vec![&self.condition, &self.then_branch];
        if let Some(else_branch) = &self.else_branch {
            slots.push(else_branch);
        }
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::literal::ConstantNode;
    use crate::nodes::local::WriteLocalNode;
    use crate::slots::{SlotKind, SlotTable};

    fn frame_with(names: &[&str]) -> Frame {
        let mut table = SlotTable::function_level();
        for n in names {
            table.add_slot(*n, 0, SlotKind::Value).unwrap();
        }
        Frame::new(table.close())
    }

    #[test]
    fn test_sequence_returns_last_value() {
        let frame = frame_with(&["a"]);
        let seq = SequenceNode::new(vec![
            WriteLocalNode::boxed(0, 0, ConstantNode::boxed(Value::int(1))),
            ConstantNode::boxed(Value::int(2)),
            ConstantNode::boxed(Value::int(3)),
        ]);
        assert_eq!(seq.execute(&frame).unwrap().as_int(), Some(3));
        assert_eq!(frame.get(0).as_int(), Some(1)); // side effect ran
    }

    #[test]
    fn test_empty_sequence_is_undefined() {
        let frame = frame_with(&[]);
        let seq = SequenceNode::new(Vec::new());
        assert!(seq.execute(&frame).unwrap().is_undefined());
    }

    #[test]
    fn test_if_takes_branches() {
        let frame = frame_with(&[]);
        let node = IfNode::new(
            ConstantNode::boxed(Value::bool(true)),
            ConstantNode::boxed(Value::int(1)),
            Some(ConstantNode::boxed(Value::int(2))),
        );
        assert_eq!(node.execute(&frame).unwrap().as_int(), Some(1));

        let node = IfNode::new(
            ConstantNode::boxed(Value::bool(false)),
            ConstantNode::boxed(Value::int(1)),
            Some(ConstantNode::boxed(Value::int(2))),
        );
        assert_eq!(node.execute(&frame).unwrap().as_int(), Some(2));
    }

    #[test]
    fn test_if_without_else_is_undefined() {
        let frame = frame_with(&[]);
        let node = IfNode::new(
            ConstantNode::boxed(Value::bool(false)),
            ConstantNode::boxed(Value::int(1)),
            None,
        );
        assert!(node.execute(&frame).unwrap().is_undefined());
    }

    #[test]
    fn test_non_boolean_condition_is_type_error() {
        let frame = frame_with(&[]);
        let node = IfNode::new(
            ConstantNode::boxed(Value::int(0)),
            ConstantNode::boxed(Value::int(1)),
            None,
        );
        let err = node.execute(&frame).unwrap_err();
        assert!(matches!(err, LanguageError::Type { .. }));
    }
}
