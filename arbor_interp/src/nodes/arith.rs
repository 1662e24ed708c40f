//! Self-specializing binary arithmetic.
//!
//! A fresh site is uninitialized. The first execution observes the
//! operand shapes and installs a guarded fast path; further shapes
//! promote the site to polymorphic, and past the configured limit the
//! site collapses to the generic path and replaces itself with a plain
//! generic node in the tree.
//!
//! The integer fast path uses checked arithmetic. Overflow invalidates
//! the speculation and the result is recomputed in float space, so the
//! observable value is identical to the generic path.

use std::sync::Arc;

use arbor_core::intern::intern;
use arbor_core::{LanguageError, Value};

use crate::config::InterpConfig;
use crate::frame::Frame;
use crate::node::{ChildSlot, Node, NodeHeader, NodeRef};
use crate::shapes::OperandShapes;
use crate::specialize::{
    replace_self, DeoptReason, DeoptSink, DispatchEngine, GuardedImpl, Transition,
};

/// The supported binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    #[inline]
    fn checked_int(self, l: i64, r: i64) -> Option<i64> {
        match self {
            BinaryOp::Add => l.checked_add(r),
            BinaryOp::Sub => l.checked_sub(r),
            BinaryOp::Mul => l.checked_mul(r),
            BinaryOp::Div => l.checked_div(r),
        }
    }

    #[inline]
    fn float(self, l: f64, r: f64) -> f64 {
        match self {
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Mul => l * r,
            BinaryOp::Div => l / r,
        }
    }
}

// =============================================================================
// Guarded Fast Paths
// =============================================================================

/// Which fast path a guard dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithPath {
    /// Both operands int; checked arithmetic.
    IntChecked,
    /// Numeric operands; float arithmetic.
    Float,
    /// String concatenation (`+` only).
    Concat,
}

/// One guarded alternative, keyed on the packed operand shapes.
#[derive(Debug, Clone, Copy)]
struct ArithGuard {
    shapes: OperandShapes,
    path: ArithPath,
}

impl GuardedImpl for ArithGuard {
    type Key = OperandShapes;

    fn key(&self) -> OperandShapes {
        self.shapes
    }
}

/// Numeric view of a value for the float path. Lossy for very large
/// ints, matching the generic semantics.
#[inline]
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        _ => None,
    }
}

/// The generic semantics every path must agree with.
fn generic_apply(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, LanguageError> {
    match (left, right) {
        (Value::Int(l), Value::Int(r)) => {
            if op == BinaryOp::Div && *r == 0 {
                return Err(LanguageError::range("division by zero"));
            }
            match op.checked_int(*l, *r) {
                Some(v) => Ok(Value::int(v)),
                // Out of i64 range: the result lives in float space.
                None => Ok(Value::float(op.float(*l as f64, *r as f64))),
            }
        }
        (Value::Str(l), Value::Str(r)) if op == BinaryOp::Add => {
            Ok(Value::str(intern(&format!("{}{}", l, r))))
        }
        (l, r) => match (as_number(l), as_number(r)) {
            (Some(lf), Some(rf)) => Ok(Value::float(op.float(lf, rf))),
            _ => Err(LanguageError::type_error(format!(
                "unsupported operand types for {}: {} and {}",
                op.symbol(),
                l.type_name(),
                r.type_name()
            ))),
        },
    }
}

/// Build the fast-path candidate for an observed shape pair, or `None`
/// when only the generic path can handle it.
fn candidate_for(op: BinaryOp, shapes: OperandShapes) -> Option<ArithGuard> {
    if shapes.is_int_int() {
        return Some(ArithGuard {
            shapes,
            path: ArithPath::IntChecked,
        });
    }
    if shapes.is_numeric() {
        return Some(ArithGuard {
            shapes,
            path: ArithPath::Float,
        });
    }
    if shapes == OperandShapes::STR_STR && op == BinaryOp::Add {
        return Some(ArithGuard {
            shapes,
            path: ArithPath::Concat,
        });
    }
    None
}

// =============================================================================
// Nodes
// =============================================================================

/// A specializing binary arithmetic site.
#[derive(Debug)]
pub struct BinaryOpNode {
    header: NodeHeader,
    op: BinaryOp,
    left: ChildSlot,
    right: ChildSlot,
    engine: DispatchEngine<ArithGuard>,
}

impl BinaryOpNode {
    pub fn new(
        op: BinaryOp,
        left: NodeRef,
        right: NodeRef,
        config: &InterpConfig,
        deopt: Arc<dyn DeoptSink>,
    ) -> Self {
        Self {
            header: NodeHeader::new(),
            op,
            left: ChildSlot::new(left),
            right: ChildSlot::new(right),
            engine: DispatchEngine::new(config.poly_limit, deopt),
        }
    }

    pub fn boxed(
        op: BinaryOp,
        left: NodeRef,
        right: NodeRef,
        config: &InterpConfig,
        deopt: Arc<dyn DeoptSink>,
    ) -> NodeRef {
        Arc::new(Self::new(op, left, right, config, deopt))
    }

    /// Registered guard count, for tuning and tests.
    pub fn guard_count(&self) -> usize {
        self.engine.guard_count()
    }

    pub fn is_megamorphic(&self) -> bool {
        self.engine.is_megamorphic()
    }

    fn apply_guard(&self, guard: ArithGuard, left: &Value, right: &Value) -> Result<Value, LanguageError> {
        match guard.path {
            ArithPath::IntChecked => {
                // Shape-guarded: both operands are ints here.
                let (Value::Int(l), Value::Int(r)) = (left, right) else {
                    return generic_apply(self.op, left, right);
                };
                if self.op == BinaryOp::Div && *r == 0 {
                    return Err(LanguageError::range("division by zero"));
                }
                match self.op.checked_int(*l, *r) {
                    Some(v) => Ok(Value::int(v)),
                    None => {
                        // The int speculation is dead; results may no
                        // longer fit. Invalidate, then answer in float
                        // space like the generic path.
                        self.engine.collapse(DeoptReason::Overflow);
                        Ok(Value::float(self.op.float(*l as f64, *r as f64)))
                    }
                }
            }
            ArithPath::Float | ArithPath::Concat => generic_apply(self.op, left, right),
        }
    }

    /// Degrade the tree: swap in a plain generic node at this position.
    /// Skipped for unadopted sites (the engine alone keeps them correct).
    fn rewrite_to_generic(&self) {
        if self.header.parent().is_none() {
            return;
        }
        let generic = GenericBinaryNode::boxed(self.op, self.left.get(), self.right.get());
        replace_self(self, generic, "arithmetic site went megamorphic");
    }
}

impl Node for BinaryOpNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    fn execute(&self, frame: &Frame) -> Result<Value, LanguageError> {
        let left = self.left.get().execute(frame)?;
        let right = self.right.get().execute(frame)?;
        let shapes = OperandShapes::of(&left, &right);

        if let Some(guard) = self.engine.lookup(shapes) {
            return self.apply_guard(guard, &left, &right);
        }
        if self.engine.is_megamorphic() {
            return generic_apply(self.op, &left, &right);
        }

        // Unknown shape: build the candidate outside the lock, then
        // publish. Non-specializable shapes go straight to generic
        // without burning a guard entry.
        match candidate_for(self.op, shapes) {
            Some(candidate) => {
                if self.engine.observe(candidate) == Transition::Megamorphic {
                    self.rewrite_to_generic();
                    return generic_apply(self.op, &left, &right);
                }
                self.apply_guard(candidate, &left, &right)
            }
            None => generic_apply(self.op, &left, &right),
        }
    }

    fn children(&self) -> Vec<&ChildSlot> {
        vec![&self.left, &self.right]
    }
}

/// The terminal generic form of a binary site. No guards, no engine.
#[derive(Debug)]
pub struct GenericBinaryNode {
    header: NodeHeader,
    op: BinaryOp,
    left: ChildSlot,
    right: ChildSlot,
}

impl GenericBinaryNode {
    pub fn boxed(op: BinaryOp, left: NodeRef, right: NodeRef) -> NodeRef {
        Arc::new(Self {
            header: NodeHeader::new(),
            op,
            left: ChildSlot::new(left),
            right: ChildSlot::new(right),
        })
    }
}

impl Node for GenericBinaryNode {
    fn header(&self) -> &NodeHeader {
        &self.header
    }

    fn execute(&self, frame: &Frame) -> Result<Value, LanguageError> {
        let left = self.left.get().execute(frame)?;
        let right = self.right.get().execute(frame)?;
        generic_apply(self.op, &left, &right)
    }

    fn children(&self) -> Vec<&ChildSlot> {
        vec![&self.left, &self.right]
    }
}

// =============================================================================
// Tests
// =============================================================================
