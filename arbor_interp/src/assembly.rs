//! Node assembly.
//!
//! Turns an operation descriptor tree into a fully initialized,
//! adopted executable tree. The factory owns the ambient pieces every
//! site needs (config, pattern compiler, deopt sink) and performs all
//! name resolution at build time: nodes address slots by hop count and
//! index, never by name.
//!
//! Construction failures are fatal to the build step and never become
//! language-level errors.

use std::fmt;
use std::sync::Arc;

use arbor_core::Value;

use crate::compile_cache::{PatternCompiler, RegexCompiler};
use crate::config::InterpConfig;
use crate::node::{NodeRef, TreeRoot};
use crate::nodes::arith::{BinaryOp, BinaryOpNode};
use crate::nodes::block::BlockScopeNode;
use crate::nodes::control::{IfNode, SequenceNode};
use crate::nodes::literal::ConstantNode;
use crate::nodes::local::{ReadLocalNode, WriteLocalNode};
use crate::nodes::pattern::MatchPatternNode;
use crate::slots::{ScopedName, SlotError, SlotKind, SlotTable};
use crate::specialize::{DeoptSink, NullDeoptSink};

// =============================================================================
// Descriptors
// =============================================================================

/// Operation descriptor: the assembly-time shape of a tree.
#[derive(Debug, Clone)]
pub enum OpDesc {
    /// A constant value.
    Const(Value),
    /// Hoisted declaration: allocates a slot in the innermost scope at
    /// build time, evaluates to undefined at run time.
    Declare(ScopedName),
    /// Read a resolved identifier.
    Read(ScopedName),
    /// Write an identifier, declaring it in the innermost scope when it
    /// resolves nowhere.
    Write(ScopedName, Box<OpDesc>),
    /// Specializing binary arithmetic.
    Binary(BinaryOp, Box<OpDesc>, Box<OpDesc>),
    /// Two-armed conditional.
    If {
        condition: Box<OpDesc>,
        then_branch: Box<OpDesc>,
        else_branch: Option<Box<OpDesc>>,
    },
    /// Statement sequence; evaluates to its last statement.
    Seq(Vec<OpDesc>),
    /// Lexical block. Declarations get slots in the block's own frame;
    /// a block with no declarations is virtualized onto the enclosing
    /// frame.
    Block {
        decls: Vec<ScopedName>,
        body: Box<OpDesc>,
    },
    /// Pattern-match call site: input, pattern, flags.
    Match(Box<OpDesc>, Box<OpDesc>, Box<OpDesc>),
}

impl OpDesc {
    /// Shorthand for reading a plain (unscoped) name.
    pub fn read(name: &str) -> Self {
        OpDesc::Read(ScopedName::plain(name))
    }

    pub fn write(name: &str, value: OpDesc) -> Self {
        OpDesc::Write(ScopedName::plain(name), Box::new(value))
    }

    pub fn binary(op: BinaryOp, left: OpDesc, right: OpDesc) -> Self {
        OpDesc::Binary(op, Box::new(left), Box::new(right))
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Fatal build-step errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// Slot-table construction failed.
    Slot(SlotError),
    /// A read referenced an identifier no scope declares.
    UnresolvedName { name: String },
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyError::Slot(e) => write!(f, "slot table error: {}", e),
            AssemblyError::UnresolvedName { name } => {
                write!(f, "unresolved identifier '{}'", name)
            }
        }
    }
}

impl std::error::Error for AssemblyError {}

impl From<SlotError> for AssemblyError {
    fn from(e: SlotError) -> Self {
        AssemblyError::Slot(e)
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Stateless tree builder. One factory may build any number of trees.
pub struct NodeFactory {
    config: InterpConfig,
    compiler: Arc<dyn PatternCompiler>,
    deopt: Arc<dyn DeoptSink>,
}

impl NodeFactory {
    pub fn new(
        config: InterpConfig,
        compiler: Arc<dyn PatternCompiler>,
        deopt: Arc<dyn DeoptSink>,
    ) -> Self {
        Self {
            config,
            compiler,
            deopt,
        }
    }

    /// Build a frozen, adopted tree ready to call.
    pub fn build_root(&self, desc: &OpDesc) -> Result<Arc<TreeRoot>, AssemblyError> {
        let root = self.build_root_unfrozen(desc)?;
        root.freeze();
        Ok(root)
    }

    /// Build an adopted tree left unfrozen so instrumentation can be
    /// inserted before the embedder freezes it.
    pub fn build_root_unfrozen(&self, desc: &OpDesc) -> Result<Arc<TreeRoot>, AssemblyError> {
        let mut scopes = vec![SlotTable::function_level()];
        let body = self.build(desc, &mut scopes)?;
        let table = scopes.pop().expect("function scope always present");
        Ok(TreeRoot::new(table.close(), body))
    }

    fn build(&self, desc: &OpDesc, scopes: &mut Vec<SlotTable>) -> Result<NodeRef, AssemblyError> {
        match desc {
            OpDesc::Const(value) => Ok(ConstantNode::boxed(value.clone())),

            OpDesc::Declare(name) => {
                scopes
                    .last_mut()
                    .expect("scope stack never empty")
                    .find_or_add_slot(name.clone(), 0, SlotKind::Value)?;
                Ok(ConstantNode::boxed(Value::undefined()))
            }

            OpDesc::Read(name) => {
                let (hops, index) =
                    resolve(scopes, name).ok_or_else(|| AssemblyError::UnresolvedName {
                        name: name.to_string(),
                    })?;
                Ok(ReadLocalNode::boxed(index, hops))
            }

            OpDesc::Write(name, value) => {
                let value = self.build(value, scopes)?;
                let (hops, index) = match resolve(scopes, name) {
                    Some(found) => found,
                    None => {
                        let slot = scopes
                            .last_mut()
                            .expect("scope stack never empty")
                            .add_slot(name.clone(), 0, SlotKind::Value)?;
                        (0, slot.index())
                    }
                };
                Ok(WriteLocalNode::boxed(index, hops, value))
            }

            OpDesc::Binary(op, left, right) => {
                let left = self.build(left, scopes)?;
                let right = self.build(right, scopes)?;
                Ok(BinaryOpNode::boxed(
                    *op,
                    left,
                    right,
                    &self.config,
                    Arc::clone(&self.deopt),
                ))
            }

            OpDesc::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.build(condition, scopes)?;
                let then_branch = self.build(then_branch, scopes)?;
                let else_branch = else_branch
                    .as_ref()
                    .map(|e| self.build(e, scopes))
                    .transpose()?;
                Ok(IfNode::boxed(condition, then_branch, else_branch))
            }

            OpDesc::Seq(statements) => {
                let built = statements
                    .iter()
                    .map(|s| self.build(s, scopes))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SequenceNode::boxed(built))
            }

            OpDesc::Block { decls, body } => {
                if decls.is_empty() {
                    // No declarations: no frame, no hop level.
                    let body = self.build(body, scopes)?;
                    return Ok(BlockScopeNode::boxed_virtualized(body));
                }
                let mut table = SlotTable::block_level();
                for name in decls {
                    table.add_slot(name.clone(), 0, SlotKind::Value)?;
                }
                scopes.push(table);
                let body = self.build(body, scopes);
                let table = scopes.pop().expect("block scope just pushed");
                Ok(BlockScopeNode::boxed_with_frame(table.close(), body?))
            }

            OpDesc::Match(input, pattern, flags) => {
                let input = self.build(input, scopes)?;
                let pattern = self.build(pattern, scopes)?;
                let flags = self.build(flags, scopes)?;
                Ok(MatchPatternNode::boxed(
                    input,
                    pattern,
                    flags,
                    Arc::clone(&self.compiler),
                    &self.config,
                    Arc::clone(&self.deopt),
                ))
            }
        }
    }
}

impl Default for NodeFactory {
    fn default() -> Self {
        Self::new(
            InterpConfig::default(),
            Arc::new(RegexCompiler),
            Arc::new(NullDeoptSink),
        )
    }
}

impl fmt::Debug for NodeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeFactory")
            .field("config", &self.config)
            .finish()
    }
}

/// Resolve a name against the scope stack: `(frame hops, slot index)`,
/// innermost scope first.
fn resolve(scopes: &[SlotTable], name: &ScopedName) -> Option<(u32, u32)> {
    for (hops, table) in scopes.iter().rev().enumerate() {
        if let Some(slot) = table.find_slot(name) {
            return Some((hops as u32, slot.index()));
        }
    }
    None
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::intern::intern;

    #[test]
    fn test_builds_and_runs_arithmetic() {
        let factory = NodeFactory::default();
        let root = factory
            .build_root(&OpDesc::binary(
                BinaryOp::Add,
                OpDesc::Const(Value::int(40)),
                OpDesc::Const(Value::int(2)),
            ))
            .unwrap();
        assert!(root.is_frozen());
        assert_eq!(root.call().unwrap().as_int(), Some(42));
    }

    #[test]
    fn test_write_declares_then_read_resolves() {
        let factory = NodeFactory::default();
        let root = factory
            .build_root(&OpDesc::Seq(vec![
                OpDesc::write("x", OpDesc::Const(Value::int(10))),
                OpDesc::binary(BinaryOp::Mul, OpDesc::read("x"), OpDesc::read("x")),
            ]))
            .unwrap();
        assert_eq!(root.call().unwrap().as_int(), Some(100));
    }

    #[test]
    fn test_unresolved_read_is_fatal() {
        let factory = NodeFactory::default();
        let err = factory.build_root(&OpDesc::read("ghost")).unwrap_err();
        assert!(matches!(err, AssemblyError::UnresolvedName { .. }));
    }

    #[test]
    fn test_block_declarations_get_their_own_frame() {
        let factory = NodeFactory::default();
        // x = 1; block(decls: [y]) { y = x + 1; y * 2 }
        let root = factory
            .build_root(&OpDesc::Seq(vec![
                OpDesc::write("x", OpDesc::Const(Value::int(1))),
                OpDesc::Block {
                    decls: vec![ScopedName::plain("y")],
                    body: Box::new(OpDesc::Seq(vec![
                        OpDesc::write(
                            "y",
                            OpDesc::binary(
                                BinaryOp::Add,
                                OpDesc::read("x"),
                                OpDesc::Const(Value::int(1)),
                            ),
                        ),
                        OpDesc::binary(
                            BinaryOp::Mul,
                            OpDesc::read("y"),
                            OpDesc::Const(Value::int(2)),
                        ),
                    ])),
                },
            ]))
            .unwrap();
        assert_eq!(root.call().unwrap().as_int(), Some(4));
    }

    #[test]
    fn test_empty_block_shares_enclosing_frame() {
        let factory = NodeFactory::default();
        let root = factory
            .build_root(&OpDesc::Seq(vec![
                OpDesc::Block {
                    decls: Vec::new(),
                    body: Box::new(OpDesc::write("x", OpDesc::Const(Value::int(5)))),
                },
                OpDesc::read("x"),
            ]))
            .unwrap();
        // The virtualized block's write landed in the function frame.
        assert_eq!(root.call().unwrap().as_int(), Some(5));
    }

    #[test]
    fn test_match_descriptor() {
        let factory = NodeFactory::default();
        let root = factory
            .build_root(&OpDesc::Match(
                Box::new(OpDesc::Const(Value::str(intern("arbor-42")))),
                Box::new(OpDesc::Const(Value::str(intern("^[a-z]+-[0-9]+$")))),
                Box::new(OpDesc::Const(Value::str(intern("")))),
            ))
            .unwrap();
        assert_eq!(root.call().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn test_duplicate_block_decl_is_fatal() {
        let factory = NodeFactory::default();
        let err = factory
            .build_root(&OpDesc::Block {
                decls: vec![ScopedName::plain("d"), ScopedName::plain("d")],
                body: Box::new(OpDesc::Const(Value::undefined())),
            })
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Slot(SlotError::DuplicateSlot { .. })));
    }

    #[test]
    fn test_declare_allocates_without_writing() {
        let factory = NodeFactory::default();
        let root = factory
            .build_root(&OpDesc::Seq(vec![
                OpDesc::Declare(ScopedName::plain("slot")),
                OpDesc::read("slot"),
            ]))
            .unwrap();
        assert_eq!(root.layout().len(), 1);
        assert!(root.call().unwrap().is_undefined());
    }

    #[test]
    fn test_conditional_assembly() {
        let factory = NodeFactory::default();
        let root = factory
            .build_root(&OpDesc::If {
                condition: Box::new(OpDesc::Const(Value::bool(false))),
                then_branch: Box::new(OpDesc::Const(Value::int(1))),
                else_branch: Some(Box::new(OpDesc::Const(Value::int(2)))),
            })
            .unwrap();
        assert_eq!(root.call().unwrap().as_int(), Some(2));
    }
}
