//! Arbor interpreter core: a self-optimizing AST interpreter.
//!
//! Nodes speculatively specialize themselves to the operand shapes seen
//! at run time and rewrite themselves in place when an assumption breaks.
//! The tree is shared data: a background compiler may read nodes while
//! the mutator thread executes and rewrites them, so every rewrite is a
//! single atomic publication of a fully built node.
//!
//! Layout:
//! - `slots` / `frame` — symbol-table-to-storage-slot allocation and the
//!   runtime activation record it describes
//! - `node` — the executable tree unit and the replacement protocol
//! - `shapes` / `specialize` — operand classification and the
//!   uninitialized → specialized → polymorphic → megamorphic machine
//! - `compile_cache` — bounded per-call-site cache of compiled patterns
//! - `wrapper` — transparent instrumentation decorators
//! - `assembly` — descriptor-tree → node-tree factory
//! - `introspect` — scope lookup for external debuggers

#![deny(unsafe_op_in_unsafe_fn)]

pub mod assembly;
pub mod compile_cache;
pub mod config;
pub mod frame;
pub mod introspect;
pub mod node;
pub mod nodes;
pub mod shapes;
pub mod slots;
pub mod specialize;
pub mod wrapper;

pub use assembly::{NodeFactory, OpDesc};
pub use compile_cache::{CompileCache, CompiledPattern, PatternCompiler, RegexCompiler};
pub use config::InterpConfig;
pub use frame::Frame;
pub use node::{Node, NodeRef, TagError, TreeRoot, Unexpected};
pub use slots::{FrameLayout, ScopeTag, SlotError, SlotKind, SlotTable};
pub use specialize::{CountingDeoptSink, DeoptReason, DeoptSink, NullDeoptSink};
