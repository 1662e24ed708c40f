//! Concrete node families.
//!
//! Literals, local access, control flow, block scopes, self-specializing
//! arithmetic, and the pattern-match call site. These exercise every
//! engine mechanism: narrowed execution, structural replacement, guard
//! dispatch, and the compile cache.

pub mod arith;
pub mod block;
pub mod control;
pub mod literal;
pub mod local;
pub mod pattern;
