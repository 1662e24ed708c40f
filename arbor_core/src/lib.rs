//! Core primitives for the Arbor self-optimizing interpreter.
//!
//! This crate provides:
//! - Dynamic value model (`Value`)
//! - Language-level errors (`LanguageError`) — the only errors the
//!   interpreted program can observe
//! - Source objects and lazily resolved source sections
//! - Process-wide string interning with pointer-fast equality

#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod intern;
pub mod source;
pub mod value;

pub use error::LanguageError;
pub use intern::{intern, InternedString};
pub use source::{Source, SourceError, SourceSection};
pub use value::Value;
