//! Language-level errors.
//!
//! `LanguageError` is the only error type the interpreted program can
//! observe. Interpreter-internal conditions (specialization mismatches,
//! cache evictions, rewrites) never surface here.

use std::fmt;

/// An error raised by the interpreted program or on its behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum LanguageError {
    /// Malformed input to an external compiler (e.g. an invalid pattern).
    Syntax { message: String },
    /// An operation applied to operands of unsupported types.
    Type { message: String },
    /// A numeric operation left the representable range.
    Range { message: String },
    /// A condition that indicates an interpreter bug surfaced as an error
    /// instead of a panic (used only at the embedding boundary).
    Internal { message: String },
}

impl LanguageError {
    pub fn syntax(message: impl Into<String>) -> Self {
        LanguageError::Syntax {
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        LanguageError::Type {
            message: message.into(),
        }
    }

    pub fn range(message: impl Into<String>) -> Self {
        LanguageError::Range {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        LanguageError::Internal {
            message: message.into(),
        }
    }
}

impl fmt::Display for LanguageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageError::Syntax { message } => write!(f, "SyntaxError: {}", message),
            LanguageError::Type { message } => write!(f, "TypeError: {}", message),
            LanguageError::Range { message } => write!(f, "RangeError: {}", message),
            LanguageError::Internal { message } => write!(f, "InternalError: {}", message),
        }
    }
}

impl std::error::Error for LanguageError {}
