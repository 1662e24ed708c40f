//! Source objects and source sections.
//!
//! A `Source` is an interned piece of program text; a `SourceSection` is
//! a resolved `(offset, length)` view into it. Sections are created on
//! the diagnostics path only — line/column resolution is deliberately
//! not cached per node, the caller caches the whole section instead.

use std::fmt;
use std::sync::Arc;

/// Error creating a source section with malformed coordinates.
///
/// This is a construction-time invariant violation: always fatal to the
/// construction step, never recovered automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The section extends past the end of the text.
    OutOfBounds {
        offset: u32,
        length: u32,
        text_len: usize,
    },
    /// An endpoint falls inside a multibyte character.
    SplitsCharacter { offset: u32, length: u32 },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::OutOfBounds {
                offset,
                length,
                text_len,
            } => write!(
                f,
                "source section [{}..+{}] out of bounds for text of length {}",
                offset, length, text_len
            ),
            SourceError::SplitsCharacter { offset, length } => write!(
                f,
                "source section [{}..+{}] splits a multibyte character",
                offset, length
            ),
        }
    }
}

impl std::error::Error for SourceError {}

/// A named unit of program text.
#[derive(Debug)]
pub struct Source {
    name: Arc<str>,
    text: Arc<str>,
}

impl Source {
    /// Create a source from a name and its full text.
    pub fn new(name: impl Into<Arc<str>>, text: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            text: text.into(),
        })
    }

    /// Source name (file name or synthetic tag).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full program text.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Validate `(offset, length)` against this source's text. Both
    /// endpoints must lie on character boundaries so the section can
    /// always be sliced later.
    pub fn check_bounds(&self, offset: u32, length: u32) -> Result<(), SourceError> {
        let end = offset as usize + length as usize;
        if end > self.text.len() {
            return Err(SourceError::OutOfBounds {
                offset,
                length,
                text_len: self.text.len(),
            });
        }
        if !self.text.is_char_boundary(offset as usize) || !self.text.is_char_boundary(end) {
            return Err(SourceError::SplitsCharacter { offset, length });
        }
        Ok(())
    }

    /// Create a resolved section. Bounds-checked.
    pub fn section(self: &Arc<Self>, offset: u32, length: u32) -> Result<SourceSection, SourceError> {
        self.check_bounds(offset, length)?;
        Ok(SourceSection {
            source: Arc::clone(self),
            offset,
            length,
        })
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.text, &other.text)
    }
}

/// A resolved region of a `Source`.
#[derive(Debug, Clone)]
pub struct SourceSection {
    source: Arc<Source>,
    offset: u32,
    length: u32,
}

impl SourceSection {
    #[inline]
    pub fn source(&self) -> &Arc<Source> {
        &self.source
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    #[inline]
    pub fn length(&self) -> u32 {
        self.length
    }

    /// The covered text.
    pub fn text(&self) -> &str {
        let start = self.offset as usize;
        &self.source.text()[start..start + self.length as usize]
    }

    /// 1-based line of the section start. Diagnostics path only.
    pub fn line(&self) -> u32 {
        let prefix = &self.source.text()[..self.offset as usize];
        prefix.bytes().filter(|&b| b == b'\n').count() as u32 + 1
    }

    /// 1-based column (in characters) of the section start. Diagnostics
    /// path only.
    pub fn column(&self) -> u32 {
        let prefix = &self.source.text()[..self.offset as usize];
        let line_start = prefix.rfind('\n').map_or(0, |nl| nl + 1);
        prefix[line_start..].chars().count() as u32 + 1
    }
}

impl PartialEq for SourceSection {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
            && self.length == other.length
            && Arc::ptr_eq(&self.source, &other.source)
    }
}

impl fmt::Display for SourceSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source.name(), self.line(), self.column())
    }
}
