//! Process-wide string interning.
//!
//! Interned strings compare by pointer on the fast path, making them
//! suitable as guard keys and slot identifiers. The table grows
//! monotonically and is never evicted; identifiers in a running
//! embedding form a small closed set.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

/// Global intern table. Insert-if-absent; entries live for the process.
static INTERN_TABLE: LazyLock<DashMap<Box<str>, InternedString>> = LazyLock::new(DashMap::new);

/// An interned, immutable string.
///
/// Equality is pointer equality first, content equality as a fallback
/// (two `InternedString`s obtained through [`intern`] for the same text
/// always share one allocation).
#[derive(Clone)]
pub struct InternedString(Arc<str>);

impl InternedString {
    /// View as `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Pointer identity check (fast path for guard comparisons).
    #[inline]
    pub fn same(&self, other: &InternedString) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Intern a string, returning the canonical shared handle.
pub fn intern(text: &str) -> InternedString {
    if let Some(existing) = INTERN_TABLE.get(text) {
        return existing.clone();
    }
    // Insert-if-absent: a racing thread may have beaten us; the entry API
    // guarantees exactly one canonical handle survives.
    INTERN_TABLE
        .entry(Box::from(text))
        .or_insert_with(|| InternedString(Arc::from(text)))
        .clone()
}

impl PartialEq for InternedString {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.same(other) || self.0 == other.0
    }
}

impl Eq for InternedString {}

impl Hash for InternedString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Deref for InternedString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for InternedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for InternedString {
    fn from(s: &str) -> Self {
        intern(s)
    }
}
