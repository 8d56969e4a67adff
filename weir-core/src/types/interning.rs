//! String interning for node keys and routine identities.
//!
//! Uses `lasso::ThreadedRodeo` so interning stays thread-safe during the
//! build phase; the sealed graph reads through the same interner.

use lasso::{Spur, ThreadedRodeo};

/// Thread-safe interner for identity strings.
///
/// Node keys are synthetic and already canonical when they arrive, so no
/// normalization happens here; the same string always yields the same `Spur`.
#[derive(Debug)]
pub struct KeyInterner {
    inner: ThreadedRodeo,
}

impl KeyInterner {
    /// Create a new interner.
    pub fn new() -> Self {
        Self {
            inner: ThreadedRodeo::default(),
        }
    }

    /// Intern a key, returning its stable `Spur`.
    pub fn intern(&self, key: &str) -> Spur {
        self.inner.get_or_intern(key)
    }

    /// Look up a previously interned key without inserting.
    pub fn get(&self, key: &str) -> Option<Spur> {
        self.inner.get(key)
    }

    /// Resolve a `Spur` back to its string.
    pub fn resolve(&self, key: &Spur) -> &str {
        self.inner.resolve(key)
    }

    /// Number of distinct interned strings.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for KeyInterner {
    fn default() -> Self {
        Self::new()
    }
}
