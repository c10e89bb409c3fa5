//! Qualified names and the name-pool seam.
//!
//! The execution core never invents name codes itself: it asks a
//! [`NamePool`] to allocate a stable integer code for each
//! (prefix, uri, local) triple and treats the mapping as an opaque
//! bijection. [`SimpleNamePool`] is the provided allocator for drivers and
//! tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// An expanded qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: String,
    pub uri: String,
    pub local: String,
}

impl QName {
    /// A name in no namespace.
    pub fn local(local: impl Into<String>) -> Self {
        QName {
            prefix: String::new(),
            uri: String::new(),
            local: local.into(),
        }
    }

    pub fn new(
        prefix: impl Into<String>,
        uri: impl Into<String>,
        local: impl Into<String>,
    ) -> Self {
        QName {
            prefix: prefix.into(),
            uri: uri.into(),
            local: local.into(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{}:{}", self.prefix, self.local)
        }
    }
}

/// Stable integer code for a name, assigned by a [`NamePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameCode(pub u32);

/// The external name/identity allocator.
///
/// `allocate` must return the same code for the same name for the lifetime
/// of the pool, and distinct codes for distinct names.
pub trait NamePool: Send + Sync + fmt::Debug {
    fn allocate(&self, name: &QName) -> NameCode;

    /// Reverse lookup. Returns `None` for a code this pool never issued.
    fn name_for(&self, code: NameCode) -> Option<QName>;
}

/// Mutex-guarded interning pool.
#[derive(Debug, Default)]
pub struct SimpleNamePool {
    inner: Mutex<PoolInner>,
}

#[derive(Debug, Default)]
struct PoolInner {
    by_name: HashMap<QName, u32>,
    names: Vec<QName>,
}

impl SimpleNamePool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NamePool for SimpleNamePool {
    fn allocate(&self, name: &QName) -> NameCode {
        let mut inner = self.inner.lock().expect("name pool poisoned");
        if let Some(&code) = inner.by_name.get(name) {
            return NameCode(code);
        }
        let code = inner.names.len() as u32;
        inner.names.push(name.clone());
        inner.by_name.insert(name.clone(), code);
        NameCode(code)
    }

    fn name_for(&self, code: NameCode) -> Option<QName> {
        let inner = self.inner.lock().expect("name pool poisoned");
        inner.names.get(code.0 as usize).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_is_stable() {
        let pool = SimpleNamePool::new();
        let a = pool.allocate(&QName::local("item"));
        let b = pool.allocate(&QName::local("item"));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_names_get_distinct_codes() {
        let pool = SimpleNamePool::new();
        let a = pool.allocate(&QName::local("a"));
        let b = pool.allocate(&QName::new("p", "urn:x", "a"));
        assert_ne!(a, b);
        assert_eq!(pool.name_for(a), Some(QName::local("a")));
        assert_eq!(pool.name_for(b), Some(QName::new("p", "urn:x", "a")));
    }
}
