//! Symbol names: the identifiers a package's tables index by.
//!
//! A name distinguishes its *source* spelling (what a `.import` declaration
//! wrote) from its *definition* spelling (what the exporting package
//! actually called the symbol) only insofar as both are compared by their
//! structural component sequence, not by the string that happened to
//! encode them — two names built from the same dotted components compare
//! equal regardless of which pool produced the strings backing them.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

/// A dotted identifier, e.g. `collections.HashMap` or a bare `factorial`.
///
/// Cheap to clone: the component list is reference-counted.
#[derive(Clone, Eq)]
pub struct Name {
    components: Arc<[Box<str>]>,
}

impl Name {
    /// Build a name from its dotted components.
    pub fn new(components: impl IntoIterator<Item = impl Into<Box<str>>>) -> Self {
        let components: Vec<Box<str>> = components.into_iter().map(Into::into).collect();
        Self { components: components.into() }
    }

    /// Parse a dot-separated string into a name.
    pub fn parse(s: &str) -> Self {
        Self::new(s.split('.'))
    }

    /// The components, in order.
    pub fn components(&self) -> &[Box<str>] {
        &self.components
    }

    /// The final component (e.g. `HashMap` in `collections.HashMap`).
    pub fn simple_name(&self) -> &str {
        self.components.last().map(|c| c.as_ref()).unwrap_or("")
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.components.len() == other.components.len()
            && self.components.iter().zip(other.components.iter()).all(|(a, b)| a == b)
    }
}

impl std::hash::Hash for Name {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.components.len().hash(state);
        for c in self.components.iter() {
            c.hash(state);
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

/// Per-package name interning table.
///
/// A package's string pool stores each dotted name once; everything else
/// (globals, functions, classes, imports) refers to it by index. Interning
/// here means later lookups by parsed string reuse the same `Name` (and
/// thus avoid rebuilding the component vector), not that equality depends
/// on identity — [`Name::eq`] is always structural.
#[derive(Default)]
pub struct NameTable {
    by_text: FxHashMap<String, Name>,
}

impl NameTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `text`, returning the shared `Name`.
    pub fn intern(&mut self, text: &str) -> Name {
        if let Some(existing) = self.by_text.get(text) {
            return existing.clone();
        }
        let name = Name::parse(text);
        self.by_text.insert(text.to_string(), name.clone());
        name
    }

    /// Number of distinct names interned.
    pub fn len(&self) -> usize {
        self.by_text.len()
    }

    /// Whether the table holds no names.
    pub fn is_empty(&self) -> bool {
        self.by_text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality_ignores_pool_identity() {
        let a = Name::parse("collections.HashMap");
        let b = Name::new(["collections", "HashMap"]);
        assert_eq!(a, b);
        assert_eq!(a.simple_name(), "HashMap");
    }

    #[test]
    fn different_arity_not_equal() {
        let a = Name::parse("a.b");
        let b = Name::parse("a.b.c");
        assert_ne!(a, b);
    }

    #[test]
    fn table_interns_by_text() {
        let mut table = NameTable::new();
        let a = table.intern("foo.bar");
        let b = table.intern("foo.bar");
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }
}
