//! Name interning and the child-name comparator.
//!
//! Every cached entry stores a [`NameId`] instead of its name. The
//! [`NameTable`] hands out ids on first sight and maps them back to shared
//! `Arc<str>` spellings, so comparing two children never re-materializes a
//! string.

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;

/// Interned name handle. Only meaningful for the [`NameTable`] that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(u32);

impl NameId {
    /// Raw index of this name in its table.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Rebuild a handle from a raw value previously returned by [`NameId::get`].
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

/// Concurrent, append-only name interner.
///
/// Lookups by name go through an [`scc::HashMap`] and never block other
/// readers. Lookups by id take a short `parking_lot` read lock on the
/// spelling vector. Names are never removed.
pub struct NameTable {
    ids: scc::HashMap<Arc<str>, NameId>,
    names: RwLock<Vec<Arc<str>>>,
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NameTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: scc::HashMap::new(),
            names: RwLock::new(Vec::new()),
        }
    }

    /// Returns the id for `name`, interning it on first sight.
    pub fn intern(&self, name: &str) -> NameId {
        if let Some(id) = self.ids.read_sync(name, |_, &id| id) {
            return id;
        }
        match self.ids.entry_sync(Arc::from(name)) {
            scc::hash_map::Entry::Occupied(occ) => *occ.get(),
            scc::hash_map::Entry::Vacant(vac) => {
                let mut names = self.names.write();
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "more than u32::MAX distinct names would exhaust memory first"
                )]
                let id = NameId(names.len() as u32);
                names.push(Arc::clone(vac.key()));
                vac.insert_entry(id);
                id
            }
        }
    }

    /// Returns the spelling interned under `id`.
    #[must_use]
    pub fn name(&self, id: NameId) -> Option<Arc<str>> {
        self.names.read().get(id.0 as usize).cloned()
    }

    /// Number of distinct names interned so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    /// Whether no name has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns `c` itself when `it` yields exactly one char, `None` otherwise.
fn single(mut it: impl Iterator<Item = char>) -> Option<char> {
    let c = it.next()?;
    it.next().is_none().then_some(c)
}

/// Folds a char for case-insensitive comparison.
///
/// Upper-cases then lower-cases, keeping the original char whenever a mapping
/// would expand into several chars, so folding is always one char to one char.
#[must_use]
pub fn fold_char(c: char) -> char {
    if c.is_ascii() {
        return c.to_ascii_lowercase();
    }
    let upper = single(c.to_uppercase()).unwrap_or(c);
    single(upper.to_lowercase()).unwrap_or(upper)
}

/// Compares two child names the way a directory orders its children.
///
/// Shorter names sort first; names of equal length compare char by char,
/// folded through [`fold_char`] when `case_sensitive` is false. Two names
/// compare `Equal` exactly when they denote the same child.
#[must_use]
pub fn compare_names(a: &str, b: &str, case_sensitive: bool) -> Ordering {
    let by_len = a.chars().count().cmp(&b.chars().count());
    if by_len != Ordering::Equal {
        return by_len;
    }
    if case_sensitive {
        return a.cmp(b);
    }
    a.chars()
        .map(fold_char)
        .cmp(b.chars().map(fold_char))
}

/// Key under which `name` is stored in case-aware hash sets.
///
/// Two names produce the same key iff [`compare_names`] reports them equal.
#[must_use]
pub fn name_key(name: &str, case_sensitive: bool) -> Box<str> {
    if case_sensitive {
        Box::from(name)
    } else {
        name.chars().map(fold_char).collect::<String>().into_boxed_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable() {
        let table = NameTable::new();
        let a = table.intern("alpha");
        let b = table.intern("beta");
        assert_ne!(a, b);
        assert_eq!(table.intern("alpha"), a);
        assert_eq!(table.name(b).as_deref(), Some("beta"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn unknown_id_has_no_name() {
        let table = NameTable::new();
        assert!(table.name(NameId::from_raw(7)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn shorter_names_sort_first() {
        assert_eq!(compare_names("zz", "aaa", true), Ordering::Less);
        assert_eq!(compare_names("b", "a", true), Ordering::Greater);
    }

    #[test]
    fn case_folding_only_when_insensitive() {
        assert_eq!(compare_names("Foo", "foo", false), Ordering::Equal);
        assert_ne!(compare_names("Foo", "foo", true), Ordering::Equal);
        assert_eq!(compare_names("ÄRGER", "ärger", false), Ordering::Equal);
    }

    #[test]
    fn keys_agree_with_comparator() {
        assert_eq!(name_key("README.md", false), name_key("readme.MD", false));
        assert_ne!(name_key("README.md", true), name_key("readme.MD", true));
    }
}
