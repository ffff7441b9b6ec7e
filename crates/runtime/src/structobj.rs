//! The struct container (spec §3.3): an insertion-ordered key/value map.
//!
//! Grounded on the design note in spec §9 ("Struct ordering"): we keep an
//! insertion-ordered key list alongside a hash index from key to that list's
//! position, rather than reaching for an external ordered-map crate — the
//! teacher repo hand-rolls its own stack and string types for the same
//! reason (no dependency pulls its own weight for a structure this small).

use std::collections::HashMap;

use crate::value::{Key, Value};

#[derive(Default)]
pub struct StructObj {
    /// Entries in first-insertion order. A `delete` removes an entry here
    /// (shifting everything after it down by one) and is the only operation
    /// that disturbs this vector's indices.
    entries: Vec<(Key, Value)>,
    /// Key -> position in `entries`, kept in sync with every mutation.
    index: HashMap<Key, usize>,
}

impl StructObj {
    pub fn new() -> Self {
        StructObj {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Reading an absent key returns `void` (spec §3.3); the documented
    /// existence test is `typeof(x) == "void"`.
    pub fn get(&self, key: &Key) -> Value {
        self.index
            .get(key)
            .map(|&i| self.entries[i].1.clone())
            .unwrap_or(Value::Void)
    }

    /// Overwriting an existing key updates its value in place and does not
    /// change its position; inserting a new key appends it (spec §3.3).
    pub fn set(&mut self, key: Key, value: Value) {
        if let Some(&i) = self.index.get(&key) {
            self.entries[i].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    /// `delete st.k`: removes the entry, shifting the order closed (spec
    /// §3.3). A no-op if the key is absent.
    pub fn remove(&mut self, key: &Key) {
        let Some(pos) = self.index.remove(key) else {
            return;
        };
        self.entries.remove(pos);
        // Every entry after `pos` shifted down by one; re-point the index.
        for (k, _) in self.entries.iter().skip(pos) {
            if let Some(slot) = self.index.get_mut(k) {
                *slot -= 1;
            }
        }
    }

    /// Snapshot of the key order, used by `foreach`'s `ITER_INIT` (spec §4.4,
    /// §9 "Foreach snapshot"): the visited key set is fixed at loop entry,
    /// even if the struct is mutated mid-iteration.
    pub fn key_snapshot(&self) -> Vec<Key> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(s: &str) -> Key {
        Key::Str(s.into())
    }

    #[test]
    fn insertion_order_is_preserved_across_overwrite() {
        let mut s = StructObj::new();
        s.set(k("foo"), Value::Int(1));
        s.set(k("bar"), Value::Int(2));
        s.set(k("foo"), Value::Int(99)); // overwrite: position unchanged
        let order: Vec<_> = s.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(order, vec![k("foo"), k("bar")]);
        assert_eq!(s.get(&k("foo")), Value::Int(99));
    }

    #[test]
    fn delete_closes_the_order() {
        let mut s = StructObj::new();
        s.set(k("foo"), Value::Int(1));
        s.set(k("bar"), Value::Int(2));
        s.set(k("haha"), Value::str("^_^"));
        s.remove(&k("foo"));
        let order: Vec<_> = s.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(order, vec![k("bar"), k("haha")]);
        assert_eq!(s.get(&k("foo")), Value::Void);
        // re-inserting after delete appends at the new end
        s.set(k("zzz"), Value::Int(3));
        let order: Vec<_> = s.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(order, vec![k("bar"), k("haha"), k("zzz")]);
    }

    #[test]
    fn missing_key_is_void() {
        let s = StructObj::new();
        assert_eq!(s.get(&k("nope")), Value::Void);
        assert_eq!(s.get(&k("nope")).type_name(), "void");
    }

    #[test]
    fn mixed_key_types_coexist() {
        let mut s = StructObj::new();
        s.set(Key::Int(0), Value::str("zero"));
        s.set(k("name"), Value::str("ok"));
        assert_eq!(s.get(&Key::Int(0)), Value::str("zero"));
        assert_eq!(s.get(&k("name")), Value::str("ok"));
    }
}
