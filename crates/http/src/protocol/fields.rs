//! Ordered multi-value maps for parameters and headers.

use std::fmt;
use std::slice;

/// One or several values under the same name.
///
/// A name starts out scalar; the second value under it promotes the entry to
/// a list of both, and further values append. First-wins accessors stay
/// stable across the promotion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    One(String),
    List(Vec<String>),
}

impl FieldValue {
    /// The first (often only) value.
    pub fn first(&self) -> &str {
        match self {
            Self::One(v) => v,
            Self::List(vs) => vs.first().map_or("", String::as_str),
        }
    }

    /// Number of values under this name.
    pub fn count(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::List(vs) => vs.len(),
        }
    }

    pub fn iter(&self) -> slice::Iter<'_, String> {
        match self {
            Self::One(v) => slice::from_ref(v).iter(),
            Self::List(vs) => vs.iter(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            Self::One(prior) => {
                let prior = std::mem::take(prior);
                *self = Self::List(vec![prior, value]);
            }
            Self::List(vs) => vs.push(value),
        }
    }
}

/// Name → [`FieldValue`] map preserving first-insertion order of names.
///
/// Lookups are linear; request parameter and header counts are small enough
/// that this beats hashing, and iteration order is part of the contract.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, FieldValue)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value under `name`, promoting a scalar entry to a list.
    pub fn insert(&mut self, name: String, value: String) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => existing.push(value),
            None => self.entries.push((name, FieldValue::One(value))),
        }
    }

    /// The first value under `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entry(name).map(FieldValue::first)
    }

    pub fn entry(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// All values under `name`, in insertion order. The iterator borrows the
    /// map only, so `name` may be transient.
    pub fn all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        self.entry(name).into_iter().flat_map(|v| v.iter().map(String::as_str))
    }

    /// Names in first-insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for FieldMap {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl fmt::Debug for FieldMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter().map(|(n, v)| (n, v))).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_value_promotes_to_a_list() {
        let mut map = FieldMap::new();
        map.insert("x".to_string(), "1".to_string());
        assert_eq!(map.entry("x"), Some(&FieldValue::One("1".to_string())));

        map.insert("x".to_string(), "2".to_string());
        map.insert("x".to_string(), "3".to_string());
        assert_eq!(
            map.entry("x"),
            Some(&FieldValue::List(vec!["1".to_string(), "2".to_string(), "3".to_string()]))
        );

        // first-wins accessor is unaffected by promotion
        assert_eq!(map.get("x"), Some("1"));
        assert_eq!(map.all("x").collect::<Vec<_>>(), vec!["1", "2", "3"]);
    }

    #[test]
    fn names_keep_first_insertion_order() {
        let mut map = FieldMap::new();
        map.insert("b".to_string(), "1".to_string());
        map.insert("a".to_string(), "2".to_string());
        map.insert("b".to_string(), "3".to_string());

        assert_eq!(map.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn all_outlives_a_transient_name() {
        let mut map = FieldMap::new();
        map.insert("x".to_string(), "1".to_string());
        map.insert("x".to_string(), "2".to_string());

        let values: Vec<&str> = map.all(&String::from("x")).collect();
        assert_eq!(values, vec!["1", "2"]);
    }

    #[test]
    fn absent_names_yield_nothing() {
        let map = FieldMap::new();
        assert_eq!(map.get("missing"), None);
        assert_eq!(map.all("missing").count(), 0);
    }
}
