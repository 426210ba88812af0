//! Ordered header mapping.
//!
//! # Design Decisions
//! - Insertion order is preserved; inserting an existing name replaces the
//!   value in place
//! - Names are stored as given; [`Headers::normalized`] produces the
//!   lowercase-keyed view documents expose
//! - A field is either one value or a list; `set-cookie` from the wire is
//!   always kept as separate values since cookie dates contain commas

use std::sync::LazyLock;

use hyper::header::{HeaderMap, SET_COOKIE};
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

static EMPTY: LazyLock<Headers> = LazyLock::new(Headers::new);

/// Value of one header field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    One(String),
    /// Repeated field lines that must not be joined.
    Many(Vec<String>),
}

impl FieldValue {
    /// The first value, if any.
    pub fn first(&self) -> Option<&str> {
        self.as_slice().first().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        match self {
            FieldValue::One(value) => std::slice::from_ref(value),
            FieldValue::Many(values) => values,
        }
    }

    fn push(&mut self, value: String) {
        match self {
            FieldValue::One(first) => {
                let first = std::mem::take(first);
                *self = FieldValue::Many(vec![first, value]);
            }
            FieldValue::Many(values) => values.push(value),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::One(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::One(value.to_string())
    }
}

/// Header name to value mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(IndexMap<String, FieldValue>);

impl Headers {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub(crate) fn empty() -> &'static Headers {
        &EMPTY
    }

    /// Insert a header, returning the value it replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<FieldValue> {
        self.0.insert(name.into(), FieldValue::One(value.into()))
    }

    /// Add a value without replacing the existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        match self.0.entry(name.into()) {
            Entry::Occupied(mut entry) => entry.get_mut().push(value.into()),
            Entry::Vacant(entry) => {
                entry.insert(FieldValue::One(value.into()));
            }
        }
    }

    /// Exact-name lookup. For repeated fields, the first value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(FieldValue::first)
    }

    /// Every value stored under exactly `name`.
    pub fn get_all(&self, name: &str) -> impl Iterator<Item = &str> {
        self.0
            .get(name)
            .map(FieldValue::as_slice)
            .unwrap_or_default()
            .iter()
            .map(String::as_str)
    }

    /// Lookup comparing names without regard to ASCII case.
    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .and_then(|(_, value)| value.first())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// One `(name, value)` pair per field line; repeated fields yield their name once per value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().flat_map(|(name, value)| {
            value
                .as_slice()
                .iter()
                .map(move |v| (name.as_str(), v.as_str()))
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Fold every name to lowercase, in iteration order.
    ///
    /// When two names fold to the same key the later value wins.
    pub fn normalized(&self) -> Headers {
        let mut folded: IndexMap<String, FieldValue> = IndexMap::with_capacity(self.0.len());
        let mut first_seen: IndexMap<String, &str> = IndexMap::new();

        for (name, value) in &self.0 {
            let key = name.to_lowercase();
            if let Some(previous) = first_seen.get(&key) {
                tracing::debug!(
                    header = %key,
                    previous = %previous,
                    replacement = %name,
                    "Header names collide after case folding, keeping the later value"
                );
            } else {
                first_seen.insert(key.clone(), name);
            }
            folded.insert(key, value.clone());
        }
        Headers(folded)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Headers {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Repeated headers are joined with `", "`, except `set-cookie`, whose
/// values are kept apart. Non-UTF-8 bytes are replaced.
impl From<&HeaderMap> for Headers {
    fn from(map: &HeaderMap) -> Self {
        let mut headers = Headers::new();
        for name in map.keys() {
            let values = map
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
            if name == SET_COOKIE {
                for value in values {
                    headers.append(name.as_str(), value);
                }
            } else {
                headers.insert(name.as_str(), values.collect::<Vec<_>>().join(", "));
            }
        }
        headers
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = indexmap::map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
