//! Ordered string multimap used for packet metadata and URI queries.
//!
//! On the wire metadata travels as a URL-encoded query string
//! (`a=1&b=2&b=3`), preserving insertion order and repeated keys.

use std::fmt;

/// Ordered mapping of string keys to string values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    pairs: Vec<(String, String)>,
}

/// Query parameters parsed from a URI share the metadata representation.
pub type Query = Meta;

impl Meta {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a URL-encoded query string.
    pub fn parse(s: &str) -> Self {
        let mut meta = Self::new();
        meta.parse_append(s);
        meta
    }

    /// Append every pair of a URL-encoded query string.
    pub fn parse_append(&mut self, s: &str) {
        self.pairs.extend(
            form_urlencoded::parse(s.as_bytes()).map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }

    /// Encode as a URL-encoded query string.
    pub fn to_query_string(&self) -> String {
        let mut ser = form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.pairs {
            ser.append_pair(k, v);
        }
        ser.finish()
    }

    /// Append a value, keeping existing values for the key.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Replace all values for the key with a single value.
    ///
    /// The new pair takes the position of the first existing one, or goes
    /// last if the key was absent.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter().position(|(k, _)| *k == key) {
            Some(pos) => {
                self.pairs[pos].1 = value;
                let mut i = pos + 1;
                while i < self.pairs.len() {
                    if self.pairs[i].0 == key {
                        self.pairs.remove(i);
                    } else {
                        i += 1;
                    }
                }
            }
            None => self.pairs.push((key, value)),
        }
    }

    /// First value for the key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values for the key, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the key is present, with any value (including empty).
    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Remove all values for the key. Returns whether anything was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        let before = self.pairs.len();
        self.pairs.retain(|(k, _)| k != key);
        before != self.pairs.len()
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Remove all pairs.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

impl fmt::Display for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Meta {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
