//! Transfer filters and the per-packet transfer pipe.
//!
//! A filter is a stateless, reversible byte transform registered under a
//! unique non-zero id. A packet's [`XferPipe`] lists the ids to apply to its
//! serialized body: front to back when packing, back to front when
//! unpacking.
//!
//! Filters are registered once into a [`FilterRegistry`] at startup and the
//! registry is then shared read-only (usually behind an `Arc`) by every frame
//! codec.
//!
//! # Example
//!
//! ```
//! use tpwire::xfer::{FilterRegistry, Md5Hash, XferPipe};
//! use bytes::Bytes;
//!
//! let mut registry = FilterRegistry::new();
//! registry.register(Md5Hash::new(b'm', "md5")).unwrap();
//!
//! let mut pipe = XferPipe::new();
//! pipe.append(b'm');
//!
//! let packed = pipe.on_pack(&registry, Bytes::from_static(b"body")).unwrap();
//! assert_eq!(packed.len(), 4 + 16);
//! let unpacked = pipe.on_unpack(&registry, packed).unwrap();
//! assert_eq!(&unpacked[..], b"body");
//! ```

mod aes;
mod cipher;
mod md5_hash;

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;

use crate::error::{Result, WireError};

pub use self::aes::AesFilter;
pub use cipher::{AesCipher, Envelope};
pub use md5_hash::{Md5Hash, DIGEST_LEN};

/// A reversible byte transform.
///
/// `on_unpack` must be the exact inverse of `on_pack`. Implementations hold
/// no per-call state and must fail closed on malformed input.
pub trait XferFilter: Send + Sync + 'static {
    /// Unique non-zero id carried on the wire.
    fn id(&self) -> u8;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Transform outgoing bytes.
    fn on_pack(&self, data: Bytes) -> Result<Bytes>;

    /// Reverse the transform on incoming bytes.
    fn on_unpack(&self, data: Bytes) -> Result<Bytes>;
}

/// Lookup table of filters keyed by id.
#[derive(Default)]
pub struct FilterRegistry {
    /// Filters by id.
    filters: HashMap<u8, Box<dyn XferFilter>>,
    /// Name to id mapping.
    names: HashMap<String, u8>,
}

impl FilterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filter.
    ///
    /// Fails if the id is 0 or already taken.
    pub fn register<F: XferFilter>(&mut self, filter: F) -> Result<()> {
        let id = filter.id();
        if id == 0 {
            return Err(WireError::ReservedFilterId(filter.name().to_string()));
        }
        if self.filters.contains_key(&id) {
            return Err(WireError::DuplicateFilter {
                id,
                name: filter.name().to_string(),
            });
        }
        self.names.insert(filter.name().to_string(), id);
        self.filters.insert(id, Box::new(filter));
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F: XferFilter>(mut self, filter: F) -> Result<Self> {
        self.register(filter)?;
        Ok(self)
    }

    /// Get a filter by id.
    pub fn get(&self, id: u8) -> Result<&dyn XferFilter> {
        self.filters
            .get(&id)
            .map(|f| f.as_ref())
            .ok_or(WireError::UnknownFilter(id))
    }

    /// Get a filter by name.
    pub fn get_by_name(&self, name: &str) -> Option<&dyn XferFilter> {
        self.names
            .get(name)
            .and_then(|id| self.filters.get(id))
            .map(|f| f.as_ref())
    }

    /// Whether an id is registered.
    pub fn contains(&self, id: u8) -> bool {
        self.filters.contains_key(&id)
    }

    /// Number of registered filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether no filter is registered.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.filters.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("FilterRegistry").field("ids", &ids).finish()
    }
}

/// Ordered list of filter ids applied to one packet body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XferPipe {
    ids: Vec<u8>,
}

impl XferPipe {
    /// Create an empty pipe.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pipe from wire ids.
    pub fn from_ids(ids: impl Into<Vec<u8>>) -> Self {
        Self { ids: ids.into() }
    }

    /// Append a filter id.
    pub fn append(&mut self, id: u8) {
        self.ids.push(id);
    }

    /// Filter ids in apply order.
    #[inline]
    pub fn ids(&self) -> &[u8] {
        &self.ids
    }

    /// Number of filters.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the pipe is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Remove every id.
    pub fn reset(&mut self) {
        self.ids.clear();
    }

    /// Check that every id is registered.
    pub fn validate(&self, registry: &FilterRegistry) -> Result<()> {
        for &id in &self.ids {
            registry.get(id)?;
        }
        Ok(())
    }

    /// Apply the filters in order.
    pub fn on_pack(&self, registry: &FilterRegistry, mut data: Bytes) -> Result<Bytes> {
        for &id in &self.ids {
            data = registry.get(id)?.on_pack(data)?;
        }
        Ok(data)
    }

    /// Reverse the filters, last first.
    pub fn on_unpack(&self, registry: &FilterRegistry, mut data: Bytes) -> Result<Bytes> {
        self.validate(registry)?;
        for &id in self.ids.iter().rev() {
            data = registry.get(id)?.on_unpack(data)?;
        }
        Ok(data)
    }

    /// Filter names in apply order; unknown ids are skipped.
    pub fn names<'a>(&self, registry: &'a FilterRegistry) -> Vec<&'a str> {
        self.ids
            .iter()
            .filter_map(|&id| registry.get(id).ok().map(|f| f.name()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Appends a marker byte; unpack strips it only if it matches.
    struct Tag(u8);

    impl XferFilter for Tag {
        fn id(&self) -> u8 {
            self.0
        }

        fn name(&self) -> &str {
            "tag"
        }

        fn on_pack(&self, data: Bytes) -> Result<Bytes> {
            let mut v = data.to_vec();
            v.push(self.0);
            Ok(Bytes::from(v))
        }

        fn on_unpack(&self, data: Bytes) -> Result<Bytes> {
            match data.last() {
                Some(&b) if b == self.0 => Ok(data.slice(..data.len() - 1)),
                _ => Err(WireError::Integrity(format!("missing tag {}", self.0))),
            }
        }
    }

    #[test]
    fn test_register_rejects_zero_and_duplicates() {
        let mut registry = FilterRegistry::new();
        assert!(matches!(
            registry.register(Tag(0)),
            Err(WireError::ReservedFilterId(_))
        ));
        registry.register(Tag(1)).unwrap();
        assert!(matches!(
            registry.register(Tag(1)),
            Err(WireError::DuplicateFilter { id: 1, .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_pipe_is_noop() {
        let registry = FilterRegistry::new();
        let pipe = XferPipe::new();
        let data = Bytes::from_static(b"abc");
        assert_eq!(pipe.on_pack(&registry, data.clone()).unwrap(), data);
        assert_eq!(pipe.on_unpack(&registry, data.clone()).unwrap(), data);
    }

    #[test]
    fn test_order_is_reversed_on_unpack() {
        let registry = FilterRegistry::new()
            .with(Tag(1))
            .unwrap()
            .with(Tag(2))
            .unwrap();
        let pipe = XferPipe::from_ids(vec![1, 2]);

        let packed = pipe.on_pack(&registry, Bytes::from_static(b"x")).unwrap();
        assert_eq!(&packed[..], &[b'x', 1, 2]);
        assert_eq!(&pipe.on_unpack(&registry, packed.clone()).unwrap()[..], b"x");

        // Wrong order fails: 1 is not the outermost transform.
        let reversed = XferPipe::from_ids(vec![2, 1]);
        assert!(reversed.on_unpack(&registry, packed).is_err());
    }

    #[test]
    fn test_unknown_id() {
        let registry = FilterRegistry::new().with(Tag(1)).unwrap();
        let pipe = XferPipe::from_ids(vec![1, 9]);
        let err = pipe
            .on_unpack(&registry, Bytes::from_static(b"x\x01"))
            .unwrap_err();
        assert!(matches!(err, WireError::UnknownFilter(9)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_names() {
        let registry = FilterRegistry::new()
            .with(Md5Hash::new(b'm', "md5"))
            .unwrap();
        let pipe = XferPipe::from_ids(vec![b'm']);
        assert_eq!(pipe.names(&registry), vec!["md5"]);
        assert!(registry.get_by_name("md5").is_some());
        assert!(registry.get_by_name("gzip").is_none());
    }
}
