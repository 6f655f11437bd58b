//! Byte-oriented cache adapter.
//!
//! Keys and values cross into this backend as byte strings produced by the
//! [`Binary`] codec, the way they would travel to a remote cache server.
//! The entry limit makes the backend refuse writes once full, which is the
//! kind of failure a real cache reports and the runtime must survive.

use super::Adapter;
use crate::error::{BackendError, StoreError};
use crate::storage::codec::{Binary, Codec};
use crate::storage::Ops;
use crate::term::Term;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Options for [`CacheAdapter`].
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Maximum number of entries (None = unbounded)
    pub max_entries: Option<usize>,
}

/// State of a [`CacheAdapter`] store.
#[derive(Debug, Default)]
pub struct CacheState {
    entries: HashMap<Bytes, Bytes>,
    max_entries: Option<usize>,
}

impl CacheState {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total encoded size of keys and values, in bytes.
    pub fn stored_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

/// A bounded byte map behind the binary codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheAdapter {
    codec: Binary,
}

impl CacheAdapter {
    pub fn new() -> Self {
        Self {
            codec: Binary::new(),
        }
    }

    /// Compresses stored values at the given zlib level.
    pub fn compressed(level: u32) -> Self {
        Self {
            codec: Binary::compressed(level),
        }
    }
}

impl Adapter for CacheAdapter {
    type Options = CacheOptions;
    type State = CacheState;
    type Codec = Binary;

    fn codec(&self) -> Binary {
        self.codec
    }

    fn setup(&self, options: CacheOptions) -> Result<CacheState, BackendError> {
        if options.max_entries == Some(0) {
            return Err(BackendError::new("max_entries must be at least 1"));
        }

        Ok(CacheState {
            entries: HashMap::new(),
            max_entries: options.max_entries,
        })
    }

    fn teardown(&self, reason: &crate::storage::ShutdownReason, state: CacheState) {
        debug!(
            ?reason,
            entries = state.len(),
            bytes = state.stored_bytes(),
            "Releasing cache state"
        );
    }

    fn fetch(&self, state: &mut CacheState, key: &Bytes) -> Result<Option<Bytes>, BackendError> {
        Ok(state.entries.get(key).cloned())
    }

    fn put(&self, state: &mut CacheState, key: Bytes, value: Bytes) -> Result<(), BackendError> {
        if let Some(max) = state.max_entries {
            if state.entries.len() >= max && !state.entries.contains_key(&key) {
                return Err(BackendError::new(format!("cache full ({} entries)", max)));
            }
        }

        state.entries.insert(key, value);
        Ok(())
    }

    fn delete(&self, state: &mut CacheState, key: &Bytes) -> Result<(), BackendError> {
        state.entries.remove(key);
        Ok(())
    }

    fn is_enumerable(&self) -> bool {
        true
    }

    fn to_enumerable(&self, state: &mut CacheState) -> Result<Vec<(Bytes, Bytes)>, StoreError> {
        Ok(state
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    /// Reads the map directly; absent keys are skipped.
    fn take(ops: &mut Ops<'_, Self>, keys: Vec<Term>) -> Result<BTreeMap<Term, Term>, StoreError> {
        let codec = *ops.codec();
        let entries = &ops.state().entries;

        let mut found = BTreeMap::new();
        for key in keys {
            if let Some(value) = entries.get(&codec.serialize_key(&key)?) {
                found.insert(key, codec.deserialize_value(value)?);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::derive;

    #[test]
    fn test_rejects_zero_capacity() {
        let result = CacheAdapter::new().setup(CacheOptions {
            max_entries: Some(0),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_full_cache_refuses_new_keys_only() {
        let adapter = CacheAdapter::new();
        let codec = adapter.codec();
        let mut state = adapter
            .setup(CacheOptions {
                max_entries: Some(1),
            })
            .unwrap();

        let a = codec.serialize_key(&Term::from("a")).unwrap();
        let b = codec.serialize_key(&Term::from("b")).unwrap();
        let v = codec.serialize_value(&Term::from(1)).unwrap();

        adapter.put(&mut state, a.clone(), v.clone()).unwrap();
        assert!(adapter.put(&mut state, b.clone(), v.clone()).is_err());
        assert_eq!(state.len(), 1);

        // Overwriting an existing key still works when full
        adapter.put(&mut state, a, v.clone()).unwrap();
        assert_eq!(adapter.fetch(&mut state, &b).unwrap(), None);
    }

    #[test]
    fn test_stored_bytes_reflects_compression() {
        let value = Term::from("y".repeat(2048));

        let plain = CacheAdapter::new();
        let mut plain_state = plain.setup(CacheOptions::default()).unwrap();
        plain
            .put(
                &mut plain_state,
                plain.codec().serialize_key(&Term::from("k")).unwrap(),
                plain.codec().serialize_value(&value).unwrap(),
            )
            .unwrap();

        let packed = CacheAdapter::compressed(6);
        let mut packed_state = packed.setup(CacheOptions::default()).unwrap();
        packed
            .put(
                &mut packed_state,
                packed.codec().serialize_key(&Term::from("k")).unwrap(),
                packed.codec().serialize_value(&value).unwrap(),
            )
            .unwrap();

        assert!(packed_state.stored_bytes() < plain_state.stored_bytes());
    }

    #[test]
    fn test_native_take_matches_derived() {
        let adapter = CacheAdapter::compressed(6);
        let codec = adapter.codec();
        let mut state = adapter.setup(CacheOptions::default()).unwrap();

        let mut ops = Ops::new(&adapter, &codec, &mut state, None);
        ops.put(&Term::from("a"), &Term::from(1)).unwrap();
        ops.put(&Term::List(vec![Term::from(2)]), &Term::from("two")).unwrap();

        let keys = vec![Term::from("a"), Term::List(vec![Term::from(2)]), Term::from("missing")];
        let native = CacheAdapter::take(&mut ops, keys.clone()).unwrap();
        let derived = derive::take(&mut ops, keys).unwrap();

        assert_eq!(native.len(), 2);
        assert_eq!(native, derived);
        assert_eq!(native.get(&Term::from("a")), Some(&Term::from(1)));
        assert_eq!(state.len(), 2);
    }
}
