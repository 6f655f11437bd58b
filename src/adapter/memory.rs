//! In-memory adapter: a `HashMap` of terms owned by the store task.

use super::Adapter;
use crate::error::{BackendError, StoreError};
use crate::storage::codec::Passthrough;
use crate::storage::derive::Ops;
use crate::term::Term;
use std::collections::{BTreeMap, HashMap};

/// Options for [`MemoryAdapter`].
#[derive(Debug, Clone, Default)]
pub struct MemoryOptions {
    /// Pre-allocated capacity of the map
    pub capacity: usize,
}

/// Stores terms as-is in a `HashMap`.
///
/// Enumerable, and answers `take` with direct map lookups instead of one
/// fetch per key.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryAdapter;

impl Adapter for MemoryAdapter {
    type Options = MemoryOptions;
    type State = HashMap<Term, Term>;
    type Codec = Passthrough;

    fn codec(&self) -> Passthrough {
        Passthrough
    }

    fn setup(&self, options: MemoryOptions) -> Result<Self::State, BackendError> {
        Ok(HashMap::with_capacity(options.capacity))
    }

    fn fetch(&self, state: &mut Self::State, key: &Term) -> Result<Option<Term>, BackendError> {
        Ok(state.get(key).cloned())
    }

    fn put(&self, state: &mut Self::State, key: Term, value: Term) -> Result<(), BackendError> {
        state.insert(key, value);
        Ok(())
    }

    fn delete(&self, state: &mut Self::State, key: &Term) -> Result<(), BackendError> {
        state.remove(key);
        Ok(())
    }

    fn is_enumerable(&self) -> bool {
        true
    }

    fn to_enumerable(&self, state: &mut Self::State) -> Result<Vec<(Term, Term)>, StoreError> {
        Ok(state.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn take(ops: &mut Ops<'_, Self>, keys: Vec<Term>) -> Result<BTreeMap<Term, Term>, StoreError> {
        let state = ops.state();
        Ok(keys
            .into_iter()
            .filter_map(|key| state.get(&key).cloned().map(|value| (key, value)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mandatory_operations() {
        let adapter = MemoryAdapter;
        let mut state = adapter.setup(MemoryOptions { capacity: 16 }).unwrap();

        adapter.put(&mut state, "k".into(), Term::from(1)).unwrap();
        assert_eq!(adapter.fetch(&mut state, &"k".into()).unwrap(), Some(Term::from(1)));

        adapter.delete(&mut state, &"k".into()).unwrap();
        assert_eq!(adapter.fetch(&mut state, &"k".into()).unwrap(), None);

        // Deleting again is fine
        adapter.delete(&mut state, &"k".into()).unwrap();
    }

    #[test]
    fn test_native_take_matches_derived() {
        let adapter = MemoryAdapter;
        let codec = adapter.codec();
        let mut state = adapter.setup(MemoryOptions::default()).unwrap();
        state.insert("a".into(), Term::from(1));
        state.insert("b".into(), Term::from(2));

        let keys = vec![Term::from("a"), Term::from("c")];
        let mut ops = Ops::new(&adapter, &codec, &mut state, None);

        let native = MemoryAdapter::take(&mut ops, keys.clone()).unwrap();
        let derived = crate::storage::derive::take(&mut ops, keys).unwrap();
        assert_eq!(native, derived);
        assert_eq!(native.len(), 1);
    }
}
