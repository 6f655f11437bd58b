//! Derived Operation Engine
//!
//! Every operation beyond fetch, put and delete is composed here out of
//! those three. The compositions are safe without locks because they only
//! ever run inside a store's runtime task, which handles one request at a
//! time: nothing can land between a fetch and the put that follows it.
//!
//! [`Ops`] is the view of a store a composition works through. It owns the
//! serialization path (terms in, terms out) and tells the expiry engine about
//! every write and delete, so a derived operation never has to think about
//! encodings or timers.
//!
//! Adapters with a native primitive can replace any composition by
//! overriding the matching method of [`Adapter`]; the defaults there simply
//! call into this module.

use crate::adapter::{Adapter, Encoded};
use crate::error::{NoInteger, StoreError};
use crate::storage::codec::Codec;
use crate::storage::expiry::ExpiryHandle;
use crate::term::Term;
use std::collections::BTreeMap;
use std::time::Duration;

/// Computes a default only when it is needed.
pub type LazyFn = Box<dyn FnOnce() -> Term + Send>;

/// Maps a present value to its replacement.
pub type MapFn = Box<dyn FnOnce(Term) -> Term + Send>;

/// Receives the current value (`None` when absent) and decides what to do.
pub type UpdateFn = Box<dyn FnOnce(Option<Term>) -> GetAndUpdate + Send>;

/// What a `get_and_update` function wants done with the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetAndUpdate {
    /// Store `value` and answer the caller with `reply`.
    Update { reply: Term, value: Term },
    /// Remove the key and answer with the value it had.
    Pop,
}

/// A default value, given up front or computed on demand.
pub enum Fallback {
    Value(Term),
    Lazy(LazyFn),
}

impl Fallback {
    /// Produces the value, running the function if there is one.
    pub fn resolve(self) -> Term {
        match self {
            Fallback::Value(term) => term,
            Fallback::Lazy(f) => f(),
        }
    }
}

impl From<Term> for Fallback {
    fn from(term: Term) -> Self {
        Fallback::Value(term)
    }
}

impl std::fmt::Debug for Fallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fallback::Value(term) => f.debug_tuple("Value").field(term).finish(),
            Fallback::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

/// A store's mandatory operations, in logical terms.
///
/// Handed to every derived operation and adapter override. Writes and
/// deletes made through it keep the expiry engine in step.
pub struct Ops<'a, A: Adapter> {
    adapter: &'a A,
    codec: &'a A::Codec,
    state: &'a mut A::State,
    expiry: Option<&'a ExpiryHandle<Encoded<A>>>,
}

impl<'a, A: Adapter> Ops<'a, A> {
    pub(crate) fn new(
        adapter: &'a A,
        codec: &'a A::Codec,
        state: &'a mut A::State,
        expiry: Option<&'a ExpiryHandle<Encoded<A>>>,
    ) -> Self {
        Self {
            adapter,
            codec,
            state,
            expiry,
        }
    }

    /// The store's codec, for native overrides that address state by
    /// encoded key.
    pub fn codec(&self) -> &A::Codec {
        self.codec
    }

    /// Direct access to the backend state, for native overrides.
    pub fn state(&mut self) -> &mut A::State {
        self.state
    }

    /// Fetches a key. `Ok(None)` means absent.
    pub fn fetch(&mut self, key: &Term) -> Result<Option<Term>, StoreError> {
        let encoded = self.codec.serialize_key(key)?;
        let found = self
            .adapter
            .fetch(self.state, &encoded)
            .map_err(|e| e.or_key(key))?;

        match found {
            Some(value) => Ok(Some(self.codec.deserialize_value(&value)?)),
            None => Ok(None),
        }
    }

    /// Stores a value. The key's timer is reset to the store's default TTL.
    pub fn put(&mut self, key: &Term, value: &Term) -> Result<(), StoreError> {
        self.put_expiring(key, value, None)
    }

    /// Deletes a key. Deleting an absent key succeeds.
    pub fn delete(&mut self, key: &Term) -> Result<(), StoreError> {
        let encoded = self.codec.serialize_key(key)?;
        self.adapter
            .delete(self.state, &encoded)
            .map_err(|e| e.or_key(key))?;

        // A stopped engine holds no timers, so there is nothing to cancel
        if let Some(expiry) = self.expiry {
            let _ = expiry.persist(encoded);
        }
        Ok(())
    }

    /// Stores a value and schedules its removal after `ttl` (or the store
    /// default when `ttl` is `None`).
    pub(crate) fn put_expiring(
        &mut self,
        key: &Term,
        value: &Term,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        if self.expiry.is_some_and(|expiry| !expiry.is_running()) {
            return Err(StoreError::ExpiryStopped);
        }

        let encoded_key = self.codec.serialize_key(key)?;
        let encoded_value = self.codec.serialize_value(value)?;
        self.adapter
            .put(self.state, encoded_key.clone(), encoded_value)
            .map_err(|e| e.or_key(key))?;

        if let Some(expiry) = self.expiry {
            expiry.expire(encoded_key, ttl)?;
        }
        Ok(())
    }

    /// Replaces the timer of an existing key. Returns `true` when the key
    /// now has a pending timer; `false` when the key is absent (nothing is
    /// scheduled) or when neither `ttl` nor a default TTL applies (any old
    /// timer is cancelled).
    pub(crate) fn expire(&mut self, key: &Term, ttl: Option<Duration>) -> Result<bool, StoreError> {
        let expiry = self.expiry.ok_or(StoreError::ExpiryDisabled)?;

        if self.fetch(key)?.is_none() {
            return Ok(false);
        }

        expiry.expire(self.codec.serialize_key(key)?, ttl)
    }

    /// Cancels the key's timer, if any.
    pub(crate) fn persist(&mut self, key: &Term) -> Result<(), StoreError> {
        let expiry = self.expiry.ok_or(StoreError::ExpiryDisabled)?;
        expiry.persist(self.codec.serialize_key(key)?)
    }

    pub(crate) fn require_expiry(&self) -> Result<(), StoreError> {
        self.expiry.map(|_| ()).ok_or(StoreError::ExpiryDisabled)
    }

    /// All entries, ordered by key. Fails on non-enumerable backends.
    pub fn entries(&mut self) -> Result<Vec<(Term, Term)>, StoreError> {
        if !self.adapter.is_enumerable() {
            return Err(StoreError::EnumerationUnsupported);
        }

        let mut entries = self
            .adapter
            .to_enumerable(self.state)?
            .iter()
            .map(|(k, v)| {
                Ok((
                    self.codec.deserialize_key(k)?,
                    self.codec.deserialize_value(v)?,
                ))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

pub fn get<A: Adapter>(ops: &mut Ops<'_, A>, key: Term, default: Fallback) -> Result<Term, StoreError> {
    match ops.fetch(&key)? {
        Some(value) => Ok(value),
        None => Ok(default.resolve()),
    }
}

/// With `strict`, an absent key fails before `fun` is called.
pub fn get_and_update<A: Adapter>(
    ops: &mut Ops<'_, A>,
    key: Term,
    fun: UpdateFn,
    strict: bool,
) -> Result<Term, StoreError> {
    let current = ops.fetch(&key)?;
    if strict && current.is_none() {
        return Err(StoreError::KeyNotFound(key));
    }

    match fun(current.clone()) {
        GetAndUpdate::Update { reply, value } => {
            ops.put(&key, &value)?;
            Ok(reply)
        }
        GetAndUpdate::Pop => match current {
            Some(previous) => {
                ops.delete(&key)?;
                Ok(previous)
            }
            None => Ok(Term::Nil),
        },
    }
}

pub fn pop<A: Adapter>(ops: &mut Ops<'_, A>, key: Term, default: Fallback) -> Result<Term, StoreError> {
    match ops.fetch(&key)? {
        Some(value) => {
            ops.delete(&key)?;
            Ok(value)
        }
        None => Ok(default.resolve()),
    }
}

pub fn put_new<A: Adapter>(ops: &mut Ops<'_, A>, key: Term, value: Fallback) -> Result<(), StoreError> {
    if ops.fetch(&key)?.is_none() {
        ops.put(&key, &value.resolve())?;
    }
    Ok(())
}

/// Absent keys are a no-op, or `KeyNotFound` with `strict`.
pub fn replace<A: Adapter>(
    ops: &mut Ops<'_, A>,
    key: Term,
    value: Term,
    strict: bool,
) -> Result<(), StoreError> {
    match ops.fetch(&key)? {
        Some(_) => ops.put(&key, &value),
        None if strict => Err(StoreError::KeyNotFound(key)),
        None => Ok(()),
    }
}

/// `initial: None` makes an absent key an error (the strict form).
pub fn update<A: Adapter>(
    ops: &mut Ops<'_, A>,
    key: Term,
    initial: Option<Term>,
    fun: MapFn,
) -> Result<(), StoreError> {
    match (ops.fetch(&key)?, initial) {
        (Some(current), _) => ops.put(&key, &fun(current)),
        (None, Some(initial)) => ops.put(&key, &initial),
        (None, None) => Err(StoreError::KeyNotFound(key)),
    }
}

/// Stops at the first failure; keys deleted before it stay deleted.
pub fn drop_keys<A: Adapter>(ops: &mut Ops<'_, A>, keys: Vec<Term>) -> Result<(), StoreError> {
    for key in &keys {
        ops.delete(key)?;
    }
    Ok(())
}

pub fn take<A: Adapter>(ops: &mut Ops<'_, A>, keys: Vec<Term>) -> Result<BTreeMap<Term, Term>, StoreError> {
    let mut found = BTreeMap::new();
    for key in keys {
        if let Some(value) = ops.fetch(&key)? {
            found.insert(key, value);
        }
    }
    Ok(found)
}

pub fn split<A: Adapter>(ops: &mut Ops<'_, A>, keys: Vec<Term>) -> Result<BTreeMap<Term, Term>, StoreError> {
    let mut found = BTreeMap::new();
    for key in keys {
        if let Some(value) = ops.fetch(&key)? {
            ops.delete(&key)?;
            found.insert(key, value);
        }
    }
    Ok(found)
}

/// Absent keys count as zero.
pub fn bump<A: Adapter>(
    ops: &mut Ops<'_, A>,
    key: Term,
    amount: i64,
) -> Result<Result<i64, NoInteger>, StoreError> {
    let current = match ops.fetch(&key)? {
        None => 0,
        Some(Term::Int(n)) => n,
        Some(_) => return Ok(Err(NoInteger { key })),
    };

    let next = current
        .checked_add(amount)
        .ok_or_else(|| StoreError::Arithmetic(format!("bumping {} by {} overflows", key, amount)))?;

    ops.put(&key, &Term::Int(next))?;
    Ok(Ok(next))
}
