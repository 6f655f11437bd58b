//! Backend Adapters
//!
//! An adapter teaches the store runtime how to talk to one storage engine.
//! It only has to provide three operations on serialized keys and values:
//!
//! ```text
//! fetch(state, key)        -> Option<value>
//! put(state, key, value)
//! delete(state, key)
//! ```
//!
//! Everything else (get with default, pop, update, take, bump, ...) is
//! derived from those three by [`crate::storage::derive`]. An adapter whose
//! engine has a faster native primitive overrides the matching method; the
//! observable behaviour must stay the same.
//!
//! ## State ownership
//!
//! The backend state (a map, a connection, a table handle) is created by
//! [`Adapter::setup`] and then owned by exactly one store runtime task. Each
//! operation borrows it mutably for the duration of the call. An operation
//! that returns an error must leave the state as it found it.
//!
//! ## Bundled adapters
//!
//! - [`MemoryAdapter`]: a `HashMap` of terms, no encoding.
//! - [`CacheAdapter`]: a byte-keyed map behind the binary codec, shaped like
//!   a network cache, with an optional entry limit.

pub mod cache;
pub mod memory;

pub use cache::{CacheAdapter, CacheOptions, CacheState};
pub use memory::{MemoryAdapter, MemoryOptions};

use crate::error::{BackendError, NoInteger, StoreError};
use crate::storage::codec::Codec;
use crate::storage::derive::{self, Fallback, MapFn, Ops, UpdateFn};
use crate::storage::ShutdownReason;
use crate::term::Term;
use std::collections::BTreeMap;

/// The representation an adapter's codec produces.
pub type Encoded<A> = <<A as Adapter>::Codec as Codec>::Encoded;

/// A storage engine binding.
///
/// Only `codec`, `setup`, `fetch`, `put` and `delete` are required.
pub trait Adapter: Sized + Send + 'static {
    /// Configuration passed to `setup`.
    type Options: Send + 'static;

    /// Backend state owned by the runtime.
    type State: Send + 'static;

    /// How terms are stored in this backend.
    type Codec: Codec;

    fn codec(&self) -> Self::Codec;

    /// Creates the backend state. An error here keeps the store from starting.
    fn setup(&self, options: Self::Options) -> Result<Self::State, BackendError>;

    /// Releases the backend state when the store shuts down.
    fn teardown(&self, reason: &ShutdownReason, state: Self::State) {
        let _ = (reason, state);
    }

    fn fetch(
        &self,
        state: &mut Self::State,
        key: &Encoded<Self>,
    ) -> Result<Option<Encoded<Self>>, BackendError>;

    fn put(
        &self,
        state: &mut Self::State,
        key: Encoded<Self>,
        value: Encoded<Self>,
    ) -> Result<(), BackendError>;

    /// Must succeed for absent keys.
    fn delete(&self, state: &mut Self::State, key: &Encoded<Self>) -> Result<(), BackendError>;

    fn is_enumerable(&self) -> bool {
        false
    }

    /// Every stored pair. Only called when `is_enumerable` returns `true`.
    fn to_enumerable(
        &self,
        state: &mut Self::State,
    ) -> Result<Vec<(Encoded<Self>, Encoded<Self>)>, StoreError> {
        let _ = state;
        Err(StoreError::EnumerationUnsupported)
    }

    // Derived operations. Override only with an equivalent native version.

    fn get(ops: &mut Ops<'_, Self>, key: Term, default: Fallback) -> Result<Term, StoreError> {
        derive::get(ops, key, default)
    }

    fn get_and_update(
        ops: &mut Ops<'_, Self>,
        key: Term,
        fun: UpdateFn,
        strict: bool,
    ) -> Result<Term, StoreError> {
        derive::get_and_update(ops, key, fun, strict)
    }

    fn pop(ops: &mut Ops<'_, Self>, key: Term, default: Fallback) -> Result<Term, StoreError> {
        derive::pop(ops, key, default)
    }

    fn put_new(ops: &mut Ops<'_, Self>, key: Term, value: Fallback) -> Result<(), StoreError> {
        derive::put_new(ops, key, value)
    }

    fn replace(
        ops: &mut Ops<'_, Self>,
        key: Term,
        value: Term,
        strict: bool,
    ) -> Result<(), StoreError> {
        derive::replace(ops, key, value, strict)
    }

    fn update(
        ops: &mut Ops<'_, Self>,
        key: Term,
        initial: Option<Term>,
        fun: MapFn,
    ) -> Result<(), StoreError> {
        derive::update(ops, key, initial, fun)
    }

    fn drop_keys(ops: &mut Ops<'_, Self>, keys: Vec<Term>) -> Result<(), StoreError> {
        derive::drop_keys(ops, keys)
    }

    fn take(ops: &mut Ops<'_, Self>, keys: Vec<Term>) -> Result<BTreeMap<Term, Term>, StoreError> {
        derive::take(ops, keys)
    }

    fn split(ops: &mut Ops<'_, Self>, keys: Vec<Term>) -> Result<BTreeMap<Term, Term>, StoreError> {
        derive::split(ops, keys)
    }

    fn bump(
        ops: &mut Ops<'_, Self>,
        key: Term,
        amount: i64,
    ) -> Result<Result<i64, NoInteger>, StoreError> {
        derive::bump(ops, key, amount)
    }
}
