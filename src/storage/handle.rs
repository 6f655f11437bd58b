//! Client handle to a running store.
//!
//! [`Store`] is a cheap, cloneable sender. Every method enqueues one request
//! and waits for its reply, so calls from one handle are applied in the
//! order they were made.

use crate::adapter::Adapter;
use crate::config::StoreConfig;
use crate::error::{NoInteger, StoreError};
use crate::storage::derive::{Fallback, GetAndUpdate};
use crate::storage::request::{Reply, Request};
use crate::storage::runtime;
use crate::term::Term;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Handle to a store runtime.
///
/// The runtime stops once [`Store::shutdown`] is called or every handle
/// has been dropped.
#[derive(Clone)]
pub struct Store {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<Request>,
    call_timeout: Option<Duration>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Store {
    /// Sets up the backend and spawns the store task.
    ///
    /// Must be called from within a tokio runtime. Adapter setup and seeding
    /// run before this returns; a failure in either is reported as
    /// [`StoreError::Init`] and nothing is left running.
    pub fn start<A: Adapter>(
        adapter: A,
        options: A::Options,
        config: StoreConfig,
    ) -> Result<Store, StoreError> {
        runtime::start(adapter, options, config)
    }

    pub(crate) fn new(
        name: Arc<str>,
        tx: mpsc::UnboundedSender<Request>,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            name,
            tx,
            call_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the store task has stopped accepting requests.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// A handle that does not keep the store alive.
    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            name: Arc::clone(&self.name),
            tx: self.tx.downgrade(),
            call_timeout: self.call_timeout,
        }
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Request) -> Result<T, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| StoreError::Closed)?;

        let outcome = match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| StoreError::Timeout(limit))?,
            None => rx.await,
        };

        match outcome {
            Ok(result) => result,
            Err(_) if self.tx.is_closed() => Err(StoreError::Closed),
            Err(_) => Err(StoreError::Aborted),
        }
    }

    // ---- Mandatory operations ----

    pub async fn fetch(&self, key: impl Into<Term>) -> Result<Option<Term>, StoreError> {
        let key = key.into();
        self.call(|reply| Request::Fetch { key, reply }).await
    }

    /// Like [`fetch`](Self::fetch), but an absent key is `KeyNotFound`.
    pub async fn fetch_strict(&self, key: impl Into<Term>) -> Result<Term, StoreError> {
        let key = key.into();
        self.call(|reply| Request::FetchStrict { key, reply }).await
    }

    pub async fn put(&self, key: impl Into<Term>, value: impl Into<Term>) -> Result<(), StoreError> {
        let (key, value) = (key.into(), value.into());
        self.call(|reply| Request::Put { key, value, reply }).await
    }

    pub async fn delete(&self, key: impl Into<Term>) -> Result<(), StoreError> {
        let key = key.into();
        self.call(|reply| Request::Delete { key, reply }).await
    }

    // ---- Derived operations ----

    pub async fn get(&self, key: impl Into<Term>, default: impl Into<Term>) -> Result<Term, StoreError> {
        let (key, default) = (key.into(), Fallback::Value(default.into()));
        self.call(|reply| Request::Get { key, default, reply }).await
    }

    /// `default` only runs when the key is absent.
    pub async fn get_lazy<F>(&self, key: impl Into<Term>, default: F) -> Result<Term, StoreError>
    where
        F: FnOnce() -> Term + Send + 'static,
    {
        let (key, default) = (key.into(), Fallback::Lazy(Box::new(default)));
        self.call(|reply| Request::Get { key, default, reply }).await
    }

    /// Reads and rewrites a key in one step.
    ///
    /// `fun` sees the current value (`None` when absent) and either returns
    /// the reply plus the new value, or [`GetAndUpdate::Pop`] to delete the
    /// key and reply with its previous value.
    pub async fn get_and_update<F>(&self, key: impl Into<Term>, fun: F) -> Result<Term, StoreError>
    where
        F: FnOnce(Option<Term>) -> GetAndUpdate + Send + 'static,
    {
        let key = key.into();
        self.call(|reply| Request::GetAndUpdate {
            key,
            fun: Box::new(fun),
            strict: false,
            reply,
        })
        .await
    }

    /// Fails with `KeyNotFound` without calling `fun` when the key is absent.
    pub async fn get_and_update_strict<F>(
        &self,
        key: impl Into<Term>,
        fun: F,
    ) -> Result<Term, StoreError>
    where
        F: FnOnce(Term) -> GetAndUpdate + Send + 'static,
    {
        let key = key.into();
        self.call(|reply| Request::GetAndUpdate {
            key,
            fun: Box::new(move |current: Option<Term>| fun(current.unwrap_or_default())),
            strict: true,
            reply,
        })
        .await
    }

    /// Removes the key and returns its value, or `default` when absent.
    pub async fn pop(&self, key: impl Into<Term>, default: impl Into<Term>) -> Result<Term, StoreError> {
        let (key, default) = (key.into(), Fallback::Value(default.into()));
        self.call(|reply| Request::Pop { key, default, reply }).await
    }

    pub async fn pop_lazy<F>(&self, key: impl Into<Term>, default: F) -> Result<Term, StoreError>
    where
        F: FnOnce() -> Term + Send + 'static,
    {
        let (key, default) = (key.into(), Fallback::Lazy(Box::new(default)));
        self.call(|reply| Request::Pop { key, default, reply }).await
    }

    /// Stores `value` only if the key is absent.
    pub async fn put_new(&self, key: impl Into<Term>, value: impl Into<Term>) -> Result<(), StoreError> {
        let (key, value) = (key.into(), Fallback::Value(value.into()));
        self.call(|reply| Request::PutNew { key, value, reply }).await
    }

    pub async fn put_new_lazy<F>(&self, key: impl Into<Term>, value: F) -> Result<(), StoreError>
    where
        F: FnOnce() -> Term + Send + 'static,
    {
        let (key, value) = (key.into(), Fallback::Lazy(Box::new(value)));
        self.call(|reply| Request::PutNew { key, value, reply }).await
    }

    /// Overwrites the key only if it is present.
    pub async fn replace(&self, key: impl Into<Term>, value: impl Into<Term>) -> Result<(), StoreError> {
        let (key, value) = (key.into(), value.into());
        self.call(|reply| Request::Replace {
            key,
            value,
            strict: false,
            reply,
        })
        .await
    }

    pub async fn replace_strict(
        &self,
        key: impl Into<Term>,
        value: impl Into<Term>,
    ) -> Result<(), StoreError> {
        let (key, value) = (key.into(), value.into());
        self.call(|reply| Request::Replace {
            key,
            value,
            strict: true,
            reply,
        })
        .await
    }

    /// Applies `fun` to the current value, or stores `initial` when absent.
    pub async fn update<F>(
        &self,
        key: impl Into<Term>,
        initial: impl Into<Term>,
        fun: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(Term) -> Term + Send + 'static,
    {
        let (key, initial) = (key.into(), Some(initial.into()));
        self.call(|reply| Request::Update {
            key,
            initial,
            fun: Box::new(fun),
            reply,
        })
        .await
    }

    pub async fn update_strict<F>(&self, key: impl Into<Term>, fun: F) -> Result<(), StoreError>
    where
        F: FnOnce(Term) -> Term + Send + 'static,
    {
        let key = key.into();
        self.call(|reply| Request::Update {
            key,
            initial: None,
            fun: Box::new(fun),
            reply,
        })
        .await
    }

    /// Deletes each key in order. Keys deleted before a failure stay deleted.
    pub async fn drop_keys<I>(&self, keys: I) -> Result<(), StoreError>
    where
        I: IntoIterator,
        I::Item: Into<Term>,
    {
        let keys = collect_keys(keys);
        self.call(|reply| Request::Drop { keys, reply }).await
    }

    /// The present keys among `keys`, with their values.
    pub async fn take<I>(&self, keys: I) -> Result<BTreeMap<Term, Term>, StoreError>
    where
        I: IntoIterator,
        I::Item: Into<Term>,
    {
        let keys = collect_keys(keys);
        self.call(|reply| Request::Take { keys, reply }).await
    }

    /// Like [`take`](Self::take), and deletes what it found.
    pub async fn split<I>(&self, keys: I) -> Result<BTreeMap<Term, Term>, StoreError>
    where
        I: IntoIterator,
        I::Item: Into<Term>,
    {
        let keys = collect_keys(keys);
        self.call(|reply| Request::Split { keys, reply }).await
    }

    /// Adds `amount` to an integer value, treating an absent key as 0.
    ///
    /// A non-integer value is reported as [`NoInteger`] and left as it is.
    pub async fn bump(
        &self,
        key: impl Into<Term>,
        amount: i64,
    ) -> Result<Result<i64, NoInteger>, StoreError> {
        let key = key.into();
        self.call(|reply| Request::Bump { key, amount, reply }).await
    }

    /// Like [`bump`](Self::bump), but a non-integer value is an
    /// `Arithmetic` error.
    pub async fn bump_strict(&self, key: impl Into<Term>, amount: i64) -> Result<i64, StoreError> {
        self.bump(key, amount).await?.map_err(|e| {
            StoreError::Arithmetic(format!("value at {} is not an integer", e.key))
        })
    }

    pub async fn increment(
        &self,
        key: impl Into<Term>,
        by: i64,
    ) -> Result<Result<i64, NoInteger>, StoreError> {
        self.bump(key, by).await
    }

    pub async fn decrement(
        &self,
        key: impl Into<Term>,
        by: i64,
    ) -> Result<Result<i64, NoInteger>, StoreError> {
        let amount = by
            .checked_neg()
            .ok_or_else(|| StoreError::Arithmetic(format!("cannot decrement by {}", by)))?;
        self.bump(key, amount).await
    }

    // ---- Expiry ----

    /// Schedules the key for deletion after `ttl`, or after the store's
    /// default TTL when `ttl` is `None`.
    ///
    /// Returns `false`, and schedules nothing, when the key is absent.
    pub async fn expire(
        &self,
        key: impl Into<Term>,
        ttl: impl Into<Option<Duration>>,
    ) -> Result<bool, StoreError> {
        let (key, ttl) = (key.into(), ttl.into());
        self.call(|reply| Request::Expire { key, ttl, reply }).await
    }

    /// Cancels the key's pending deletion, if any.
    pub async fn persist(&self, key: impl Into<Term>) -> Result<(), StoreError> {
        let key = key.into();
        self.call(|reply| Request::Persist { key, reply }).await
    }

    pub async fn put_and_expire(
        &self,
        key: impl Into<Term>,
        value: impl Into<Term>,
        ttl: impl Into<Option<Duration>>,
    ) -> Result<(), StoreError> {
        let (key, value, ttl) = (key.into(), value.into(), ttl.into());
        self.call(|reply| Request::PutAndExpire {
            key,
            value,
            ttl,
            reply,
        })
        .await
    }

    // ---- Enumeration ----

    pub async fn is_enumerable(&self) -> Result<bool, StoreError> {
        self.call(|reply| Request::IsEnumerable { reply }).await
    }

    /// All entries ordered by key.
    pub async fn to_list(&self) -> Result<Vec<(Term, Term)>, StoreError> {
        self.call(|reply| Request::ToList { reply }).await
    }

    pub async fn keys(&self) -> Result<Vec<Term>, StoreError> {
        self.call(|reply| Request::Keys { reply }).await
    }

    pub async fn values(&self) -> Result<Vec<Term>, StoreError> {
        self.call(|reply| Request::Values { reply }).await
    }

    // ---- Lifecycle ----

    /// Stops the store and waits for the adapter teardown to finish.
    ///
    /// Requests queued behind the shutdown fail with `Closed`.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.call(|reply| Request::Shutdown { reply }).await
    }
}

fn collect_keys<I>(keys: I) -> Vec<Term>
where
    I: IntoIterator,
    I::Item: Into<Term>,
{
    keys.into_iter().map(Into::into).collect()
}

/// Non-owning handle to a store, see [`Store::downgrade`].
#[derive(Clone)]
pub struct WeakStore {
    name: Arc<str>,
    tx: mpsc::WeakUnboundedSender<Request>,
    call_timeout: Option<Duration>,
}

impl WeakStore {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A full handle, or `None` once every `Store` has been dropped.
    pub fn upgrade(&self) -> Option<Store> {
        self.tx
            .upgrade()
            .map(|tx| Store::new(Arc::clone(&self.name), tx, self.call_timeout))
    }
}

impl fmt::Debug for WeakStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStore").field("name", &self.name).finish()
    }
}
