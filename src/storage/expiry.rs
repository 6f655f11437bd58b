//! Expiry Engine
//!
//! Each store with expiry enabled gets its own engine: a Tokio task that
//! keeps one timer per key and, when a timer runs out, deletes the key by
//! sending an ordinary delete request to the store.
//!
//! ## Why a separate task?
//!
//! The store task may spend a long time inside a backend call (a round trip
//! to a remote cache, say). Timer bookkeeping must not wait for that, and
//! the store must not wait for timer bookkeeping either. The two talk only
//! through channels.
//!
//! ## Design
//!
//! ```text
//!   store task ──Expire/Persist──▶ ┌──────────────────────────┐
//!                                  │ ExpiryEngine             │
//!                                  │  key    → (deadline,seq) │
//!                                  │  (deadline,seq) → key    │
//!                                  └────────────┬─────────────┘
//!                                               │ earliest deadline reached
//!                                               ▼
//!                         delete(key) via the store's request queue
//! ```
//!
//! The engine sleeps until the earliest deadline, wakes on new commands, and
//! re-arms. Cancelling a timer removes it from both maps, so a cancelled
//! timer can never fire. Expired keys are deleted through a weak handle: the
//! engine never keeps a store alive and never touches backend state itself.

use crate::error::StoreError;
use crate::storage::codec::Codec;
use crate::storage::handle::WeakStore;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

/// Configuration for a store's expiry engine.
#[derive(Debug, Clone, Default)]
pub struct ExpiryConfig {
    /// TTL applied to every write that does not name its own (None = keys
    /// live until deleted or explicitly expired)
    pub default_ttl: Option<Duration>,
}

impl ExpiryConfig {
    /// Expiry with no default TTL: only explicit `expire` calls set timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expiry where every write schedules removal after `ttl`.
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            default_ttl: Some(ttl),
        }
    }
}

enum ExpiryCommand<K> {
    /// Replace the key's timer; `None` falls back to the default TTL
    Expire { key: K, ttl: Option<Duration> },
    /// Drop the key's timer, if any
    Persist { key: K },
}

/// Handle to a running expiry engine.
///
/// Dropping the handle stops the engine and discards pending timers.
pub(crate) struct ExpiryHandle<K> {
    commands: mpsc::UnboundedSender<ExpiryCommand<K>>,
    shutdown_tx: watch::Sender<bool>,
    default_ttl: Option<Duration>,
}

impl<K> ExpiryHandle<K>
where
    K: Clone + Eq + Hash + Debug + Send + 'static,
{
    /// Spawns the engine for the store behind `store`.
    ///
    /// `codec` turns timed-out keys back into terms for the delete request.
    pub(crate) fn start<C>(store: WeakStore, codec: C, config: ExpiryConfig) -> Self
    where
        C: Codec<Encoded = K>,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        debug!(
            store = %store.name(),
            default_ttl_ms = config.default_ttl.map(|t| t.as_millis() as u64),
            "Expiry engine started"
        );

        let timers = Timers::new(config.default_ttl);
        tokio::spawn(expiry_loop(timers, command_rx, shutdown_rx, store, codec));

        Self {
            commands,
            shutdown_tx,
            default_ttl: config.default_ttl,
        }
    }

    /// Replaces the key's timer with one for `ttl` (or the default TTL).
    ///
    /// Returns whether the key now has a pending timer: `false` when
    /// neither `ttl` nor a default is set, or when the deadline lies beyond
    /// what the clock can represent (the key then never expires).
    pub(crate) fn expire(&self, key: K, ttl: Option<Duration>) -> Result<bool, StoreError> {
        let scheduled = ttl
            .or(self.default_ttl)
            .is_some_and(|ttl| Instant::now().checked_add(ttl).is_some());

        self.commands
            .send(ExpiryCommand::Expire { key, ttl })
            .map_err(|_| StoreError::ExpiryStopped)?;
        Ok(scheduled)
    }

    /// Cancels the key's timer. No-op if it has none.
    pub(crate) fn persist(&self, key: K) -> Result<(), StoreError> {
        self.commands
            .send(ExpiryCommand::Persist { key })
            .map_err(|_| StoreError::ExpiryStopped)
    }

    /// True while the engine accepts timer commands.
    pub(crate) fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }
}

impl<K> ExpiryHandle<K> {
    /// Stops the engine.
    ///
    /// This is called automatically when the handle is dropped.
    pub(crate) fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl<K> Drop for ExpiryHandle<K> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Position of a timer in the deadline queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimerHandle {
    deadline: Instant,
    /// Tie-breaker for equal deadlines
    seq: u64,
}

/// The engine's timer table. At most one live timer per key.
struct Timers<K> {
    default_ttl: Option<Duration>,
    active: HashMap<K, TimerHandle>,
    queue: BTreeMap<TimerHandle, K>,
    next_seq: u64,
}

impl<K: Clone + Eq + Hash> Timers<K> {
    fn new(default_ttl: Option<Duration>) -> Self {
        Self {
            default_ttl,
            active: HashMap::new(),
            queue: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Cancels any timer for `key`, then schedules one for `ttl` or the
    /// default. Returns `false` if neither is set, or the deadline cannot
    /// be represented, and the key is left without a timer.
    fn schedule(&mut self, key: K, ttl: Option<Duration>, now: Instant) -> bool {
        self.cancel(&key);

        let Some(ttl) = ttl.or(self.default_ttl) else {
            return false;
        };

        // A deadline past the end of the clock never comes
        let Some(deadline) = now.checked_add(ttl) else {
            return false;
        };

        let handle = TimerHandle {
            deadline,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        self.queue.insert(handle, key.clone());
        self.active.insert(key, handle);
        true
    }

    /// Returns `true` if a timer was cancelled.
    fn cancel(&mut self, key: &K) -> bool {
        match self.active.remove(key) {
            Some(handle) => {
                self.queue.remove(&handle);
                true
            }
            None => false,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|handle| handle.deadline)
    }

    /// Removes and returns every key whose deadline is at or before `now`.
    fn pop_due(&mut self, now: Instant) -> Vec<K> {
        let mut due = Vec::new();

        while let Some(entry) = self.queue.first_entry() {
            if entry.key().deadline > now {
                break;
            }
            let key = entry.remove();
            self.active.remove(&key);
            due.push(key);
        }

        due
    }

    fn len(&self) -> usize {
        self.active.len()
    }
}

/// The main engine loop.
async fn expiry_loop<C: Codec>(
    mut timers: Timers<C::Encoded>,
    mut commands: mpsc::UnboundedReceiver<ExpiryCommand<C::Encoded>>,
    mut shutdown_rx: watch::Receiver<bool>,
    store: WeakStore,
    codec: C,
) {
    loop {
        let next = timers.next_deadline();

        tokio::select! {
            command = commands.recv() => match command {
                Some(ExpiryCommand::Expire { key, ttl }) => {
                    let scheduled = timers.schedule(key, ttl, Instant::now());
                    trace!(store = %store.name(), scheduled, pending = timers.len(), "Expire");
                }
                Some(ExpiryCommand::Persist { key }) => {
                    let cancelled = timers.cancel(&key);
                    trace!(store = %store.name(), cancelled, pending = timers.len(), "Persist");
                }
                None => {
                    debug!(store = %store.name(), "Expiry engine detached");
                    return;
                }
            },
            _ = sleep_until(next.unwrap_or_else(Instant::now)), if next.is_some() => {
                let due = timers.pop_due(Instant::now());
                debug!(store = %store.name(), expired = due.len(), pending = timers.len(), "Timers fired");
                for key in due {
                    fire(&store, &codec, key);
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!(
                        store = %store.name(),
                        discarded = timers.len(),
                        "Expiry engine received shutdown signal"
                    );
                    return;
                }
            }
        }
    }
}

/// Issues the delete for a timed-out key without waiting for the store.
fn fire<C: Codec>(store: &WeakStore, codec: &C, key: C::Encoded) {
    let key = match codec.deserialize_key(&key) {
        Ok(key) => key,
        Err(e) => {
            warn!(store = %store.name(), error = %e, "Cannot decode expired key");
            return;
        }
    };

    let Some(store) = store.upgrade() else {
        trace!("Store already gone, skipping expired key");
        return;
    };

    tokio::spawn(async move {
        if let Err(e) = store.delete(key.clone()).await {
            warn!(store = %store.name(), key = %key, error = %e, "Failed to delete expired key");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::MemoryAdapter;
    use crate::config::StoreConfig;
    use crate::storage::codec::Passthrough;
    use crate::storage::derive::Ops;
    use crate::storage::Store;
    use crate::term::Term;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let now = Instant::now();
        let mut timers = Timers::new(None);

        assert!(timers.schedule("late", Some(ms(30)), now));
        assert!(timers.schedule("early", Some(ms(10)), now));
        assert_eq!(timers.next_deadline(), Some(now + ms(10)));

        assert!(timers.pop_due(now + ms(5)).is_empty());
        assert_eq!(timers.pop_due(now + ms(10)), vec!["early"]);
        assert_eq!(timers.pop_due(now + ms(100)), vec!["late"]);
        assert_eq!(timers.len(), 0);
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_timers_reschedule_replaces() {
        let now = Instant::now();
        let mut timers = Timers::new(None);

        timers.schedule("k", Some(ms(10)), now);
        timers.schedule("k", Some(ms(50)), now);

        assert_eq!(timers.len(), 1);
        assert!(timers.pop_due(now + ms(20)).is_empty());
        assert_eq!(timers.pop_due(now + ms(50)), vec!["k"]);
    }

    #[test]
    fn test_timers_cancel() {
        let now = Instant::now();
        let mut timers = Timers::new(None);

        timers.schedule("k", Some(ms(10)), now);
        assert!(timers.cancel(&"k"));
        assert!(!timers.cancel(&"k"));
        assert!(!timers.cancel(&"never"));
        assert!(timers.pop_due(now + ms(100)).is_empty());
    }

    #[test]
    fn test_timers_default_ttl() {
        let now = Instant::now();

        let mut without = Timers::new(None);
        assert!(!without.schedule("k", None, now));
        assert_eq!(without.len(), 0);

        let mut with = Timers::new(Some(ms(25)));
        assert!(with.schedule("k", None, now));
        assert_eq!(with.next_deadline(), Some(now + ms(25)));

        // An explicit ttl wins over the default
        assert!(with.schedule("k", Some(ms(5)), now));
        assert_eq!(with.next_deadline(), Some(now + ms(5)));
    }

    #[test]
    fn test_timers_unrepresentable_deadline_has_no_timer() {
        let now = Instant::now();
        let mut timers = Timers::new(None);

        timers.schedule("k", Some(ms(10)), now);
        assert!(!timers.schedule("k", Some(Duration::MAX), now));
        assert_eq!(timers.len(), 0);

        let mut defaulted = Timers::new(Some(Duration::MAX));
        assert!(!defaulted.schedule("k", None, now));
        assert_eq!(defaulted.next_deadline(), None);
    }

    #[test]
    fn test_unset_ttl_clears_existing_timer() {
        let now = Instant::now();
        let mut timers = Timers::new(None);

        timers.schedule("k", Some(ms(10)), now);
        assert!(!timers.schedule("k", None, now));
        assert_eq!(timers.len(), 0);
    }

    fn expiring_store() -> Store {
        Store::start(
            MemoryAdapter,
            Default::default(),
            StoreConfig::new().with_expiry(ExpiryConfig::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_expired_key_is_deleted() {
        let store = expiring_store();
        store.put("session", "token").await.unwrap();
        store.put("keep", 1).await.unwrap();

        assert!(store.expire("session", ms(50)).await.unwrap());

        tokio::time::sleep(ms(200)).await;

        assert_eq!(store.fetch("session").await.unwrap(), None);
        assert_eq!(store.fetch("keep").await.unwrap(), Some(Term::from(1)));
    }

    #[tokio::test]
    async fn test_persist_keeps_key() {
        let store = expiring_store();
        store.put("k", 1).await.unwrap();

        store.expire("k", ms(50)).await.unwrap();
        store.persist("k").await.unwrap();

        tokio::time::sleep(ms(200)).await;

        assert_eq!(store.fetch("k").await.unwrap(), Some(Term::from(1)));
    }

    #[tokio::test]
    async fn test_reexpire_uses_latest_ttl() {
        let store = expiring_store();
        store.put("shortened", 1).await.unwrap();
        store.put("extended", 2).await.unwrap();

        store.expire("shortened", Duration::from_secs(10)).await.unwrap();
        store.expire("shortened", ms(50)).await.unwrap();

        store.expire("extended", ms(50)).await.unwrap();
        store.expire("extended", Duration::from_secs(10)).await.unwrap();

        tokio::time::sleep(ms(200)).await;

        assert_eq!(store.fetch("shortened").await.unwrap(), None);
        assert_eq!(store.fetch("extended").await.unwrap(), Some(Term::from(2)));
    }

    #[tokio::test]
    async fn test_expire_on_absent_key_creates_no_timer() {
        let store = expiring_store();

        assert!(!store.expire("a", ms(50)).await.unwrap());

        // Written after the expire: no timer may remove it
        store.put("a", 1).await.unwrap();
        tokio::time::sleep(ms(200)).await;

        assert_eq!(store.fetch("a").await.unwrap(), Some(Term::from(1)));
    }

    #[tokio::test]
    async fn test_overwrite_cancels_timer() {
        let store = expiring_store();
        store.put("k", 1).await.unwrap();
        store.expire("k", ms(50)).await.unwrap();

        store.put("k", 2).await.unwrap();
        tokio::time::sleep(ms(200)).await;

        assert_eq!(store.fetch("k").await.unwrap(), Some(Term::from(2)));
    }

    #[tokio::test]
    async fn test_default_ttl_applies_to_writes() {
        let store = Store::start(
            MemoryAdapter,
            Default::default(),
            StoreConfig::new()
                .with_expiry(ExpiryConfig::with_default_ttl(ms(50)))
                .with_seed([("seeded", 0)]),
        )
        .unwrap();

        store.put("written", 1).await.unwrap();
        store.update("updated", 5, |v| v).await.unwrap();
        store.put_and_expire("pinned", 3, Duration::from_secs(10)).await.unwrap();

        tokio::time::sleep(ms(200)).await;

        assert_eq!(store.fetch("seeded").await.unwrap(), None);
        assert_eq!(store.fetch("written").await.unwrap(), None);
        assert_eq!(store.fetch("updated").await.unwrap(), None);
        assert_eq!(store.fetch("pinned").await.unwrap(), Some(Term::from(3)));
    }

    #[tokio::test]
    async fn test_huge_ttl_leaves_engine_running() {
        let store = expiring_store();
        store.put("forever", 1).await.unwrap();
        store.put("short", 1).await.unwrap();

        // Past the end of the clock: the key simply never expires
        assert!(!store.expire("forever", Duration::MAX).await.unwrap());
        assert!(store.expire("short", ms(20)).await.unwrap());

        tokio::time::sleep(ms(200)).await;

        assert_eq!(store.fetch("forever").await.unwrap(), Some(Term::from(1)));
        assert_eq!(store.fetch("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_huge_default_ttl_leaves_engine_running() {
        let store = Store::start(
            MemoryAdapter,
            Default::default(),
            StoreConfig::new().with_expiry(ExpiryConfig::with_default_ttl(Duration::MAX)),
        )
        .unwrap();

        store.put("kept", 1).await.unwrap();
        store.put("short", 1).await.unwrap();
        assert!(store.expire("short", ms(20)).await.unwrap());

        tokio::time::sleep(ms(200)).await;

        assert_eq!(store.fetch("kept").await.unwrap(), Some(Term::from(1)));
        assert_eq!(store.fetch("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expire_without_any_ttl_reports_no_timer() {
        let store = expiring_store();
        store.put("k", 1).await.unwrap();

        assert!(store.expire("k", ms(20)).await.unwrap());
        assert!(!store.expire("k", None::<Duration>).await.unwrap());

        tokio::time::sleep(ms(100)).await;
        assert_eq!(store.fetch("k").await.unwrap(), Some(Term::from(1)));
    }

    #[tokio::test]
    async fn test_stopped_engine_rejects_commands_and_never_fires() {
        let store = Store::start(MemoryAdapter, Default::default(), StoreConfig::new()).unwrap();
        store.put("k", 1).await.unwrap();

        let engine = ExpiryHandle::start(store.downgrade(), Passthrough, ExpiryConfig::new());
        assert!(engine.expire(Term::from("k"), Some(ms(30))).unwrap());
        tokio::time::sleep(ms(5)).await;

        engine.stop();
        tokio::time::sleep(ms(100)).await;

        // The pending timer went away with the engine
        assert_eq!(store.fetch("k").await.unwrap(), Some(Term::from(1)));
        assert!(!engine.is_running());
        assert!(matches!(
            engine.expire(Term::from("k"), Some(ms(30))),
            Err(StoreError::ExpiryStopped)
        ));
        assert!(matches!(
            engine.persist(Term::from("k")),
            Err(StoreError::ExpiryStopped)
        ));

        // Store operations report it instead of claiming success
        let mut state = HashMap::from([(Term::from("k"), Term::from(1))]);
        let mut ops = Ops::new(&MemoryAdapter, &Passthrough, &mut state, Some(&engine));
        assert!(matches!(
            ops.expire(&"k".into(), Some(ms(10))),
            Err(StoreError::ExpiryStopped)
        ));
        assert!(matches!(ops.persist(&"k".into()), Err(StoreError::ExpiryStopped)));
        assert!(matches!(
            ops.put(&"j".into(), &Term::from(2)),
            Err(StoreError::ExpiryStopped)
        ));
        ops.delete(&"k".into()).unwrap();

        assert!(state.is_empty());
    }
}
