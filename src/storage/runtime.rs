//! Store Runtime
//!
//! The task that owns one store. It holds the adapter, the codec, the
//! backend state and (optionally) the expiry engine handle, and drains its
//! request queue one request at a time:
//!
//! ```text
//!   Store handles ──▶ [ request queue ] ──▶ Runtime task
//!                                              │
//!                             ┌────────────────┴───────────────┐
//!                             │ Ops (serialize, notify expiry) │
//!                             └────────────────┬───────────────┘
//!                                              ▼
//!                                    Adapter (fetch/put/delete
//!                                     or a native override)
//! ```
//!
//! ## Lifecycle
//!
//! 1. `start`: adapter setup, expiry engine, seed entries. Any failure here
//!    is returned to the caller and no task is spawned.
//! 2. Ready: requests are handled strictly in arrival order. An operation
//!    error is sent back to the requester; the task keeps going. A panic in
//!    a caller-supplied function drops that one reply and nothing else.
//! 3. Shutdown (explicit request, or every handle dropped): the expiry
//!    engine is stopped, the adapter tears the state down, the task exits.

use crate::adapter::{Adapter, Encoded};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::storage::derive::Ops;
use crate::storage::expiry::ExpiryHandle;
use crate::storage::handle::Store;
use crate::storage::request::{Reply, Request};
use crate::term::Term;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

/// Source of names for stores started without one.
static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Why a store stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// `Store::shutdown` was called
    Requested,
    /// Every client handle was dropped
    HandlesDropped,
    /// Seeding failed during start
    InitFailed,
}

enum Flow {
    Continue,
    Stop(Reply<()>),
}

struct Runtime<A: Adapter> {
    name: Arc<str>,
    adapter: A,
    codec: A::Codec,
    state: A::State,
    expiry: Option<ExpiryHandle<Encoded<A>>>,
}

/// Brings a store up and returns the first handle to it.
pub(crate) fn start<A: Adapter>(
    adapter: A,
    options: A::Options,
    config: StoreConfig,
) -> Result<Store, StoreError> {
    let name: Arc<str> = match config.name {
        Some(name) => name.into(),
        None => format!("store-{}", NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed)).into(),
    };

    let state = adapter.setup(options).map_err(|e| {
        error!(store = %name, error = %e, "Adapter setup failed");
        StoreError::Init(e.to_string())
    })?;

    let (tx, rx) = mpsc::unbounded_channel();
    let store = Store::new(Arc::clone(&name), tx, config.call_timeout);

    let codec = adapter.codec();
    let expiry = config
        .expiry
        .map(|cfg| ExpiryHandle::start(store.downgrade(), codec.clone(), cfg));

    let mut runtime = Runtime {
        name,
        adapter,
        codec,
        state,
        expiry,
    };

    if let Err(e) = runtime.seed(config.seed) {
        error!(store = %runtime.name, error = %e, "Seeding failed");
        runtime.terminate(ShutdownReason::InitFailed);
        return Err(StoreError::Init(e.to_string()));
    }

    tokio::spawn(runtime.run(rx));
    Ok(store)
}

impl<A: Adapter> Runtime<A> {
    fn ops(&mut self) -> Ops<'_, A> {
        Ops::new(&self.adapter, &self.codec, &mut self.state, self.expiry.as_ref())
    }

    fn seed(&mut self, entries: Vec<(Term, Term)>) -> Result<(), StoreError> {
        let mut ops = self.ops();
        for (key, value) in &entries {
            ops.put(key, value)?;
        }

        if !entries.is_empty() {
            debug!(store = %self.name, count = entries.len(), "Seeded initial entries");
        }
        Ok(())
    }

    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        info!(store = %self.name, "Store ready");

        let (reason, ack) = loop {
            let Some(request) = requests.recv().await else {
                break (ShutdownReason::HandlesDropped, None);
            };

            if let Flow::Stop(ack) = self.dispatch(request) {
                break (ShutdownReason::Requested, Some(ack));
            }
        };

        // Anything still queued is answered with `Closed` when dropped
        requests.close();
        self.terminate(reason);

        if let Some(ack) = ack {
            let _ = ack.send(Ok(()));
        }
    }

    /// Handles one request, isolating panics raised by caller functions.
    fn dispatch(&mut self, request: Request) -> Flow {
        let op = request.name();
        trace!(store = %self.name, op, "Processing request");

        match panic::catch_unwind(AssertUnwindSafe(|| self.handle(request))) {
            Ok(flow) => flow,
            Err(_) => {
                error!(store = %self.name, op, "Request panicked, reply dropped");
                Flow::Continue
            }
        }
    }

    fn handle(&mut self, request: Request) -> Flow {
        match request {
            Request::Fetch { key, reply } => respond(reply, self.ops().fetch(&key)),
            Request::FetchStrict { key, reply } => {
                let result = self
                    .ops()
                    .fetch(&key)
                    .and_then(|found| found.ok_or(StoreError::KeyNotFound(key)));
                respond(reply, result)
            }
            Request::Put { key, value, reply } => respond(reply, self.ops().put(&key, &value)),
            Request::Delete { key, reply } => respond(reply, self.ops().delete(&key)),
            Request::Get {
                key,
                default,
                reply,
            } => respond(reply, A::get(&mut self.ops(), key, default)),
            Request::GetAndUpdate {
                key,
                fun,
                strict,
                reply,
            } => respond(reply, A::get_and_update(&mut self.ops(), key, fun, strict)),
            Request::Pop {
                key,
                default,
                reply,
            } => respond(reply, A::pop(&mut self.ops(), key, default)),
            Request::PutNew { key, value, reply } => {
                respond(reply, A::put_new(&mut self.ops(), key, value))
            }
            Request::Replace {
                key,
                value,
                strict,
                reply,
            } => respond(reply, A::replace(&mut self.ops(), key, value, strict)),
            Request::Update {
                key,
                initial,
                fun,
                reply,
            } => respond(reply, A::update(&mut self.ops(), key, initial, fun)),
            Request::Drop { keys, reply } => respond(reply, A::drop_keys(&mut self.ops(), keys)),
            Request::Take { keys, reply } => respond(reply, A::take(&mut self.ops(), keys)),
            Request::Split { keys, reply } => respond(reply, A::split(&mut self.ops(), keys)),
            Request::Bump { key, amount, reply } => {
                respond(reply, A::bump(&mut self.ops(), key, amount))
            }
            Request::Expire { key, ttl, reply } => respond(reply, self.ops().expire(&key, ttl)),
            Request::Persist { key, reply } => respond(reply, self.ops().persist(&key)),
            Request::PutAndExpire {
                key,
                value,
                ttl,
                reply,
            } => {
                let mut ops = self.ops();
                let result = ops
                    .require_expiry()
                    .and_then(|()| ops.put_expiring(&key, &value, ttl));
                respond(reply, result)
            }
            Request::IsEnumerable { reply } => respond(reply, Ok(self.adapter.is_enumerable())),
            Request::ToList { reply } => respond(reply, self.ops().entries()),
            Request::Keys { reply } => {
                let result = self
                    .ops()
                    .entries()
                    .map(|entries| entries.into_iter().map(|(k, _)| k).collect());
                respond(reply, result)
            }
            Request::Values { reply } => {
                let result = self
                    .ops()
                    .entries()
                    .map(|entries| entries.into_iter().map(|(_, v)| v).collect());
                respond(reply, result)
            }
            Request::Shutdown { reply } => return Flow::Stop(reply),
        }

        Flow::Continue
    }

    fn terminate(self, reason: ShutdownReason) {
        let Runtime {
            name,
            adapter,
            state,
            expiry,
            ..
        } = self;

        drop(expiry);
        adapter.teardown(&reason, state);
        info!(store = %name, ?reason, "Store terminated");
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T, StoreError>) {
    if let Err(e) = &result {
        debug!(error = %e, "Request failed");
    }

    if reply.send(result).is_err() {
        trace!("Requester stopped waiting before the reply");
    }
}
