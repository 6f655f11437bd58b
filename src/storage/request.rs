//! The store request protocol: one variant per operation, each carrying a
//! one-shot channel for the reply.

use crate::error::{NoInteger, StoreError};
use crate::storage::derive::{Fallback, MapFn, UpdateFn};
use crate::term::Term;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::oneshot;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

pub(crate) enum Request {
    Fetch {
        key: Term,
        reply: Reply<Option<Term>>,
    },
    FetchStrict {
        key: Term,
        reply: Reply<Term>,
    },
    Put {
        key: Term,
        value: Term,
        reply: Reply<()>,
    },
    Delete {
        key: Term,
        reply: Reply<()>,
    },
    Get {
        key: Term,
        default: Fallback,
        reply: Reply<Term>,
    },
    GetAndUpdate {
        key: Term,
        fun: UpdateFn,
        strict: bool,
        reply: Reply<Term>,
    },
    Pop {
        key: Term,
        default: Fallback,
        reply: Reply<Term>,
    },
    PutNew {
        key: Term,
        value: Fallback,
        reply: Reply<()>,
    },
    Replace {
        key: Term,
        value: Term,
        strict: bool,
        reply: Reply<()>,
    },
    Update {
        key: Term,
        initial: Option<Term>,
        fun: MapFn,
        reply: Reply<()>,
    },
    Drop {
        keys: Vec<Term>,
        reply: Reply<()>,
    },
    Take {
        keys: Vec<Term>,
        reply: Reply<BTreeMap<Term, Term>>,
    },
    Split {
        keys: Vec<Term>,
        reply: Reply<BTreeMap<Term, Term>>,
    },
    Bump {
        key: Term,
        amount: i64,
        reply: Reply<Result<i64, NoInteger>>,
    },
    Expire {
        key: Term,
        ttl: Option<Duration>,
        reply: Reply<bool>,
    },
    Persist {
        key: Term,
        reply: Reply<()>,
    },
    PutAndExpire {
        key: Term,
        value: Term,
        ttl: Option<Duration>,
        reply: Reply<()>,
    },
    IsEnumerable {
        reply: Reply<bool>,
    },
    ToList {
        reply: Reply<Vec<(Term, Term)>>,
    },
    Keys {
        reply: Reply<Vec<Term>>,
    },
    Values {
        reply: Reply<Vec<Term>>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

impl Request {
    /// Operation name, for logs.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Request::Fetch { .. } => "fetch",
            Request::FetchStrict { .. } => "fetch_strict",
            Request::Put { .. } => "put",
            Request::Delete { .. } => "delete",
            Request::Get { .. } => "get",
            Request::GetAndUpdate { strict: false, .. } => "get_and_update",
            Request::GetAndUpdate { strict: true, .. } => "get_and_update_strict",
            Request::Pop { .. } => "pop",
            Request::PutNew { .. } => "put_new",
            Request::Replace { strict: false, .. } => "replace",
            Request::Replace { strict: true, .. } => "replace_strict",
            Request::Update { initial: Some(_), .. } => "update",
            Request::Update { initial: None, .. } => "update_strict",
            Request::Drop { .. } => "drop",
            Request::Take { .. } => "take",
            Request::Split { .. } => "split",
            Request::Bump { .. } => "bump",
            Request::Expire { .. } => "expire",
            Request::Persist { .. } => "persist",
            Request::PutAndExpire { .. } => "put_and_expire",
            Request::IsEnumerable { .. } => "is_enumerable",
            Request::ToList { .. } => "to_list",
            Request::Keys { .. } => "keys",
            Request::Values { .. } => "values",
            Request::Shutdown { .. } => "shutdown",
        }
    }
}
