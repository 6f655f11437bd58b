//! Storage Module
//!
//! This module runs stores. Each store is a single tokio task that owns the
//! backend state of one adapter and applies requests to it one at a time.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────┐   requests    ┌───────────────────────────────────────┐
//!  │  Store   │ ────────────▶ │             Store Runtime             │
//!  │ (handle) │ ◀──────────── │  ┌──────────────┐   ┌──────────────┐  │
//!  └──────────┘    replies    │  │ Derived ops  │──▶│    Codec     │  │
//!        ▲                    │  └──────────────┘   └──────┬───────┘  │
//!        │ delete             │                            ▼          │
//!        │ (weak handle)      │                     ┌──────────────┐  │
//!  ┌─────┴──────────┐ timers  │                     │   Adapter    │  │
//!  │ Expiry Engine  │ ◀────── │                     │ (state owner)│  │
//!  │ (tokio task)   │         │                     └──────────────┘  │
//!  └────────────────┘         └───────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Serialized access**: one request at a time per store, no locks
//! - **Derived operations**: get, pop, update, take, bump and friends built
//!   from fetch/put/delete unless the adapter provides its own
//! - **Pluggable encoding**: terms pass through as-is or are encoded to
//!   bytes (optionally compressed) before reaching the backend
//! - **TTL support**: per-key timers with a store-wide default
//!
//! ## Example
//!
//! ```
//! use kvstore::adapter::MemoryAdapter;
//! use kvstore::config::StoreConfig;
//! use kvstore::storage::{ExpiryConfig, Store};
//! use kvstore::Term;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), kvstore::StoreError> {
//! let config = StoreConfig::named("sessions").with_expiry(ExpiryConfig::new());
//! let store = Store::start(MemoryAdapter, Default::default(), config)?;
//!
//! store.put("name", "Ariz").await?;
//! assert_eq!(store.fetch("name").await?, Some(Term::from("Ariz")));
//!
//! store.put("visits", 1).await?;
//! assert_eq!(store.increment("visits", 2).await?, Ok(3));
//!
//! store.put_and_expire("session", "token123", Duration::from_secs(3600)).await?;
//! store.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod derive;
pub mod expiry;
mod handle;
mod request;
mod runtime;

// Re-export commonly used types
pub use codec::{Binary, Codec, Passthrough};
pub use derive::{Fallback, GetAndUpdate, Ops};
pub use expiry::ExpiryConfig;
pub use handle::{Store, WeakStore};
pub use runtime::ShutdownReason;
