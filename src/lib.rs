//! # kvstore - Process-Isolated Key-Value Stores
//!
//! kvstore runs key-value stores as independent tokio tasks. Each store owns
//! the state of one backend adapter and applies requests to it strictly one
//! at a time, so adapters never deal with concurrent access.
//!
//! ## Features
//!
//! - **Pluggable Backends**: An adapter implements fetch, put and delete;
//!   every richer operation is derived from those three
//! - **Native Overrides**: Adapters may replace any derived operation with a
//!   faster one without changing its observable behaviour
//! - **Serialization**: Keys and values pass through as terms or are encoded
//!   to bytes (with optional compression) before reaching the backend
//! - **TTL Support**: Per-key timers with cancellation and a default TTL
//! - **Failure Isolation**: A failing backend call or a panicking callback
//!   fails only its own request
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               kvstore                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌───────────────────────────┐    │
//! │  │  Registry   │───>│   Store     │───>│      Store Runtime        │    │
//! │  │ (name map)  │    │  (handle)   │    │    (one tokio task)       │    │
//! │  └─────────────┘    └─────────────┘    │                           │    │
//! │                            ▲           │  Derived ops ──> Codec    │    │
//! │                            │           │                   │       │    │
//! │                            │ delete    │                   ▼       │    │
//! │                     ┌──────┴──────┐    │               Adapter     │    │
//! │                     │   Expiry    │<───│            (state owner)  │    │
//! │                     │   Engine    │    └───────────────────────────┘    │
//! │                     └─────────────┘                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use kvstore::adapter::MemoryAdapter;
//! use kvstore::config::StoreConfig;
//! use kvstore::{Store, Term};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), kvstore::StoreError> {
//! let store = Store::start(MemoryAdapter, Default::default(), StoreConfig::new())?;
//!
//! store.put("a", 1).await?;
//! store.put("b", 2).await?;
//!
//! let taken = store.take(["a", "c"]).await?;
//! assert_eq!(taken.get(&Term::from("a")), Some(&Term::from(1)));
//! assert_eq!(taken.len(), 1);
//!
//! assert_eq!(store.pop("b", Term::Nil).await?, Term::from(2));
//! assert_eq!(store.fetch("b").await?, None);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`adapter`]: The backend contract and the bundled backends
//! - [`storage`]: Store runtime, derived operations, codecs and expiry
//! - [`registry`]: Name-based lookup of running stores
//! - [`commands`]: Text command interpreter used by the shell
//! - [`config`]: Per-store runtime options
//!
//! ## Design Highlights
//!
//! ### One Owner Per Store
//!
//! The backend state lives inside the store task and nowhere else. Clients
//! hold channel senders, so there are no locks around the data and every
//! operation, including multi-step derived ones, is atomic with respect to
//! other requests to the same store.
//!
//! ### Derived Operations
//!
//! `get`, `pop`, `update`, `take`, `split`, `bump` and the rest are built
//! from fetch/put/delete. Errors abort the remaining steps and are returned
//! unchanged; steps already applied are kept.
//!
//! ### Expiry
//!
//! Each store with expiry enabled gets a timer task. It holds only a weak
//! handle to the store, and deletes expired keys through the ordinary
//! request queue.

pub mod adapter;
pub mod commands;
pub mod config;
pub mod error;
pub mod registry;
pub mod storage;
pub mod term;

// Re-export commonly used types for convenience
pub use adapter::Adapter;
pub use commands::CommandHandler;
pub use config::StoreConfig;
pub use error::{BackendError, CodecError, NoInteger, StoreError};
pub use registry::Registry;
pub use storage::{ExpiryConfig, GetAndUpdate, ShutdownReason, Store};
pub use term::Term;

/// Version of kvstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
