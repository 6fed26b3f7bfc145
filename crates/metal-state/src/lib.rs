//! metal-state: embedded inventory store for the allocation engine.
//!
//! Backed by [redb](https://docs.rs/redb), persists machines, networks,
//! IPs and machine liveliness.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns,
//! keyed by their natural identifier.
//!
//! Machine writes are version-checked: every record carries a `changed`
//! counter and [`StateStore::update_machine`] only replaces a record whose
//! stored counter still matches the caller's copy. redb serializes write
//! transactions, so this compare-and-swap is the only coordination between
//! concurrent allocators.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across threads and async tasks.

pub mod error;
pub mod query;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use query::MachineSearchQuery;
pub use store::StateStore;
