//! metal-allocator: bare-metal machine allocation engine.
//!
//! Turns an allocation request into a claimed machine and a network
//! attachment plan:
//!
//! - Candidate selection over the inventory and liveliness records
//! - Rack-spread placement (see `metal-placement`)
//! - Optimistic claim, finalization and release of machines
//! - Structural validation and network classification of requests
//!
//! # Architecture
//!
//! ```text
//! Allocator
//!   ├── select_and_claim
//!   │     ├── find_candidates      (search + liveliness, read-only)
//!   │     ├── spread_across_racks  (pure)
//!   │     ├── pick                 (injected CSPRNG)
//!   │     └── claim                (compare-and-swap on `changed`)
//!   └── validate_and_classify
//!         ├── validate_allocation_spec
//!         └── gather_networks      (network + IP lookups, read-only)
//! ```
//!
//! The engine never retries. A lost claim race returns
//! [`AllocationError::ConcurrentModification`] and the caller decides.

pub mod allocator;
pub mod candidates;
pub mod claim;
pub mod classify;
pub mod error;
pub mod request;
pub mod ssh;
pub mod validate;

pub use allocator::Allocator;
pub use candidates::find_candidates;
pub use classify::{AllocationNetwork, AllocationNetworkMap, gather_networks};
pub use error::{AllocationError, AllocationResult, ErrorCategory};
pub use request::{AllocationNetworkRequest, AllocationSpec};
pub use validate::validate_allocation_spec;
