//! Rack-spread placement for bare-metal allocation.
//!
//! Pure functions over machine snapshots. Nothing here reads the store;
//! callers hand in the candidates and the project's current machines and
//! get back the subset that keeps the project spread evenly over racks.
//!
//! # Components
//!
//! - **`grouping`** Rack and tag groupings of machine sets
//! - **`spread`** Rack election and the spread decision
//! - **`pick`** Random tie-break among equally eligible machines

pub mod grouping;
pub mod pick;
pub mod spread;

pub use grouping::GroupedMachines;
pub use pick::pick;
pub use spread::{elect_racks, spread_across_racks};
