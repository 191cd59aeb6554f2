//! Verdure infrastructure implementations
//!
//! Concrete backends for the core traits: the in-process shared memory
//! store, the SQLite lineage store, and the meridian bus.

pub mod bus;
pub mod database;
pub mod lineage_store;
pub mod shared_memory;

pub use bus::*;
pub use database::*;
pub use lineage_store::*;
pub use shared_memory::*;
