//! The twelve layer agents (Q1-Q4 x P0/P1/P2) and their registry

pub mod judgment;
pub mod perception;
pub mod registry;
pub mod relationship;
pub mod traits;

pub use judgment::*;
pub use perception::*;
pub use registry::*;
pub use relationship::*;
pub use traits::*;
