//! In-memory implementation of the scheduling repository contract.

mod fixture;
mod memory;

pub use fixture::{Fixture, FixtureError};
pub use memory::MemoryStore;
