//! Shared test mocks and utilities for the Ponder rotation engine.

mod clock;
mod generator;
mod repository;
mod rng;

pub use clock::{FixedClock, ManualClock};
pub use generator::{FailingGenerator, ScriptedGenerator, SlowGenerator};
pub use repository::{FailingItemRepository, InMemoryItemRepository, WriteFailingItemRepository};
pub use rng::{MockRng, SequenceRng};
