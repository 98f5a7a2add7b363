//! Ponder core: shared domain abstractions.
//!
//! This crate defines the item record model, the history store contract,
//! the candidate generator contract, the window clock, and the clock/RNG
//! seams that every other crate depends on. It contains no infrastructure
//! code.

pub mod clock;
pub mod error;
pub mod generation;
pub mod item;
pub mod repository;
pub mod rng;
pub mod window;
