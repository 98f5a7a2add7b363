//! Rotation state derived from record flags and the window clock.

pub mod state;
