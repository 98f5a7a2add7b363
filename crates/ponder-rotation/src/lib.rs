//! Ponder rotation and coordination of the shared question.
//!
//! Decides, from any number of concurrent and stateless callers, which item
//! is current for the present window, stages the next item ahead of the
//! boundary, and performs the handover once per boundary.

pub mod application;
pub mod domain;
