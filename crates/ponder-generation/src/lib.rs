//! Ponder candidate generation.
//!
//! Builds prompts from a fixed style/topic catalogue, talks to an
//! OpenAI-compatible completion endpoint, normalizes what comes back, and
//! supplies the fallback pool used whenever generation cannot.

pub mod candidate;
pub mod fallback;
pub mod openai;
pub mod prompt;
