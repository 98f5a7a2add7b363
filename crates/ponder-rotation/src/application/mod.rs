//! Coordinator operations and their read views.

pub mod coordination;
pub mod coordinator;
pub mod query_handlers;
pub mod synthesis;
