//! Fetch, merge, and dispatch of pending change log events.

pub mod merge;
pub mod retry;
pub mod worker;
