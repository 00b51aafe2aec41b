//! Shared helpers for tests.

pub mod destination;
pub mod event;
pub mod failure;
pub mod pipeline;
