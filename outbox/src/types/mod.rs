//! Common types used throughout the outbox engine.
//!
//! Re-exports the change log event model and the merged index operations that
//! are dispatched to the search backend.

mod event;
mod operation;

pub use event::*;
pub use operation::*;
