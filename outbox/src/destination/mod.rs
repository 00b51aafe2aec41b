//! Search backend integrations.

pub mod base;
pub mod memory;

pub use base::SearchDestination;
