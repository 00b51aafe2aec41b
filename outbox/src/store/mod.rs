//! Change log storage.
//!
//! The [`base::OutboxStore`] trait defines the durable change log contract;
//! [`memory::MemoryStore`] backs tests and development, and
//! [`postgres::PostgresStore`] backs production deployments. The
//! [`filter`] module holds the composable finder predicates shared by both.

pub mod base;
pub mod filter;
pub mod memory;
pub mod postgres;
