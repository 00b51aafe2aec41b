//! Search backend contract.

use std::future::Future;

use crate::error::OutboxResult;
use crate::types::IndexOperation;

/// Trait for search backends that receive merged index operations.
///
/// Implementations must be idempotent: the engine guarantees that every change
/// is processed eventually and exactly once at the coordination level, but a
/// node killed between dispatch and commit redelivers the same operations on
/// its next run. Applying an [`IndexOperation::AddOrUpdate`] twice, or deleting
/// a document that is already absent, must not corrupt index state.
///
/// Mapping entities to document fields is the implementation's concern; the
/// engine only hands over entity identities and final routing information.
pub trait SearchDestination {
    /// Returns the name of the destination, used in logs and metrics labels.
    fn name() -> &'static str;

    /// Applies one merged operation to the search index.
    ///
    /// A failure here is treated as transient and retried under the pipeline's
    /// retry policy; the error is surfaced through the failure handler on every
    /// attempt.
    fn apply(&self, operation: &IndexOperation)
    -> impl Future<Output = OutboxResult<()>> + Send;
}
