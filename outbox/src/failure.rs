//! Failure reporting for dispatch errors.
//!
//! Transient and terminal dispatch failures never escalate out of the
//! processing loop; operators observe them exclusively through the configured
//! [`FailureHandler`]. Only configuration errors escalate, and those surface
//! at startup before any processing begins.

use std::fmt;

use tracing::error;

use crate::error::OutboxError;
use crate::types::EntityRef;

/// Classification of a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The dispatch attempt failed and will be retried.
    Transient,
    /// Retries are exhausted; the event is dropped and will be lost.
    RetriesExhausted,
}

/// One failed dispatch attempt, reported to the failure handler.
#[derive(Debug, Clone)]
pub struct FailureReport {
    /// Human-readable description of the failing operation.
    pub operation: String,
    /// The error that triggered this report.
    pub error: OutboxError,
    /// The entities affected by the failing operation.
    pub entities: Vec<EntityRef>,
    /// Whether the event will be retried or is lost.
    pub kind: FailureKind,
}

/// Pluggable sink for failure reports.
///
/// Every failed attempt produces one report; exhausting the retry budget
/// produces one final report with [`FailureKind::RetriesExhausted`].
/// Implementations must not block for long: reports are emitted from the
/// processing loop.
pub trait FailureHandler: Send + Sync + fmt::Debug {
    fn handle(&self, report: &FailureReport);
}

/// Default failure handler that writes structured tracing errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFailureHandler;

impl FailureHandler for LogFailureHandler {
    fn handle(&self, report: &FailureReport) {
        let entities = report
            .entities
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        match report.kind {
            FailureKind::Transient => {
                error!(
                    operation = %report.operation,
                    entities = %entities,
                    error = %report.error,
                    "dispatch to the search backend failed, will retry"
                );
            }
            FailureKind::RetriesExhausted => {
                error!(
                    operation = %report.operation,
                    entities = %entities,
                    error = %report.error,
                    "retries exhausted, event will be lost"
                );
            }
        }
    }
}
