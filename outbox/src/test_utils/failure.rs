//! Failure handler that records reports for assertions.

use std::sync::{Arc, Mutex};

use crate::failure::{FailureHandler, FailureKind, FailureReport};

/// Collects every failure report for later inspection.
///
/// Clones share the collected reports. Uses a synchronous mutex since
/// [`FailureHandler::handle`] is not async.
#[derive(Debug, Clone, Default)]
pub struct CollectingFailureHandler {
    reports: Arc<Mutex<Vec<FailureReport>>>,
}

impl CollectingFailureHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<FailureReport> {
        self.reports.lock().unwrap().clone()
    }

    pub fn transient_count(&self) -> usize {
        self.count_kind(FailureKind::Transient)
    }

    pub fn exhausted_count(&self) -> usize {
        self.count_kind(FailureKind::RetriesExhausted)
    }

    fn count_kind(&self, kind: FailureKind) -> usize {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter(|report| report.kind == kind)
            .count()
    }
}

impl FailureHandler for CollectingFailureHandler {
    fn handle(&self, report: &FailureReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}
