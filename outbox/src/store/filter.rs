//! Composable filter predicates for the event finder.
//!
//! A filter restricts which change log rows a `find_batch` call returns. It is
//! expressed twice: as a SQL fragment with named placeholders for the Postgres
//! store, and as an in-process predicate for the memory store. Filters compose
//! via logical AND without callers seeing how a particular store evaluates
//! them. The shard partitioner contributes its ownership condition as a filter
//! term; tests inject visibility filters the same way.

use chrono::{DateTime, Utc};

use crate::types::OutboxEvent;

/// A value bound to a named placeholder of a filter fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    BigInt(i64),
    BigIntArray(Vec<i64>),
    Text(String),
    Timestamp(DateTime<Utc>),
}

/// A boolean condition over event columns.
///
/// `fragment` must reference columns through the given table alias and bind
/// dynamic values via `:name` placeholders; `parameters` supplies one value per
/// placeholder name. Placeholder names must be unique within a composed filter.
/// `matches` is the equivalent in-process predicate used by non-SQL stores.
pub trait EventFilter: Send + Sync {
    /// SQL condition text, with event columns qualified by `alias`.
    fn fragment(&self, alias: &str) -> String;

    /// Values for the placeholders referenced by [`EventFilter::fragment`].
    fn parameters(&self) -> Vec<(&'static str, FilterValue)>;

    /// In-process evaluation of the same condition.
    fn matches(&self, event: &OutboxEvent) -> bool;
}

/// The identity filter: accepts every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAllFilter;

impl EventFilter for MatchAllFilter {
    fn fragment(&self, _alias: &str) -> String {
        "true".to_string()
    }

    fn parameters(&self) -> Vec<(&'static str, FilterValue)> {
        Vec::new()
    }

    fn matches(&self, _event: &OutboxEvent) -> bool {
        true
    }
}

/// Logical AND of multiple filter terms.
pub struct AndFilter {
    terms: Vec<Box<dyn EventFilter>>,
}

impl AndFilter {
    pub fn new(terms: Vec<Box<dyn EventFilter>>) -> Self {
        Self { terms }
    }
}

impl EventFilter for AndFilter {
    fn fragment(&self, alias: &str) -> String {
        if self.terms.is_empty() {
            return "true".to_string();
        }

        self.terms
            .iter()
            .map(|term| format!("({})", term.fragment(alias)))
            .collect::<Vec<_>>()
            .join(" and ")
    }

    fn parameters(&self) -> Vec<(&'static str, FilterValue)> {
        self.terms
            .iter()
            .flat_map(|term| term.parameters())
            .collect()
    }

    fn matches(&self, event: &OutboxEvent) -> bool {
        self.terms.iter().all(|term| term.matches(event))
    }
}

/// Combinator methods available on every sized filter.
pub trait EventFilterExt: EventFilter + Sized + 'static {
    /// Combines this filter with another via logical AND.
    fn and<F>(self, other: F) -> AndFilter
    where
        F: EventFilter + 'static,
    {
        AndFilter::new(vec![Box::new(self), Box::new(other)])
    }
}

impl<F> EventFilterExt for F where F: EventFilter + Sized + 'static {}

/// Restricts the finder to events created at or before a cutoff.
///
/// Used in tests to simulate delayed visibility of change log rows.
#[derive(Debug, Clone)]
pub struct VisibleBeforeFilter {
    cutoff: DateTime<Utc>,
}

impl VisibleBeforeFilter {
    pub fn new(cutoff: DateTime<Utc>) -> Self {
        Self { cutoff }
    }
}

impl EventFilter for VisibleBeforeFilter {
    fn fragment(&self, alias: &str) -> String {
        format!("{alias}.moment <= :visible_before")
    }

    fn parameters(&self) -> Vec<(&'static str, FilterValue)> {
        vec![("visible_before", FilterValue::Timestamp(self.cutoff))]
    }

    fn matches(&self, event: &OutboxEvent) -> bool {
        event.moment <= self.cutoff
    }
}
