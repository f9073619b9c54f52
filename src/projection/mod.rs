//! Projection engine: pure folds from the raw event log to current-state
//! views.
//!
//! Both projections follow the same discipline: check the schema guardrail
//! against the raw records, decode what this build understands, fold
//! mutations per entity in timestamp order, then score with recency decay
//! and repo boosts. No I/O, no hidden state; projecting the same log twice
//! at the same `now` yields identical output.

mod annotations;
mod insights;

pub use annotations::{project_annotations, AnnotationView};
pub use insights::{project_insights, InsightView};

use chrono::{DateTime, Utc};

use crate::error::{ProjectionError, ProjectionResult};
use crate::store::{decode_record, max_schema_version, Event, RawRecord, SUPPORTED_SCHEMA_VERSION};

/// Multiplier applied when a record's repository matches the caller's.
pub const REPO_BOOST: f64 = 1.5;

/// Caller-supplied projection parameters.
#[derive(Debug, Clone)]
pub struct ProjectionOptions {
    /// Weekly exponential decay base.
    pub decay_rate: f64,
    /// The caller's current repository identity (git remote), if known.
    pub current_repo: Option<String>,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self {
            decay_rate: 0.95,
            current_repo: None,
        }
    }
}

/// Counters accumulated while folding. Logged, never user-surfaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionDiagnostics {
    /// Records that failed validation and were skipped.
    pub skipped_records: usize,
    /// Mutation or link events whose target id does not exist.
    pub orphan_refs: usize,
}

/// Projection output: views in fold-derived order plus diagnostics.
#[derive(Debug, Clone)]
pub struct Projected<T> {
    pub views: Vec<T>,
    pub diagnostics: ProjectionDiagnostics,
}

/// Refuse to project a store written by a newer schema generation.
///
/// Checked against raw records before typed decoding, so a future-schema
/// event cannot slip past as an ordinary parse failure.
pub fn ensure_supported(records: &[RawRecord]) -> ProjectionResult<()> {
    let found = max_schema_version(records);
    if found > SUPPORTED_SCHEMA_VERSION {
        return Err(ProjectionError::UnsupportedSchema {
            found,
            supported: SUPPORTED_SCHEMA_VERSION,
        });
    }
    Ok(())
}

/// Decode raw records into typed events, counting the ones this build
/// cannot validate.
pub(crate) fn decode_all(records: &[RawRecord]) -> (Vec<Event>, usize) {
    let mut events = Vec::with_capacity(records.len());
    let mut skipped = 0usize;
    for record in records {
        match decode_record(record) {
            Some(event) => events.push(event),
            None => skipped += 1,
        }
    }
    (events, skipped)
}

/// Exact fractional weeks between two instants, never negative.
pub fn fractional_weeks(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    const WEEK_SECONDS: f64 = 7.0 * 24.0 * 3600.0;
    let millis = (to - from).num_milliseconds();
    (millis.max(0) as f64 / 1000.0) / WEEK_SECONDS
}

/// Exponential recency factor: `rate ^ weeks`.
pub fn decay_factor(rate: f64, weeks: f64) -> f64 {
    rate.powf(weeks)
}

/// Whether a stored repo identity matches the caller's current one.
/// Both sides must be non-empty.
pub(crate) fn repo_matches(stored: Option<&str>, current: Option<&str>) -> bool {
    match (stored, current) {
        (Some(s), Some(c)) => !s.is_empty() && !c.is_empty() && s == c,
        _ => false,
    }
}
