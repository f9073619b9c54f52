//! Session lifecycle boundaries.
//!
//! Everything here is advisory to the host session: the start path fails
//! open (no context injected) on any internal error or when the soft
//! startup budget expires, and the end path degrades to "nothing appended".
//! Neither may panic, block, or surface a non-zero exit to the host.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::collector::collect_annotations;
use crate::config::Config;
use crate::error::{AppError, AppResult, ProjectionError, StoreError};
use crate::format::render;
use crate::projection::{project_annotations, project_insights, ProjectionOptions};
use crate::ranking::{select_top_annotations, select_top_insights};
use crate::store::{decode_record, Event, EventStore, RawRecord, SessionContext};

/// Session-start hook: project the store and return the context block to
/// inject, a short diagnostic for operator-relevant store conditions, or
/// nothing.
pub async fn session_start(
    config: &Config,
    store: &dyn EventStore,
    repo_hint: Option<&str>,
) -> Option<String> {
    if config.injection.disabled {
        debug!("Injection disabled by configuration");
        return None;
    }

    let budget = Duration::from_millis(config.injection.startup_timeout_ms);
    match tokio::time::timeout(budget, inject_context(config, store, repo_hint)).await {
        Ok(Ok(text)) => text,
        Ok(Err(err)) => diagnostic_for(&err),
        Err(_) => {
            warn!(
                budget_ms = config.injection.startup_timeout_ms,
                "Session-start budget expired; failing open"
            );
            None
        }
    }
}

async fn inject_context(
    config: &Config,
    store: &dyn EventStore,
    repo_hint: Option<&str>,
) -> AppResult<Option<String>> {
    let current_repo = resolve_current_repo(repo_hint).await;
    let outcome = store.read_all().await?;
    if outcome.records.is_empty() {
        return Ok(None);
    }

    let now = Utc::now();
    let opts = ProjectionOptions {
        decay_rate: config.scoring.decay_rate,
        current_repo,
    };
    let insights = project_insights(&outcome.records, now, &opts)?;
    let annotations = project_annotations(&outcome.records, now, &opts)?;

    let top_insights = select_top_insights(insights.views, config.injection.learnings_count);
    let top_annotations = select_top_annotations(
        annotations.views,
        config.injection.annotations_count,
        config.scoring.min_effective_score,
    );

    info!(
        insights = top_insights.len(),
        annotations = top_annotations.len(),
        skipped_lines = outcome.skipped_lines,
        "Prepared session context"
    );
    let rendered = render(&top_insights, &top_annotations);
    Ok(with_skip_notice(rendered, outcome.skipped_lines))
}

/// Partial corruption still injects the valid lines' context, but the
/// operator gets one line telling them the store needs attention.
fn with_skip_notice(rendered: Option<String>, skipped_lines: usize) -> Option<String> {
    if skipped_lines == 0 {
        return rendered;
    }
    let notice = format!(
        "[hindsight] {} store line{} could not be parsed and {} skipped.",
        skipped_lines,
        if skipped_lines == 1 { "" } else { "s" },
        if skipped_lines == 1 { "was" } else { "were" },
    );
    match rendered {
        Some(text) => Some(format!("{}\n\n{}", text, notice)),
        None => Some(notice),
    }
}

/// Map internal failures to the external contract: distinct short
/// diagnostics for conditions an operator must act on, nothing for the rest.
fn diagnostic_for(err: &AppError) -> Option<String> {
    match err {
        AppError::Projection(ProjectionError::UnsupportedSchema { found, supported }) => {
            Some(format!(
                "[hindsight] event store was written by schema version {} but this build supports {}; upgrade hindsight to restore session memory.",
                found, supported
            ))
        }
        AppError::Store(StoreError::ArrayShaped { path }) => Some(format!(
            "[hindsight] event store at {} is array-shaped, not line-shaped; migrate it to one JSON object per line.",
            path
        )),
        AppError::Store(StoreError::Corrupt { path, lines, .. }) => Some(format!(
            "[hindsight] event store at {} is unreadable ({} lines, none parseable); session memory disabled.",
            path, lines
        )),
        other => {
            warn!(error = %other, "Session-start failed; injecting nothing");
            None
        }
    }
}

/// Session-end hook: scan the assistant's response for annotation boxes and
/// append one creation event per box. Any failure degrades to "nothing
/// appended"; returns how many events made it to the log.
pub async fn session_end(store: &dyn EventStore, response_text: &str, context: SessionContext) -> usize {
    let boxes = collect_annotations(response_text, Utc::now(), &context);
    let mut appended = 0usize;
    for annotation in boxes {
        match store.append(&Event::AnnotationCreated(annotation)).await {
            Ok(()) => appended += 1,
            Err(err) => {
                warn!(error = %err, appended, "Append failed; stopping collection");
                break;
            }
        }
    }
    appended
}

/// Recording contract for the external analysis oracle: validate and append
/// already-decided insight/evidence/analysis events.
pub async fn record_events(store: &dyn EventStore, records: &[RawRecord]) -> AppResult<usize> {
    let mut appended = 0usize;
    for record in records {
        let event = decode_record(record).ok_or_else(|| AppError::Internal {
            message: format!("unrecognized event record: {}", record),
        })?;
        store.append(&event).await.map_err(AppError::from)?;
        appended += 1;
    }
    Ok(appended)
}

/// Store health summary for the `status` subcommand.
#[derive(Debug, Default)]
pub struct StoreStatus {
    /// Event counts per kind, in wire-name order of first appearance.
    pub counts: BTreeMap<String, usize>,
    /// Lines that failed to parse as JSON.
    pub skipped_lines: usize,
    /// Records that parsed as JSON but failed event validation.
    pub invalid_records: usize,
    /// Horizon of the most recent completed analysis, if any.
    pub analyzed_through: Option<chrono::DateTime<Utc>>,
}

/// Summarize the store without projecting it. Schema problems do not stop
/// the summary; that is the point of the command.
pub async fn status(store: &dyn EventStore) -> AppResult<StoreStatus> {
    let outcome = store.read_all().await.map_err(AppError::from)?;
    let mut summary = StoreStatus {
        skipped_lines: outcome.skipped_lines,
        ..Default::default()
    };
    for record in &outcome.records {
        match decode_record(record) {
            Some(event) => {
                *summary.counts.entry(event.kind().to_string()).or_insert(0) += 1;
                if let Event::AnalysisCompleted(a) = event {
                    summary.analyzed_through = Some(
                        summary
                            .analyzed_through
                            .map_or(a.through_ts, |prev| prev.max(a.through_ts)),
                    );
                }
            }
            None => summary.invalid_records += 1,
        }
    }
    Ok(summary)
}

impl std::fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.counts.is_empty() {
            writeln!(f, "store is empty")?;
        }
        for (kind, count) in &self.counts {
            writeln!(f, "{:<20} {}", kind, count)?;
        }
        if self.skipped_lines > 0 {
            writeln!(f, "{:<20} {}", "skipped lines", self.skipped_lines)?;
        }
        if self.invalid_records > 0 {
            writeln!(f, "{:<20} {}", "invalid records", self.invalid_records)?;
        }
        if let Some(through) = self.analyzed_through {
            writeln!(f, "analyzed through     {}", through.to_rfc3339())?;
        }
        Ok(())
    }
}

/// Resolve the caller's repository identity from the hint it supplied.
///
/// A hint that already looks like a remote is used verbatim; otherwise it
/// is treated as a working directory and asked for its origin remote.
pub async fn resolve_current_repo(hint: Option<&str>) -> Option<String> {
    let hint = hint?.trim();
    if hint.is_empty() {
        return None;
    }
    if hint.contains("://") || hint.starts_with("git@") {
        return Some(hint.to_string());
    }

    let output = tokio::process::Command::new("git")
        .args(["-C", hint, "config", "--get", "remote.origin.url"])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let remote = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if remote.is_empty() {
        None
    } else {
        Some(remote)
    }
}
