//! Annotation projection: fold creations and enrichments into scored views.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::ProjectionResult;
use crate::store::{BoxType, Event, RawRecord};

use super::{
    decay_factor, decode_all, ensure_supported, fractional_weeks, repo_matches, Projected,
    ProjectionDiagnostics, ProjectionOptions, REPO_BOOST,
};

/// Current state of one annotation, scored at a projection instant.
#[derive(Debug, Clone)]
pub struct AnnotationView {
    pub id: String,
    pub box_type: BoxType,
    /// Creation timestamp; recency decay runs from here.
    pub ts: DateTime<Utc>,
    /// Fields extracted at creation time.
    pub fields: BTreeMap<String, String>,
    /// Shallow-merged enrichment state (adjusted score, validation flags, ...).
    pub enriched: serde_json::Map<String, serde_json::Value>,
    /// Stored repository identity, if any.
    pub repo: Option<String>,
    /// Score before decay: enriched score, else initial score.
    pub base_score: f64,
    /// Base score after recency decay.
    pub effective_score: f64,
    /// Effective score after repo boost.
    pub relevance_score: f64,
    /// Exact fractional age in weeks at projection time.
    pub age_weeks: f64,
}

struct Folded {
    created: crate::store::AnnotationCreated,
    // (ts, log position, updates) kept until the final timestamp-ordered merge.
    enrichments: Vec<(DateTime<Utc>, usize, serde_json::Map<String, serde_json::Value>)>,
}

/// Fold the full record sequence into current-state annotation views.
///
/// Views come back in first-created log order; ranking relies on that order
/// for stable tie-breaks. Sycophancy-type annotations are excluded.
pub fn project_annotations(
    records: &[RawRecord],
    now: DateTime<Utc>,
    opts: &ProjectionOptions,
) -> ProjectionResult<Projected<AnnotationView>> {
    ensure_supported(records)?;
    let (events, skipped) = decode_all(records);
    let mut diagnostics = ProjectionDiagnostics {
        skipped_records: skipped,
        ..Default::default()
    };

    // First pass: creations, first id wins.
    let mut order: Vec<String> = Vec::new();
    let mut folded: BTreeMap<String, Folded> = BTreeMap::new();
    for event in &events {
        if let Event::AnnotationCreated(created) = event {
            if !folded.contains_key(&created.id) {
                order.push(created.id.clone());
                folded.insert(
                    created.id.clone(),
                    Folded {
                        created: created.clone(),
                        enrichments: Vec::new(),
                    },
                );
            }
        }
    }

    // Second pass: enrichments, gathered with their log position so that
    // equal timestamps keep log order after the stable sort.
    for (position, event) in events.iter().enumerate() {
        if let Event::AnnotationEnriched(enriched) = event {
            match folded.get_mut(&enriched.annotation_id) {
                Some(entry) => {
                    entry
                        .enrichments
                        .push((enriched.ts, position, enriched.updates.clone()));
                }
                None => diagnostics.orphan_refs += 1,
            }
        }
    }

    let mut views = Vec::with_capacity(order.len());
    for id in order {
        let mut entry = match folded.remove(&id) {
            Some(e) => e,
            None => continue,
        };
        if !entry.created.box_type.is_active() {
            continue;
        }

        entry.enrichments.sort_by_key(|(ts, position, _)| (*ts, *position));
        let mut enriched = serde_json::Map::new();
        for (_, _, updates) in entry.enrichments {
            for (key, value) in updates {
                enriched.insert(key, value);
            }
        }

        let base_score = effective_base_score(&enriched, entry.created.initial_score);
        let age_weeks = fractional_weeks(entry.created.ts, now);
        let effective_score = base_score * decay_factor(opts.decay_rate, age_weeks);
        let repo = entry.created.context.git_remote.clone();
        let boost = if repo_matches(repo.as_deref(), opts.current_repo.as_deref()) {
            REPO_BOOST
        } else {
            1.0
        };

        views.push(AnnotationView {
            id,
            box_type: entry.created.box_type,
            ts: entry.created.ts,
            fields: entry.created.fields,
            repo,
            base_score,
            effective_score,
            relevance_score: effective_score * boost,
            age_weeks,
            enriched,
        });
    }

    debug!(
        annotations = views.len(),
        skipped = diagnostics.skipped_records,
        orphans = diagnostics.orphan_refs,
        "Projected annotations"
    );
    Ok(Projected { views, diagnostics })
}

/// Score fallback chain: enriched `score`, else the initial score (which
/// itself defaulted to 50 at decode time for records that never carried
/// one). Non-numeric enriched scores fall through rather than aborting.
fn effective_base_score(
    enriched: &serde_json::Map<String, serde_json::Value>,
    initial_score: i64,
) -> f64 {
    match enriched.get("score") {
        Some(value) => numeric(value).unwrap_or(initial_score as f64),
        None => initial_score as f64,
    }
}

fn numeric(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
