//! Insight projection: fold updates and evidence links into
//! confidence-scored views.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::ProjectionResult;
use crate::store::{
    coerce_unit_float, Event, EvidenceLinked, EvidenceRelationship, InsightScope, RawRecord,
};

use super::{
    decay_factor, decode_all, ensure_supported, fractional_weeks, repo_matches, Projected,
    ProjectionDiagnostics, ProjectionOptions, REPO_BOOST,
};

/// Current state of one insight, scored at a projection instant.
#[derive(Debug, Clone)]
pub struct InsightView {
    pub id: String,
    /// Post-update timestamp; recency decay runs from here.
    pub ts: DateTime<Utc>,
    /// The learning text.
    pub insight: String,
    pub scope: InsightScope,
    pub tags: BTreeSet<String>,
    /// Hierarchy level: 0 = base insight, >=1 = meta-insight.
    pub level: u32,
    /// Confidence as recorded (post-update), before weighting.
    pub base_confidence: f64,
    /// Evidence links resolved against this insight.
    pub evidence_count: usize,
    /// Base confidence after evidence weighting and recency decay.
    pub effective_confidence: f64,
    /// Effective confidence after repo boost.
    pub relevance_score: f64,
    pub age_weeks: f64,
}

struct Folded {
    created: crate::store::InsightCreated,
    updates: Vec<(DateTime<Utc>, usize, serde_json::Map<String, serde_json::Value>)>,
    evidence: Vec<EvidenceLinked>,
}

/// Fold the full record sequence into current-state insight views.
///
/// Views come back in first-created log order for stable downstream
/// tie-breaks.
pub fn project_insights(
    records: &[RawRecord],
    now: DateTime<Utc>,
    opts: &ProjectionOptions,
) -> ProjectionResult<Projected<InsightView>> {
    ensure_supported(records)?;
    let (events, skipped) = decode_all(records);
    let mut diagnostics = ProjectionDiagnostics {
        skipped_records: skipped,
        ..Default::default()
    };

    // Annotation repo identities, needed for the evidence-level repo boost.
    let mut annotation_repos: HashMap<String, Option<String>> = HashMap::new();
    for event in &events {
        if let Event::AnnotationCreated(a) = event {
            annotation_repos
                .entry(a.id.clone())
                .or_insert_with(|| a.context.git_remote.clone());
        }
    }

    let mut order: Vec<String> = Vec::new();
    let mut folded: BTreeMap<String, Folded> = BTreeMap::new();
    for event in &events {
        if let Event::InsightCreated(created) = event {
            if !folded.contains_key(&created.id) {
                order.push(created.id.clone());
                folded.insert(
                    created.id.clone(),
                    Folded {
                        created: created.clone(),
                        updates: Vec::new(),
                        evidence: Vec::new(),
                    },
                );
            }
        }
    }

    for (position, event) in events.iter().enumerate() {
        match event {
            Event::InsightUpdated(update) => match folded.get_mut(&update.insight_id) {
                Some(entry) => entry
                    .updates
                    .push((update.ts, position, update.updates.clone())),
                None => diagnostics.orphan_refs += 1,
            },
            Event::EvidenceLinked(link) => match folded.get_mut(&link.insight_id) {
                Some(entry) => entry.evidence.push(link.clone()),
                None => diagnostics.orphan_refs += 1,
            },
            _ => {}
        }
    }

    let mut views = Vec::with_capacity(order.len());
    for id in order {
        let mut entry = match folded.remove(&id) {
            Some(e) => e,
            None => continue,
        };

        entry.updates.sort_by_key(|(ts, position, _)| (*ts, *position));
        let mut state = serde_json::Map::new();
        let mut effective_ts = entry.created.ts;
        for (ts, _, updates) in entry.updates {
            effective_ts = effective_ts.max(ts);
            for (key, value) in updates {
                state.insert(key, value);
            }
        }

        let base_confidence = state
            .get("confidence")
            .map(coerce_unit_float)
            .unwrap_or(entry.created.confidence);
        let insight = state
            .get("insight")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| entry.created.insight.clone());
        let level = state
            .get("level")
            .and_then(|v| v.as_u64())
            .map(|l| l.min(u32::MAX as u64) as u32)
            .unwrap_or(entry.created.level);
        let scope = state
            .get("scope")
            .and_then(|v| serde_json::from_value::<InsightScope>(v.clone()).ok())
            .unwrap_or(entry.created.scope);
        let tags = state
            .get("tags")
            .and_then(|v| serde_json::from_value::<BTreeSet<String>>(v.clone()).ok())
            .unwrap_or(entry.created.tags);

        let evidence_factor = evidence_factor(&entry.evidence);
        let age_weeks = fractional_weeks(effective_ts, now);
        let recency = decay_factor(opts.decay_rate, age_weeks);
        let effective_confidence = base_confidence * (0.5 + evidence_factor * 0.5) * recency;

        let boosted = scope == InsightScope::Repo
            && opts.current_repo.as_deref().is_some_and(|r| !r.is_empty())
            && entry.evidence.iter().any(|link| {
                link.relationship == EvidenceRelationship::Supports
                    && annotation_repos
                        .get(&link.annotation_id)
                        .map(|repo| repo_matches(repo.as_deref(), opts.current_repo.as_deref()))
                        .unwrap_or(false)
            });
        let boost = if boosted { REPO_BOOST } else { 1.0 };

        views.push(InsightView {
            id,
            ts: effective_ts,
            insight,
            scope,
            tags,
            level,
            base_confidence,
            evidence_count: entry.evidence.len(),
            effective_confidence,
            relevance_score: effective_confidence * boost,
            age_weeks,
        });
    }

    debug!(
        insights = views.len(),
        skipped = diagnostics.skipped_records,
        orphans = diagnostics.orphan_refs,
        "Projected insights"
    );
    Ok(Projected { views, diagnostics })
}

/// Average of `strength * relationship_weight`, or the 0.5 neutral prior
/// for insights with no evidence at all.
fn evidence_factor(evidence: &[EvidenceLinked]) -> f64 {
    if evidence.is_empty() {
        return 0.5;
    }
    let sum: f64 = evidence
        .iter()
        .map(|link| link.strength * link.relationship.weight())
        .sum();
    sum / evidence.len() as f64
}
