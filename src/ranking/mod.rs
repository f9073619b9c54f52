//! Ranking and bounded selection of projected views for injection.
//!
//! All sorts are stable, so views with equal keys keep the fold-derived
//! order the projection produced.

use std::cmp::Ordering;

use crate::projection::{AnnotationView, InsightView};

/// Top insights for injection: meta-insights (higher level) always outrank
/// base insights, then relevance decides within a level.
pub fn select_top_insights(mut insights: Vec<InsightView>, n: usize) -> Vec<InsightView> {
    insights.sort_by(|a, b| {
        b.level
            .cmp(&a.level)
            .then_with(|| cmp_desc(a.relevance_score, b.relevance_score))
    });
    insights.truncate(n);
    insights
}

/// Top annotations for injection: floor on effective score, then relevance
/// descending.
pub fn select_top_annotations(
    mut annotations: Vec<AnnotationView>,
    n: usize,
    min_effective_score: f64,
) -> Vec<AnnotationView> {
    annotations.retain(|a| a.effective_score >= min_effective_score);
    annotations.sort_by(|a, b| cmp_desc(a.relevance_score, b.relevance_score));
    annotations.truncate(n);
    annotations
}

/// Descending float comparison; NaN sorts last so a single malformed score
/// cannot poison the whole ordering.
fn cmp_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or_else(|| {
        if a.is_nan() && !b.is_nan() {
            Ordering::Greater
        } else if !a.is_nan() && b.is_nan() {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    })
}
