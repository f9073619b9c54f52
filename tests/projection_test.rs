//! End-to-end projection tests over a real store file.
//!
//! These walk the documented pipeline: append events, read raw records,
//! project, rank. Unit-level scoring edge cases live next to the
//! projection modules; this file covers the cross-module properties.

use chrono::{DateTime, Utc};

use hindsight::error::ProjectionError;
use hindsight::projection::{
    project_annotations, project_insights, ProjectionOptions,
};
use hindsight::ranking::{select_top_annotations, select_top_insights};
use hindsight::store::{EventStore, FileStore, RawRecord};

fn at(ts: &str) -> DateTime<Utc> {
    ts.parse().unwrap()
}

async fn store_with_lines(lines: &[&str]) -> (tempfile::TempDir, FileStore) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(&path, content).unwrap();
    (dir, FileStore::new(path))
}

async fn read_records(store: &FileStore) -> Vec<RawRecord> {
    store.read_all().await.unwrap().records
}

#[tokio::test]
async fn test_round_trip_creation_enrichment_projection() {
    let (_dir, store) = store_with_lines(&[
        r#"{"event":"AnnotationCreated","id":"a1","ts":"2026-01-01T00:00:00Z","schema_version":1,"box_type":"Choice","fields":{"selected":"Zod","alternatives":"Yup"},"initial_score":90}"#,
        r#"{"event":"AnnotationEnriched","annotation_id":"a1","ts":"2026-01-01T00:00:00Z","updates":{"score":95}}"#,
    ])
    .await;

    let records = read_records(&store).await;
    let projected = project_annotations(
        &records,
        at("2026-01-01T00:00:00Z"),
        &ProjectionOptions::default(),
    )
    .unwrap();

    assert_eq!(projected.views.len(), 1);
    let view = &projected.views[0];
    assert_eq!(view.effective_score, 95.0);
    assert_eq!(view.relevance_score, 95.0);
    assert_eq!(view.fields.get("selected").unwrap(), "Zod");
}

#[tokio::test]
async fn test_legacy_warning_line_projects_with_table_score() {
    let (_dir, store) = store_with_lines(&[
        r#"{"ts":"2026-01-01T00:00:00Z","type":"Warning","fields":{"risk":"x"}}"#,
    ])
    .await;

    let records = read_records(&store).await;
    let projected = project_annotations(
        &records,
        at("2026-01-01T00:00:00Z"),
        &ProjectionOptions::default(),
    )
    .unwrap();

    assert_eq!(projected.views.len(), 1);
    let view = &projected.views[0];
    assert_eq!(view.box_type.to_string(), "Warning");
    assert_eq!(view.base_score, 90.0);
    assert_eq!(view.fields.get("risk").unwrap(), "x");
}

#[tokio::test]
async fn test_schema_guardrail_aborts_both_projections() {
    let (_dir, store) = store_with_lines(&[
        r#"{"event":"AnnotationCreated","id":"a1","ts":"2026-01-01T00:00:00Z","schema_version":1,"box_type":"Choice","initial_score":90}"#,
        r#"{"event":"AnnotationCreated","id":"a2","ts":"2026-01-02T00:00:00Z","schema_version":99,"box_type":"Choice","initial_score":90}"#,
    ])
    .await;

    let records = read_records(&store).await;
    let now = at("2026-01-03T00:00:00Z");
    let opts = ProjectionOptions::default();

    let ann = project_annotations(&records, now, &opts).unwrap_err();
    let ins = project_insights(&records, now, &opts).unwrap_err();
    for err in [ann, ins] {
        assert!(matches!(
            err,
            ProjectionError::UnsupportedSchema { found: 99, supported: 1 }
        ));
    }
}

#[tokio::test]
async fn test_malformed_record_skipped_without_aborting() {
    let (_dir, store) = store_with_lines(&[
        // Missing required box_type and id.
        r#"{"event":"AnnotationCreated","ts":"2026-01-01T00:00:00Z"}"#,
        r#"{"event":"AnnotationCreated","id":"a1","ts":"2026-01-01T00:00:00Z","schema_version":1,"box_type":"Decision","initial_score":90}"#,
    ])
    .await;

    let records = read_records(&store).await;
    let projected = project_annotations(
        &records,
        at("2026-01-01T00:00:00Z"),
        &ProjectionOptions::default(),
    )
    .unwrap();

    assert_eq!(projected.views.len(), 1);
    assert_eq!(projected.diagnostics.skipped_records, 1);
}

#[tokio::test]
async fn test_full_pipeline_selection_honors_threshold_and_level() {
    let (_dir, store) = store_with_lines(&[
        // Fresh high-score annotation, stays above the floor.
        r#"{"event":"AnnotationCreated","id":"a1","ts":"2026-06-01T00:00:00Z","schema_version":1,"box_type":"Decision","fields":{"what":"split the crate"},"initial_score":90}"#,
        // Low-score annotation, filtered by the floor.
        r#"{"event":"AnnotationCreated","id":"a2","ts":"2026-06-01T00:00:00Z","schema_version":1,"box_type":"Quality","fields":{"note":"low"},"initial_score":35}"#,
        // Base insight with strong score.
        r#"{"event":"InsightCreated","id":"i1","ts":"2026-06-01T00:00:00Z","insight":"writes tests before refactors","confidence":0.99,"scope":"global","level":0}"#,
        // Meta-insight with weak score; must still rank first.
        r#"{"event":"InsightCreated","id":"i2","ts":"2026-06-01T00:00:00Z","insight":"prefers reversible changes","confidence":0.2,"scope":"global","level":1}"#,
    ])
    .await;

    let records = read_records(&store).await;
    let now = at("2026-06-01T12:00:00Z");
    let opts = ProjectionOptions::default();

    let annotations = project_annotations(&records, now, &opts).unwrap().views;
    let insights = project_insights(&records, now, &opts).unwrap().views;

    let top_annotations = select_top_annotations(annotations, 5, 60.0);
    assert_eq!(top_annotations.len(), 1);
    assert_eq!(top_annotations[0].id, "a1");

    let top_insights = select_top_insights(insights, 2);
    assert_eq!(top_insights[0].id, "i2");
    assert_eq!(top_insights[1].id, "i1");
}

#[tokio::test]
async fn test_projection_is_pure_across_reads() {
    let (_dir, store) = store_with_lines(&[
        r#"{"event":"AnnotationCreated","id":"a1","ts":"2026-01-01T00:00:00Z","schema_version":1,"box_type":"Choice","initial_score":90}"#,
        r#"{"event":"InsightCreated","id":"i1","ts":"2026-01-01T00:00:00Z","insight":"x","confidence":0.7}"#,
        r#"{"event":"EvidenceLinked","id":"l1","ts":"2026-01-02T00:00:00Z","insight_id":"i1","annotation_id":"a1","strength":0.9,"relationship":"supports"}"#,
    ])
    .await;

    let now = at("2026-02-01T00:00:00Z");
    let opts = ProjectionOptions::default();

    let first_records = read_records(&store).await;
    let second_records = read_records(&store).await;
    let first = project_insights(&first_records, now, &opts).unwrap().views;
    let second = project_insights(&second_records, now, &opts).unwrap().views;

    assert_eq!(first.len(), 1);
    assert_eq!(first[0].effective_confidence, second[0].effective_confidence);
    assert_eq!(first[0].evidence_count, 1);
}

#[tokio::test]
async fn test_analysis_and_link_events_do_not_disturb_scoring() {
    let (_dir, store) = store_with_lines(&[
        r#"{"event":"InsightCreated","id":"i1","ts":"2026-01-01T00:00:00Z","insight":"x","confidence":0.6}"#,
        r#"{"event":"InsightCreated","id":"i2","ts":"2026-01-01T00:00:00Z","insight":"y","confidence":0.6,"level":1}"#,
        r#"{"event":"InsightLinked","parent_insight_id":"i2","child_insight_id":"i1","ts":"2026-01-02T00:00:00Z","relationship":"synthesizes"}"#,
        r#"{"event":"AnalysisCompleted","ts":"2026-01-02T00:00:00Z","through_ts":"2026-01-01T00:00:00Z","stats":{"annotations":12}}"#,
    ])
    .await;

    let records = read_records(&store).await;
    let projected = project_insights(
        &records,
        at("2026-01-01T00:00:00Z"),
        &ProjectionOptions::default(),
    )
    .unwrap();

    assert_eq!(projected.views.len(), 2);
    for view in &projected.views {
        // Both insights score as evidence-free; hierarchy edges carry no weight.
        assert!((view.effective_confidence - 0.6 * 0.75).abs() < 1e-9);
    }
}
