//! Collector: scans free assistant output for decorated annotation boxes
//! and turns each into an `AnnotationCreated` event.
//!
//! A box opens with a line carrying the type's unique marker symbol and
//! upper-cased name, carries `**Field:** value` pairs in its body, and
//! closes at a decorative rule line. This is plain text scanning; the
//! box-type taxonomy and initial-score table are shared with the
//! projection engine through [`BoxType`].

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::store::{annotation_id, AnnotationCreated, BoxType, SessionContext};

/// `**Field Name:** value` body lines.
static FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\*\*([^:*]+):\*\*\s*(.*)$").expect("valid field regex")
});

/// Decorative closing rule: a run of box-drawing or plain dashes.
static RULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[─-]{8,}\s*$").expect("valid rule regex"));

/// Marker inventory: unique leading symbol plus upper-cased heading.
const MARKERS: &[(&str, &str, BoxType)] = &[
    ("⚖", "CHOICE", BoxType::Choice),
    ("◆", "DECISION", BoxType::Decision),
    ("◇", "ASSUMPTION", BoxType::Assumption),
    ("◉", "CONCERN", BoxType::Concern),
    ("▲", "WARNING", BoxType::Warning),
    ("◠", "CONFIDENCE", BoxType::Confidence),
    ("◀", "PUSHBACK", BoxType::Pushback),
    ("✦", "SUGGESTION", BoxType::Suggestion),
    ("∿", "REFLECTION", BoxType::Reflection),
    ("➤", "FOLLOWUPS", BoxType::FollowUps),
    ("✓", "COMPLETION", BoxType::Completion),
    ("❖", "QUALITY", BoxType::Quality),
    ("♡", "SYCOPHANCY", BoxType::Sycophancy),
];

/// Extract every annotation box from a block of assistant output.
///
/// Blocks still open at end-of-text are emitted as-is. Ids derive from the
/// session context; when one turn yields several boxes, later ids get a
/// positional suffix to stay unique.
pub fn collect_annotations(
    text: &str,
    ts: DateTime<Utc>,
    context: &SessionContext,
) -> Vec<AnnotationCreated> {
    let mut out: Vec<AnnotationCreated> = Vec::new();
    let mut open: Option<AnnotationCreated> = None;

    for line in text.lines() {
        let line = line.trim();

        if let Some(box_type) = match_marker(line) {
            // A new marker implicitly closes any block left open.
            if let Some(done) = open.take() {
                out.push(done);
            }
            open = Some(new_annotation(box_type, ts, context, out.len()));
            continue;
        }

        if RULE_RE.is_match(line) {
            if let Some(done) = open.take() {
                out.push(done);
            }
            continue;
        }

        if let Some(current) = open.as_mut() {
            if let Some(caps) = FIELD_RE.captures(line) {
                let key = normalize_field_name(&caps[1]);
                let value = caps[2].trim().to_string();
                // First occurrence of a duplicate key wins.
                current.fields.entry(key).or_insert(value);
            }
        }
    }

    if let Some(done) = open.take() {
        out.push(done);
    }

    debug!(boxes = out.len(), "Collected annotation boxes");
    out
}

fn match_marker(line: &str) -> Option<BoxType> {
    for (symbol, heading, box_type) in MARKERS {
        if let Some(rest) = line.strip_prefix(symbol) {
            if rest.trim_start().starts_with(heading) {
                return Some(box_type.clone());
            }
        }
    }
    None
}

fn new_annotation(
    box_type: BoxType,
    ts: DateTime<Utc>,
    context: &SessionContext,
    position: usize,
) -> AnnotationCreated {
    let mut annotation = AnnotationCreated::new(box_type.clone(), ts, context.clone());
    if position > 0 {
        annotation.id = format!("{}_{}", annotation_id(context, ts, &box_type), position + 1);
    }
    annotation
}

/// Lowercase, spaces to underscores.
fn normalize_field_name(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx() -> SessionContext {
        SessionContext {
            session_id: Some("s1".to_string()),
            turn_number: Some(4),
            git_remote: Some("git@github.com:x/repo.git".to_string()),
            git_branch: Some("main".to_string()),
        }
    }

    fn now() -> DateTime<Utc> {
        "2026-03-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_single_box_with_fields() {
        let text = "\
Some prose before.

⚖ CHOICE
**Selected:** Zod
**Alternatives:** Yup
────────────────────

And prose after.";
        let boxes = collect_annotations(text, now(), &ctx());
        assert_eq!(boxes.len(), 1);
        let b = &boxes[0];
        assert_eq!(b.box_type, BoxType::Choice);
        assert_eq!(b.id, "sess_s1_4");
        assert_eq!(b.initial_score, 90);
        assert_eq!(b.schema_version, 1);
        assert_eq!(b.fields.get("selected").unwrap(), "Zod");
        assert_eq!(b.fields.get("alternatives").unwrap(), "Yup");
    }

    #[test]
    fn test_field_names_are_normalized_and_first_wins() {
        let text = "\
◆ DECISION
**What Happened:** kept the old API
**What Happened:** overwritten value
────────────────────";
        let boxes = collect_annotations(text, now(), &ctx());
        assert_eq!(
            boxes[0].fields.get("what_happened").unwrap(),
            "kept the old API"
        );
    }

    #[test]
    fn test_unclosed_trailing_block_is_emitted() {
        let text = "\
▲ WARNING
**Risk:** migration drops a column";
        let boxes = collect_annotations(text, now(), &ctx());
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].box_type, BoxType::Warning);
        assert_eq!(boxes[0].fields.get("risk").unwrap(), "migration drops a column");
    }

    #[test]
    fn test_multiple_boxes_get_unique_ids() {
        let text = "\
⚖ CHOICE
**Selected:** A
────────────────────
◇ ASSUMPTION
**What:** schema is frozen
────────────────────";
        let boxes = collect_annotations(text, now(), &ctx());
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].id, "sess_s1_4");
        assert_eq!(boxes[1].id, "sess_s1_4_2");
    }

    #[test]
    fn test_new_marker_closes_open_block() {
        let text = "\
⚖ CHOICE
**Selected:** A
◆ DECISION
**What:** ship it
────────────────────";
        let boxes = collect_annotations(text, now(), &ctx());
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].box_type, BoxType::Choice);
        assert_eq!(boxes[1].box_type, BoxType::Decision);
    }

    #[test]
    fn test_plain_prose_yields_nothing() {
        let boxes = collect_annotations("Just a normal reply.\nNo boxes here.", now(), &ctx());
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_initial_scores_follow_the_table() {
        let text = "\
❖ QUALITY
**Note:** tests lag behind
────────────────────";
        let boxes = collect_annotations(text, now(), &ctx());
        assert_eq!(boxes[0].initial_score, 35);
    }
}
