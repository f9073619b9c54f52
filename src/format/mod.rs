//! Deterministic rendering of selected views into the injected text block.

use crate::projection::{AnnotationView, InsightView};
use crate::store::BoxType;

/// Render the injection block, or `None` when there is nothing to say.
/// An empty selection never produces headers with no bullets.
pub fn render(insights: &[InsightView], annotations: &[AnnotationView]) -> Option<String> {
    if insights.is_empty() && annotations.is_empty() {
        return None;
    }

    let mut out = String::new();

    if !insights.is_empty() {
        out.push_str("## Learned Patterns\n");
        for view in insights {
            out.push_str(&insight_line(view));
            out.push('\n');
        }
    }

    if !annotations.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("## Recent Notable Observations\n");
        for view in annotations {
            out.push_str(&annotation_line(view));
            out.push('\n');
        }
    }

    Some(out)
}

fn insight_line(view: &InsightView) -> String {
    let confidence = (view.effective_confidence * 100.0).round() as i64;
    let mut line = format!("- {} (confidence: {}%)", view.insight.trim(), confidence);
    if !view.tags.is_empty() {
        let tags: Vec<&str> = view.tags.iter().map(String::as_str).collect();
        line.push_str(&format!(" [{}]", tags.join(", ")));
    }
    line
}

fn annotation_line(view: &AnnotationView) -> String {
    format!(
        "- {} ({})",
        summarize(view),
        age_phrase(view.age_weeks)
    )
}

/// Per-type summarization templates; unrecognized types fall back to the
/// first two fields.
fn summarize(view: &AnnotationView) -> String {
    let field = |name: &str| view.fields.get(name).map(String::as_str);
    match &view.box_type {
        BoxType::Choice => match (field("selected"), field("alternatives")) {
            (Some(selected), Some(alternatives)) => {
                format!("Chose {} over {}", selected, alternatives)
            }
            (Some(selected), None) => format!("Chose {}", selected),
            _ => generic_summary(view),
        },
        BoxType::Assumption => match field("what").or_else(|| field("assumption")) {
            Some(what) => format!("Assumed \"{}\"", what),
            None => generic_summary(view),
        },
        BoxType::Decision => match field("what").or_else(|| field("decision")) {
            Some(what) => match field("why") {
                Some(why) => format!("Decided {} ({})", what, why),
                None => format!("Decided {}", what),
            },
            None => generic_summary(view),
        },
        BoxType::Warning => match field("risk").or_else(|| field("what")) {
            Some(risk) => format!("Warning: {}", risk),
            None => generic_summary(view),
        },
        BoxType::Concern => match field("what").or_else(|| field("concern")) {
            Some(what) => format!("Concern: {}", what),
            None => generic_summary(view),
        },
        _ => generic_summary(view),
    }
}

fn generic_summary(view: &AnnotationView) -> String {
    let body: Vec<String> = view
        .fields
        .iter()
        .take(2)
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect();
    if body.is_empty() {
        view.box_type.to_string()
    } else {
        format!("{}: {}", view.box_type, body.join(", "))
    }
}

/// Whole-week age phrase: "today" under one week, then "N week(s) ago".
fn age_phrase(age_weeks: f64) -> String {
    let whole = age_weeks.floor() as i64;
    match whole {
        w if w < 1 => "today".to_string(),
        1 => "1 week ago".to_string(),
        w => format!("{} weeks ago", w),
    }
}
