//! Event store layer: the append-only annotation log.
//!
//! This module defines the event model (a tagged union over the wire
//! `event` discriminator), the normalization of legacy records that predate
//! the discriminator, and the newline-delimited JSON file store.

mod file;


pub use file::{FileStore, MemoryStore};

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::StoreResult;

/// Highest event schema version this build understands.
///
/// Any record bearing a higher version makes the whole projection refuse to
/// proceed (see `ProjectionError::UnsupportedSchema`) rather than risk
/// silently dropping meaning it cannot prove it understands.
pub const SUPPORTED_SCHEMA_VERSION: u32 = 1;

/// Default initial score for records that never carried one.
pub const DEFAULT_INITIAL_SCORE: i64 = 50;

/// A raw store record: one parsed JSON line, not yet decoded into an event.
pub type RawRecord = serde_json::Value;

/// Result of reading the full store.
#[derive(Debug, Clone, Default)]
pub struct ReadOutcome {
    /// Parsed records in log order.
    pub records: Vec<RawRecord>,
    /// Lines that failed to parse as JSON (counted, never fatal).
    pub skipped_lines: usize,
}

/// An immutable fact in the annotation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    /// A raw observation extracted from assistant output.
    AnnotationCreated(AnnotationCreated),
    /// Partial update to an annotation's derived fields.
    AnnotationEnriched(AnnotationEnriched),
    /// A synthesized pattern supplied by the analysis oracle.
    InsightCreated(InsightCreated),
    /// Partial update to an insight.
    InsightUpdated(InsightUpdated),
    /// A typed, strength-weighted edge from an annotation to an insight.
    EvidenceLinked(EvidenceLinked),
    /// A hierarchy edge between two insights.
    InsightLinked(InsightLinked),
    /// Marker recording the horizon through which annotations were analyzed.
    AnalysisCompleted(AnalysisCompleted),
}

impl Event {
    /// The event's own timestamp.
    pub fn ts(&self) -> DateTime<Utc> {
        match self {
            Event::AnnotationCreated(e) => e.ts,
            Event::AnnotationEnriched(e) => e.ts,
            Event::InsightCreated(e) => e.ts,
            Event::InsightUpdated(e) => e.ts,
            Event::EvidenceLinked(e) => e.ts,
            Event::InsightLinked(e) => e.ts,
            Event::AnalysisCompleted(e) => e.ts,
        }
    }

    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::AnnotationCreated(_) => "AnnotationCreated",
            Event::AnnotationEnriched(_) => "AnnotationEnriched",
            Event::InsightCreated(_) => "InsightCreated",
            Event::InsightUpdated(_) => "InsightUpdated",
            Event::EvidenceLinked(_) => "EvidenceLinked",
            Event::InsightLinked(_) => "InsightLinked",
            Event::AnalysisCompleted(_) => "AnalysisCompleted",
        }
    }
}

/// A raw observation record ("box") detected in assistant output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationCreated {
    /// Stable identifier: `sess_<sid>_<turn>` when session context is known,
    /// else a slug of timestamp + type for legacy data.
    pub id: String,
    /// When the annotation was observed.
    pub ts: DateTime<Utc>,
    /// Event schema generation this record was written under.
    #[serde(default)]
    pub schema_version: u32,
    /// Annotation type tag.
    pub box_type: BoxType,
    /// Field map extracted from the annotation body
    /// (lowercase_underscored name -> value).
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Best-effort origin context.
    #[serde(default)]
    pub context: SessionContext,
    /// Initial score from the per-type table.
    #[serde(default = "default_initial_score")]
    pub initial_score: i64,
}

/// Best-effort origin context for an annotation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_remote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_number: Option<u64>,
}

/// Partial update to an annotation, shallow-merged in timestamp order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationEnriched {
    /// Target annotation id.
    pub annotation_id: String,
    /// When the enrichment was decided.
    pub ts: DateTime<Utc>,
    /// Keys merged over the annotation's current state; later timestamps win.
    #[serde(default)]
    pub updates: serde_json::Map<String, serde_json::Value>,
}

/// A synthesized pattern ("learning") recorded by the analysis oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightCreated {
    pub id: String,
    pub ts: DateTime<Utc>,
    /// The learning text itself.
    pub insight: String,
    /// Base confidence, 0.0-1.0. Malformed values coerce to 0.5.
    #[serde(default = "default_confidence", deserialize_with = "lenient_unit_float")]
    pub confidence: f64,
    #[serde(default)]
    pub scope: InsightScope,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Hierarchy level: 0 = base insight, >=1 = meta-insight.
    #[serde(default)]
    pub level: u32,
}

/// Scope of an insight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightScope {
    /// Applies everywhere.
    #[default]
    Global,
    /// Applies to the originating repository.
    Repo,
}

/// Partial update to an insight, shallow-merged in timestamp order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightUpdated {
    /// Target insight id.
    pub insight_id: String,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub updates: serde_json::Map<String, serde_json::Value>,
}

/// A typed, strength-weighted edge from an annotation to an insight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceLinked {
    #[serde(default = "new_link_id")]
    pub id: String,
    pub ts: DateTime<Utc>,
    pub insight_id: String,
    pub annotation_id: String,
    /// Edge strength, 0.0-1.0. Malformed values coerce to 0.5.
    #[serde(default = "default_confidence", deserialize_with = "lenient_unit_float")]
    pub strength: f64,
    #[serde(default)]
    pub relationship: EvidenceRelationship,
}

/// How a piece of evidence relates to an insight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceRelationship {
    /// Evidence supports the insight.
    #[default]
    Supports,
    /// Evidence contradicts the insight.
    Contradicts,
    /// Evidence is related but neither supports nor contradicts.
    Tangential,
}

impl EvidenceRelationship {
    /// Weight applied to the edge strength when averaging evidence.
    pub fn weight(&self) -> f64 {
        match self {
            EvidenceRelationship::Supports => 1.0,
            EvidenceRelationship::Tangential => 0.3,
            EvidenceRelationship::Contradicts => -0.5,
        }
    }
}

/// A hierarchy edge between two insights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightLinked {
    pub parent_insight_id: String,
    pub child_insight_id: String,
    /// Optional on the wire; hierarchy edges carry no scoring weight.
    #[serde(default = "epoch_ts")]
    pub ts: DateTime<Utc>,
    pub relationship: InsightLinkRelationship,
}

/// How a parent insight relates to a child insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightLinkRelationship {
    /// Parent synthesizes the child together with others.
    Synthesizes,
    /// Parent narrows or sharpens the child.
    Refines,
    /// Parent replaces the child.
    Supersedes,
}

/// Marker recording how far annotation analysis has progressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisCompleted {
    pub ts: DateTime<Utc>,
    /// Annotations at or before this timestamp have been considered.
    pub through_ts: DateTime<Utc>,
    /// Informational counts only.
    #[serde(default)]
    pub stats: serde_json::Map<String, serde_json::Value>,
}

/// Annotation type tag with a fixed default-score table.
///
/// Unknown tags round-trip through `Other` rather than failing the record;
/// the legacy `Sycophancy` type still parses but is excluded from active
/// projection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BoxType {
    Choice,
    Decision,
    Assumption,
    Concern,
    Warning,
    Confidence,
    Pushback,
    Suggestion,
    Reflection,
    FollowUps,
    Completion,
    Quality,
    /// Legacy type, excluded from projection.
    Sycophancy,
    /// Unrecognized tag, preserved verbatim.
    Other(String),
}

impl BoxType {
    /// Initial score assigned at creation time, per the fixed table.
    pub fn initial_score(&self) -> i64 {
        match self {
            BoxType::Choice => 90,
            BoxType::Decision => 90,
            BoxType::Assumption => 85,
            BoxType::Concern => 80,
            BoxType::Warning => 90,
            BoxType::Confidence => 70,
            BoxType::Pushback => 65,
            BoxType::Suggestion => 60,
            BoxType::Reflection => 55,
            BoxType::FollowUps => 45,
            BoxType::Completion => 40,
            BoxType::Quality => 35,
            BoxType::Sycophancy => 30,
            BoxType::Other(_) => 40,
        }
    }

    /// Whether this type participates in projection at all.
    pub fn is_active(&self) -> bool {
        !matches!(self, BoxType::Sycophancy)
    }

    /// All recognized (named) types.
    pub fn all() -> &'static [BoxType] {
        &[
            BoxType::Choice,
            BoxType::Decision,
            BoxType::Assumption,
            BoxType::Concern,
            BoxType::Warning,
            BoxType::Confidence,
            BoxType::Pushback,
            BoxType::Suggestion,
            BoxType::Reflection,
            BoxType::FollowUps,
            BoxType::Completion,
            BoxType::Quality,
            BoxType::Sycophancy,
        ]
    }
}

impl From<String> for BoxType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Choice" => BoxType::Choice,
            "Decision" => BoxType::Decision,
            "Assumption" => BoxType::Assumption,
            "Concern" => BoxType::Concern,
            "Warning" => BoxType::Warning,
            "Confidence" => BoxType::Confidence,
            "Pushback" => BoxType::Pushback,
            "Suggestion" => BoxType::Suggestion,
            "Reflection" => BoxType::Reflection,
            "FollowUps" => BoxType::FollowUps,
            "Completion" => BoxType::Completion,
            "Quality" => BoxType::Quality,
            "Sycophancy" => BoxType::Sycophancy,
            _ => BoxType::Other(s),
        }
    }
}

impl From<BoxType> for String {
    fn from(t: BoxType) -> Self {
        t.to_string()
    }
}

impl std::fmt::Display for BoxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoxType::Choice => write!(f, "Choice"),
            BoxType::Decision => write!(f, "Decision"),
            BoxType::Assumption => write!(f, "Assumption"),
            BoxType::Concern => write!(f, "Concern"),
            BoxType::Warning => write!(f, "Warning"),
            BoxType::Confidence => write!(f, "Confidence"),
            BoxType::Pushback => write!(f, "Pushback"),
            BoxType::Suggestion => write!(f, "Suggestion"),
            BoxType::Reflection => write!(f, "Reflection"),
            BoxType::FollowUps => write!(f, "FollowUps"),
            BoxType::Completion => write!(f, "Completion"),
            BoxType::Quality => write!(f, "Quality"),
            BoxType::Sycophancy => write!(f, "Sycophancy"),
            BoxType::Other(s) => write!(f, "{}", s),
        }
    }
}

impl AnnotationCreated {
    /// Build a fresh annotation at the current schema version, deriving the
    /// id from session context when possible.
    pub fn new(box_type: BoxType, ts: DateTime<Utc>, context: SessionContext) -> Self {
        let id = annotation_id(&context, ts, &box_type);
        let initial_score = box_type.initial_score();
        Self {
            id,
            ts,
            schema_version: SUPPORTED_SCHEMA_VERSION,
            box_type,
            fields: BTreeMap::new(),
            context,
            initial_score,
        }
    }

    /// Set a field, keeping the first value on duplicate keys.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.entry(name.into()).or_insert_with(|| value.into());
        self
    }
}

/// Derive the stable annotation id from context, falling back to a
/// timestamp+type slug for records with no session identity.
pub fn annotation_id(context: &SessionContext, ts: DateTime<Utc>, box_type: &BoxType) -> String {
    match (&context.session_id, context.turn_number) {
        (Some(sid), Some(turn)) => format!("sess_{}_{}", sid, turn),
        _ => slug(&format!("{}_{}", ts.to_rfc3339(), box_type)),
    }
}

/// Lowercased slug: alphanumerics kept, every other run collapsed to `_`.
fn slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_sep = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_sep = false;
        } else if !last_sep && !out.is_empty() {
            out.push('_');
            last_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Decode one raw record into a typed event.
///
/// Records without an `event` discriminator are legacy annotations and get
/// normalized: synthesized id, `schema_version = 0`, default initial score.
/// Returns `None` for records that fail validation; the caller counts these
/// and continues.
pub fn decode_record(record: &RawRecord) -> Option<Event> {
    let obj = record.as_object()?;
    if obj.contains_key("event") {
        return serde_json::from_value(record.clone()).ok();
    }
    normalize_legacy(obj).map(Event::AnnotationCreated)
}

/// Normalize a pre-discriminator record into a canonical `AnnotationCreated`.
fn normalize_legacy(obj: &serde_json::Map<String, serde_json::Value>) -> Option<AnnotationCreated> {
    let ts_str = obj
        .get("ts")
        .or_else(|| obj.get("timestamp"))
        .and_then(|v| v.as_str())?;
    let ts = DateTime::parse_from_rfc3339(ts_str).ok()?.with_timezone(&Utc);

    let box_type = BoxType::from(
        obj.get("box_type")
            .or_else(|| obj.get("type"))
            .and_then(|v| v.as_str())?
            .to_string(),
    );

    let mut fields = BTreeMap::new();
    if let Some(map) = obj.get("fields").and_then(|v| v.as_object()) {
        for (k, v) in map {
            let value = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            fields.insert(k.clone(), value);
        }
    }

    let context: SessionContext = obj
        .get("context")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    let initial_score = obj
        .get("initial_score")
        .and_then(|v| v.as_i64())
        .unwrap_or_else(|| box_type.initial_score());

    Some(AnnotationCreated {
        id: annotation_id(&context, ts, &box_type),
        ts,
        schema_version: 0,
        box_type,
        fields,
        context,
        initial_score,
    })
}

/// Max `schema_version` observed across raw records, checked before typed
/// decoding so that future-schema records cannot hide behind parse failures.
pub fn max_schema_version(records: &[RawRecord]) -> u32 {
    records
        .iter()
        .filter_map(|r| r.get("schema_version"))
        .filter_map(|v| v.as_u64())
        .map(|v| v.min(u32::MAX as u64) as u32)
        .max()
        .unwrap_or(0)
}

fn default_initial_score() -> i64 {
    DEFAULT_INITIAL_SCORE
}

fn default_confidence() -> f64 {
    0.5
}

fn new_link_id() -> String {
    format!("link_{}", uuid::Uuid::new_v4())
}

fn epoch_ts() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Accept a number or numeric string; anything else coerces to 0.5 rather
/// than failing the whole record.
fn lenient_unit_float<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(coerce_unit_float(&value))
}

/// Coercion used for confidence/strength style values.
pub fn coerce_unit_float(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.5),
        serde_json::Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.5),
        _ => 0.5,
    }
}

/// Abstraction over the append-only log, so tests and embedders can swap
/// the file store for an in-memory one.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event as a single atomic write.
    async fn append(&self, event: &Event) -> StoreResult<()>;
    /// Read every raw record in log order, counting unparseable lines.
    async fn read_all(&self) -> StoreResult<ReadOutcome>;
}
