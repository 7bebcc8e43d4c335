//! Conversion of a raw Generation Service payload into a [`RoadmapDraft`].
//!
//! The upstream contract is unversioned and has shipped both snake_case and
//! camelCase keys, sometimes both on the same object. Each field is looked
//! up under its known spellings in order and the first one present wins;
//! everything after the lookup works on one field set.
//!
//! Scalars are read as raw JSON values and coerced so that a stray string
//! where a number belongs degrades to a default instead of failing the
//! whole generation. Structural fields (`phases`, `topics`, `resources`)
//! must have the right shape.

use serde_json::{Map, Value};
use thiserror::Error;

use waymark_db::models::{PhaseDraft, Resource, RoadmapDraft, TopicDraft};

use super::canonical::{canonical_difficulty, canonical_resource_type};

pub const MAX_TITLE_LEN: usize = 200;
pub const DEFAULT_TITLE: &str = "Learning Roadmap";
/// Upper bound for a single topic's estimate. Keeps sums finite.
pub const MAX_TOPIC_HOURS: f64 = 10_000.0;
const ELLIPSIS: &str = "...";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("roadmap contains no topics")]
    NoTopics,
}

type Object = Map<String, Value>;

mod keys {
    pub const AI_SUMMARY: &[&str] = &["ai_summary", "aiSummary"];
    pub const PHASE_NUMBER: &[&str] = &["phase_number", "phaseNumber"];
    pub const PHASE_NAME: &[&str] = &["phase_name", "phaseName"];
    pub const TOPIC_ID: &[&str] = &["id", "topicId", "topic_id"];
    pub const TOPIC_NAME: &[&str] = &["topic", "name"];
    pub const ESTIMATED_HOURS: &[&str] = &["estimated_hours", "estimatedHours"];
    pub const RESOURCE_KIND: &[&str] = &["type", "kind"];
}

/// Normalize a Generation Service payload.
///
/// Totals are not read from the payload at all; [`RoadmapDraft`] derives
/// them from its topics.
pub fn normalize(payload: &Value) -> Result<RoadmapDraft, NormalizeError> {
    let root = payload.as_object().ok_or(NormalizeError::NotAnObject)?;

    let raw_phases = objects(root, "phases", "roadmap")?;
    let numbers = phase_numbers(&raw_phases);

    let phases = raw_phases
        .into_iter()
        .zip(numbers)
        .map(|(phase, number)| normalize_phase(phase, number))
        .collect::<Result<Vec<_>, _>>()?;

    let draft = RoadmapDraft {
        title: truncate_title(field_text(root, &["title"]).as_deref().unwrap_or(DEFAULT_TITLE)),
        description: field_text(root, &["description"]).unwrap_or_default(),
        ai_summary: field_text(root, keys::AI_SUMMARY).unwrap_or_default(),
        metadata: match root.get("metadata") {
            Some(meta @ Value::Object(_)) => strip_nul_json(meta),
            _ => Value::Object(Default::default()),
        },
        phases,
    };

    if draft.total_topics() == 0 {
        return Err(NormalizeError::NoTopics);
    }
    Ok(draft)
}

/// Trim a title and cap it at [`MAX_TITLE_LEN`] characters, replacing the
/// tail with an ellipsis when it had to be cut.
pub fn truncate_title(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.chars().count() <= MAX_TITLE_LEN {
        return trimmed.to_owned();
    }
    let mut cut: String = trimmed
        .chars()
        .take(MAX_TITLE_LEN - ELLIPSIS.len())
        .collect();
    cut.push_str(ELLIPSIS);
    cut
}

/// First value present under any of `keys`. `null` counts as absent.
fn field<'a>(obj: &'a Object, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn field_text(obj: &Object, keys: &[&str]) -> Option<String> {
    text(field(obj, keys))
}

/// The objects stored under `key`. Absent or null is empty; any other
/// non-array, or a non-object element, is malformed.
fn objects<'a>(obj: &'a Object, key: &str, parent: &str) -> Result<Vec<&'a Object>, NormalizeError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_object().ok_or_else(|| {
                    NormalizeError::Malformed(format!("{parent}.{key} contains a non-object"))
                })
            })
            .collect(),
        Some(_) => Err(NormalizeError::Malformed(format!(
            "{parent}.{key} is not an array"
        ))),
    }
}

/// Source phase numbers if every phase has one and they strictly ascend;
/// otherwise 1-based positions for all phases.
fn phase_numbers(phases: &[&Object]) -> Vec<i32> {
    let source: Option<Vec<i32>> = phases
        .iter()
        .map(|p| positive_int(field(p, keys::PHASE_NUMBER)))
        .collect();

    match source {
        Some(numbers) if numbers.windows(2).all(|w| w[0] < w[1]) => numbers,
        _ => (1..).take(phases.len()).collect(),
    }
}

fn normalize_phase(raw: &Object, number: i32) -> Result<PhaseDraft, NormalizeError> {
    let topics = objects(raw, "topics", "phase")?
        .into_iter()
        .enumerate()
        .map(|(i, topic)| normalize_topic(topic, number, i as i32 + 1))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PhaseDraft {
        phase_number: number,
        phase_name: field_text(raw, keys::PHASE_NAME)
            .unwrap_or_else(|| format!("Phase {number}")),
        description: field_text(raw, &["description"]).unwrap_or_default(),
        topics,
    })
}

fn normalize_topic(raw: &Object, phase: i32, position: i32) -> Result<TopicDraft, NormalizeError> {
    let name = field_text(raw, keys::TOPIC_NAME).unwrap_or_else(|| format!("Topic {position}"));

    let prerequisites = match field(raw, &["prerequisites"]) {
        None => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(|p| text(Some(p))).collect(),
        Some(_) => {
            return Err(NormalizeError::Malformed(
                "topic.prerequisites is not an array".into(),
            ));
        }
    };
    let resources = objects(raw, "resources", "topic")?
        .into_iter()
        .map(|r| normalize_resource(r, &name))
        .collect();

    Ok(TopicDraft {
        topic_id: field_text(raw, keys::TOPIC_ID)
            .unwrap_or_else(|| format!("topic_{phase}_{position}")),
        description: field_text(raw, &["description"]).unwrap_or_default(),
        difficulty: canonical_difficulty(
            field_text(raw, &["difficulty"]).as_deref().unwrap_or(""),
        ),
        estimated_hours: hours(field(raw, keys::ESTIMATED_HOURS)),
        prerequisites,
        resources,
        order: positive_int(field(raw, &["order"])).unwrap_or(position),
        topic: name,
    })
}

fn normalize_resource(raw: &Object, topic: &str) -> Resource {
    Resource {
        title: field_text(raw, &["title"]).unwrap_or_else(|| topic.to_owned()),
        kind: canonical_resource_type(field_text(raw, keys::RESOURCE_KIND).as_deref().unwrap_or("")),
        url: field_text(raw, &["url"]).unwrap_or_default(),
        platform: field_text(raw, &["platform"]),
    }
}

/// Non-empty trimmed text without NUL characters, which the store rejects.
/// Numbers are rendered, everything else is absent.
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => {
            let s = strip_nul(s);
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_owned())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn strip_nul(s: &str) -> String {
    s.replace('\0', "")
}

fn strip_nul_json(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(strip_nul(s)),
        Value::Array(items) => Value::Array(items.iter().map(strip_nul_json).collect()),
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (strip_nul(k), strip_nul_json(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Hours are never negative and never above [`MAX_TOPIC_HOURS`]; anything
/// unusable counts as zero.
fn hours(value: Option<&Value>) -> f64 {
    number(value)
        .filter(|h| *h >= 0.0)
        .map(|h| h.min(MAX_TOPIC_HOURS))
        .unwrap_or(0.0)
}

fn positive_int(value: Option<&Value>) -> Option<i32> {
    let n = number(value)?;
    (n >= 1.0 && n.fract() == 0.0 && n <= f64::from(i32::MAX)).then_some(n as i32)
}
