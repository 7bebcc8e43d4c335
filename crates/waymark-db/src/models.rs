use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Error returned when a stored or user-supplied string names no variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(ParseEnumError {
                kind: "message role",
                value: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------

/// Difficulty of a roadmap topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Self::Easy, Self::Medium, Self::Hard];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(ParseEnumError {
                kind: "difficulty",
                value: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------

/// Kind of learning material attached to a topic. The set is closed; see
/// `waymark_core::roadmap::canonical` for how free-form upstream labels map
/// onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Video,
    Article,
    Practice,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Video => "video",
            Self::Article => "article",
            Self::Practice => "practice",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------

/// Lifecycle status of a roadmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RoadmapStatus {
    Active,
    Completed,
    Archived,
}

impl fmt::Display for RoadmapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Archived => "archived",
        };
        f.write_str(s)
    }
}

impl FromStr for RoadmapStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            other => Err(ParseEnumError {
                kind: "roadmap status",
                value: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A conversation between one user and the intake assistant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub domain: Option<String>,
    pub generation_completed: bool,
    pub roadmap_id: Option<Uuid>,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One appended chat message. Never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub session_id: Uuid,
    pub seq: i32,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A generated learning roadmap header. Phases and topics live in their own
/// tables and are loaded separately.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Roadmap {
    pub id: Uuid,
    pub user_id: Uuid,
    pub session_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub ai_summary: String,
    pub status: RoadmapStatus,
    pub total_phases: i32,
    pub total_topics: i32,
    pub total_hours: f64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub id: Uuid,
    pub roadmap_id: Uuid,
    pub phase_number: i32,
    pub phase_name: String,
    pub description: String,
    pub total_hours: f64,
}

/// A learning material reference, stored inside `topics.resources`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// A topic row. `id` is the canonical identity; `topic_id` is the key the
/// generation corpus uses and is only unique within one roadmap.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: Uuid,
    pub roadmap_id: Uuid,
    pub phase_id: Uuid,
    pub position: i32,
    pub topic_id: String,
    pub topic: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub estimated_hours: f64,
    pub prerequisites: Vec<String>,
    pub resources: Json<Vec<Resource>>,
    #[sqlx(rename = "topic_order")]
    #[serde(rename = "order")]
    pub order: i32,
}

/// Completion entry for one (user, roadmap, topic).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub roadmap_id: Uuid,
    pub topic_record_id: Uuid,
    pub topic_source_id: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: String,
    pub rating: Option<i32>,
    pub time_spent_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Insert payloads
// ---------------------------------------------------------------------------

/// A fully normalized roadmap tree ready to be written in one transaction.
///
/// Totals are derived from the tree on demand; there is no field to get
/// out of sync with the topics.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadmapDraft {
    pub title: String,
    pub description: String,
    pub ai_summary: String,
    pub metadata: serde_json::Value,
    pub phases: Vec<PhaseDraft>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseDraft {
    pub phase_number: i32,
    pub phase_name: String,
    pub description: String,
    pub topics: Vec<TopicDraft>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicDraft {
    pub topic_id: String,
    pub topic: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub estimated_hours: f64,
    pub prerequisites: Vec<String>,
    pub resources: Vec<Resource>,
    pub order: i32,
}

impl PhaseDraft {
    pub fn total_hours(&self) -> f64 {
        self.topics.iter().map(|t| t.estimated_hours).sum()
    }
}

impl RoadmapDraft {
    pub fn total_topics(&self) -> usize {
        self.phases.iter().map(|p| p.topics.len()).sum()
    }

    pub fn total_hours(&self) -> f64 {
        self.phases.iter().map(PhaseDraft::total_hours).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_role_parses_stored_values() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::System] {
            assert_eq!(role.as_str().parse::<MessageRole>().unwrap(), role);
        }
        let err = "moderator".parse::<MessageRole>().unwrap_err();
        assert_eq!(err.to_string(), "invalid message role: \"moderator\"");
    }

    #[test]
    fn difficulty_rejects_unknown() {
        assert_eq!("hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("Hard".parse::<Difficulty>().is_err());
    }

    #[test]
    fn roadmap_status_parses_stored_values() {
        assert_eq!(
            "archived".parse::<RoadmapStatus>().unwrap(),
            RoadmapStatus::Archived
        );
        assert!("deleted".parse::<RoadmapStatus>().is_err());
    }

    #[test]
    fn resource_serializes_kind_as_type() {
        let resource = Resource {
            title: "Two pointers".into(),
            kind: ResourceType::Practice,
            url: "https://leetcode.com/tag/two-pointers/".into(),
            platform: None,
        };
        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json["type"], "practice");
        assert!(json.get("platform").is_none());
    }

    #[test]
    fn topic_serializes_order_and_camel_case() {
        let topic = Topic {
            id: Uuid::nil(),
            roadmap_id: Uuid::nil(),
            phase_id: Uuid::nil(),
            position: 0,
            topic_id: "dp_02".into(),
            topic: "Fibonacci DP".into(),
            description: String::new(),
            difficulty: Difficulty::Easy,
            estimated_hours: 2.0,
            prerequisites: vec![],
            resources: Json(vec![]),
            order: 1,
        };
        let json = serde_json::to_value(&topic).unwrap();
        assert_eq!(json["topicId"], "dp_02");
        assert_eq!(json["order"], 1);
        assert_eq!(json["estimatedHours"], 2.0);
        assert_eq!(json["resources"], serde_json::json!([]));
    }
}
