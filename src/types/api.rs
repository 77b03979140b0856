use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const MAX_QUESTION_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageMetadata {
    #[serde(default)]
    pub source_chunks: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// One entry of a conversation transcript.
///
/// Locally created messages carry a `local-` id until the authoritative
/// history replaces them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub message_id: String,
    pub role: Role,
    pub content: String,
    #[serde(deserialize_with = "deserialize_server_datetime")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_timestamp: Option<f64>,
}

impl Message {
    pub fn local(role: Role, content: impl Into<String>) -> Self {
        Self {
            message_id: format!("local-{}", uuid::Uuid::new_v4()),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            token_count: None,
            metadata: None,
            suggested_timestamp: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.message_id.starts_with("local-")
    }

    /// Sets the suggestion unless one is already present.
    pub fn attach_suggestion(&mut self, seconds: f64) -> bool {
        if self.suggested_timestamp.is_some() {
            return false;
        }
        self.suggested_timestamp = Some(seconds);
        true
    }
}

/// Authoritative transcript returned by the history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatHistory {
    pub chat_id: String,
    pub file_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub total_messages: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(deserialize_with = "deserialize_server_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_server_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskRequest {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

/// Raw payload of one `data:` frame. Unknown `type` values land in `Unknown`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireFrame {
    Content {
        #[serde(default)]
        content: String,
    },
    Error {
        #[serde(default)]
        error: String,
    },
    Done {
        #[serde(default)]
        suggested_timestamp: Option<f64>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ContentDelta { text: String },
    Done { suggested_timestamp: Option<f64> },
    Error { message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::ContentDelta { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimestampEntry {
    #[serde(alias = "timestamp_entry_id")]
    pub id: String,
    pub time: f64,
    pub topic: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionMetadata {
    pub total_topics: u64,
    pub extraction_method: String,
    pub model_used: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimestampResponse {
    pub timestamp_id: String,
    pub file_id: String,
    #[serde(default)]
    pub timestamps: Vec<TimestampEntry>,
    pub extraction_metadata: ExtractionMetadata,
    #[serde(deserialize_with = "deserialize_server_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_server_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// The backend emits naive UTC datetimes (`2026-01-29T10:00:00`); RFC 3339 is
/// accepted as well.
pub fn parse_server_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_server_datetime<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_server_datetime(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid datetime '{raw}'")))
}
