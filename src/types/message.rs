use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder id for a user message that has not been confirmed by the node.
pub const OPTIMISTIC_USER_MESSAGE_ID: &str = "optimistic-user-message";
/// Placeholder id for the assistant reply that is still being generated.
pub const OPTIMISTIC_ASSISTANT_MESSAGE_ID: &str = "optimistic-assistant-message";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn optimistic_id(self) -> &'static str {
        match self {
            MessageRole::User => OPTIMISTIC_USER_MESSAGE_ID,
            MessageRole::Assistant => OPTIMISTIC_ASSISTANT_MESSAGE_ID,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Running,
    Complete,
    Stopped,
    Failed,
}

impl MessageStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, MessageStatus::Running)
    }

    /// Status only moves forward: `Running` may become any terminal status,
    /// terminal statuses never change again.
    pub fn can_transition_to(self, next: MessageStatus) -> bool {
        match self {
            MessageStatus::Running => true,
            _ => self == next,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Present on assistant messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    /// Opaque payloads carried through for the UI; never interpreted here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<serde_json::Value>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    /// Locally synthesized user message, shown before the node confirms it.
    pub fn optimistic_user(content: impl Into<String>, attachments: Vec<serde_json::Value>) -> Self {
        Self {
            id: OPTIMISTIC_USER_MESSAGE_ID.to_string(),
            role: MessageRole::User,
            content: content.into(),
            created_at: Utc::now(),
            status: None,
            attachments,
            tool_calls: Vec::new(),
            metadata: MessageMetadata::default(),
        }
    }

    /// Empty assistant reply in `Running` state, patched as the stream arrives.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: OPTIMISTIC_ASSISTANT_MESSAGE_ID.to_string(),
            role: MessageRole::Assistant,
            content: String::new(),
            created_at: Utc::now(),
            status: Some(MessageStatus::Running),
            attachments: Vec::new(),
            tool_calls: Vec::new(),
            metadata: MessageMetadata::default(),
        }
    }

    pub fn is_optimistic(&self) -> bool {
        self.id == OPTIMISTIC_USER_MESSAGE_ID || self.id == OPTIMISTIC_ASSISTANT_MESSAGE_ID
    }

    pub fn is_running_assistant(&self) -> bool {
        self.role == MessageRole::Assistant && self.status == Some(MessageStatus::Running)
    }
}
