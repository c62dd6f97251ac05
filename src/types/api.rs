use serde::{Deserialize, Serialize};

use super::message::Message;

/// Generation parameters attached to a job conversation send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_system_prompt: Option<String>,
    #[serde(default)]
    pub use_tools: bool,
}

/// Body of a user turn send. Attachments and the tool reference are opaque
/// to the engine and forwarded to the node as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_reference: Option<String>,
    pub agent: String,
    pub generation: GenerationConfig,
}

/// Handle returned when the node accepts a turn; used to bind the event
/// stream and to address stop requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub conversation_id: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
}

/// One page of conversation history, ascending by `created_at`.
/// `next_cursor` addresses the page strictly older than this one; `None`
/// once history is exhausted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Events delivered on the per-job SSE stream while a turn is generating.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    PartialContent {
        text: String,
    },
    Done,
    Error {
        reason: String,
    },
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_event_parses_tagged_variants() {
        let partial: TurnEvent =
            serde_json::from_str(r#"{"type":"partial_content","text":"Hel"}"#).unwrap();
        assert_eq!(
            partial,
            TurnEvent::PartialContent {
                text: "Hel".to_string()
            }
        );

        let done: TurnEvent = serde_json::from_str(r#"{"type":"done"}"#).unwrap();
        assert_eq!(done, TurnEvent::Done);

        let error: TurnEvent =
            serde_json::from_str(r#"{"type":"error","reason":"provider unavailable"}"#).unwrap();
        assert_eq!(
            error,
            TurnEvent::Error {
                reason: "provider unavailable".to_string()
            }
        );
    }

    #[test]
    fn test_turn_event_unknown_type_is_tolerated() {
        let event: TurnEvent =
            serde_json::from_str(r#"{"type":"usage_report","tokens":12}"#).unwrap();
        assert_eq!(event, TurnEvent::Unknown);
    }

    #[test]
    fn test_send_payload_omits_empty_optionals() {
        let payload = SendPayload {
            content: "Summarize this".to_string(),
            attachments: Vec::new(),
            tool_reference: None,
            agent: "main/agent/summarizer".to_string(),
            generation: GenerationConfig {
                stream: true,
                ..GenerationConfig::default()
            },
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("attachments").is_none());
        assert!(value.get("toolReference").is_none());
        assert_eq!(value["generation"]["stream"], true);
    }
}
