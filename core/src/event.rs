/// Inbound stream events and their decoding into display messages
use crate::error::{ChatError, Result};
use crate::message::{
    DisplayMessage, MessageId, MessageKind, MessageMetadata, Role, PLACEHOLDER_WIRE_ID,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generation state reported alongside every event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    Idle,
}

/// One role/content pair inside an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub kind: MessageKind,
    pub messages: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_state: Option<Value>,
}

/// A unit pushed by the backend during generation.
///
/// `id` and `created_at` are only set on records reconstructed from history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    pub message: EventPayload,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl StreamEvent {
    pub fn new(kind: MessageKind, messages: Vec<ConversationTurn>, status: AgentStatus) -> Self {
        Self {
            message: EventPayload {
                kind,
                messages,
                metadata: None,
                agent_state: None,
            },
            status,
            trace_id: None,
            id: None,
            created_at: None,
        }
    }

    /// Parse a JSON event body
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| ChatError::Decode(format!("malformed stream event: {}", e)))
    }

    pub fn is_finished(&self) -> bool {
        self.status == AgentStatus::Idle
    }

    /// Number of display messages this event decodes into
    pub fn message_count(&self) -> usize {
        self.message.messages.len()
    }
}

/// Decode a batch of events into a flat, ordered list of display messages.
///
/// One output message per role/content pair, in event order then intra-event order.
/// Ids are derived from the event position inside the batch, so identical input
/// always yields identical output.
pub fn decode(events: &[StreamEvent], is_history: bool) -> Result<Vec<DisplayMessage>> {
    let total = events.iter().map(StreamEvent::message_count).sum();
    let mut out = Vec::with_capacity(total);
    for (ordinal, event) in events.iter().enumerate() {
        out.extend(decode_event(event, ordinal as u64, is_history)?);
    }
    Ok(out)
}

/// Decode one event; `ordinal` disambiguates ids across events sharing a trace
pub fn decode_event(
    event: &StreamEvent,
    ordinal: u64,
    is_history: bool,
) -> Result<Vec<DisplayMessage>> {
    if event.id.as_deref() == Some(PLACEHOLDER_WIRE_ID) {
        return Err(ChatError::Decode(format!(
            "event id '{}' is reserved for the placeholder",
            PLACEHOLDER_WIRE_ID
        )));
    }

    let kind = event.message.kind;
    let metadata = MessageMetadata::for_kind(kind, event.message.metadata.clone())?;
    let turns = &event.message.messages;

    let mut out = Vec::with_capacity(turns.len());
    for (index, turn) in turns.iter().enumerate() {
        let mut msg = DisplayMessage::new(
            message_id(event, ordinal, index),
            turn.role,
            kind,
            turn.content.clone(),
        )
        .with_metadata(metadata.clone())
        .with_history(is_history);
        msg.created_at = event.created_at;
        out.push(msg);
    }
    Ok(out)
}

fn message_id(event: &StreamEvent, ordinal: u64, index: usize) -> MessageId {
    if let (Some(id), 1) = (&event.id, event.message_count()) {
        return MessageId::content(id.clone());
    }
    let base = event
        .id
        .as_deref()
        .or(event.trace_id.as_deref())
        .unwrap_or("event");
    MessageId::content(format!("{}-{}-{}", base, ordinal, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn turn(role: Role, content: &str) -> ConversationTurn {
        ConversationTurn {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_decode_preserves_event_and_intra_event_order() {
        let events = vec![
            StreamEvent::new(
                MessageKind::AgentMessage,
                vec![turn(Role::User, "a"), turn(Role::Assistant, "b")],
                AgentStatus::Running,
            ),
            StreamEvent::new(
                MessageKind::StageResult,
                vec![turn(Role::Assistant, "c")],
                AgentStatus::Idle,
            ),
        ];

        let messages = decode(&events, false).unwrap();
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[2].kind, MessageKind::StageResult);
        assert!(messages.iter().all(|m| !m.is_history));
    }

    #[test]
    fn test_decode_count_matches_nested_messages() {
        let events: Vec<StreamEvent> = (0..5)
            .map(|n| {
                StreamEvent::new(
                    MessageKind::AgentMessage,
                    (0..n).map(|i| turn(Role::Assistant, &i.to_string())).collect(),
                    AgentStatus::Running,
                )
            })
            .collect();

        let expected: usize = events.iter().map(StreamEvent::message_count).sum();
        assert_eq!(decode(&events, false).unwrap().len(), expected);
        assert_eq!(expected, 10);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let mut event = StreamEvent::new(
            MessageKind::AgentMessage,
            vec![turn(Role::Assistant, "x"), turn(Role::Assistant, "y")],
            AgentStatus::Running,
        );
        event.trace_id = Some("trace".to_string());
        let events = vec![event.clone(), event];

        let first = decode(&events, true).unwrap();
        let second = decode(&events, true).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].id, MessageId::content("trace-0-0"));
        assert_eq!(first[3].id, MessageId::content("trace-1-1"));
    }

    #[test]
    fn test_event_inherits_kind_and_metadata() {
        let raw = json!({
            "message": {
                "kind": "PlatformMessage",
                "messages": [{"role": "assistant", "content": "Deploying your app"}],
                "metadata": {"type": "deploy_in_progress"}
            },
            "status": "running",
            "traceId": "t-1"
        });
        let event = StreamEvent::from_json(&raw.to_string()).unwrap();

        let messages = decode_event(&event, 0, false).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, MessageKind::PlatformMessage);
        assert!(messages[0].metadata.as_ref().unwrap().platform().is_some());
    }

    #[test]
    fn test_reserved_placeholder_id_is_rejected() {
        let raw = json!({
            "message": {
                "kind": "AgentMessage",
                "messages": [{"role": "assistant", "content": "hi"}]
            },
            "status": "idle",
            "id": "loading-message"
        });
        let event = StreamEvent::from_json(&raw.to_string()).unwrap();

        assert!(matches!(
            decode_event(&event, 0, true),
            Err(ChatError::Decode(_))
        ));
    }

    #[test]
    fn test_decoded_ids_survive_serde() {
        let mut event = StreamEvent::new(
            MessageKind::AgentMessage,
            vec![turn(Role::Assistant, "x")],
            AgentStatus::Idle,
        );
        event.id = Some("p1".to_string());

        let messages = decode(&[event], true).unwrap();
        let wire = serde_json::to_value(&messages[0].id).unwrap();
        let back: MessageId = serde_json::from_value(wire).unwrap();
        assert_eq!(back, messages[0].id);
        assert!(!back.is_placeholder());
    }

    #[test]
    fn test_malformed_event_fails_fast() {
        let missing_role = r#"{"message":{"kind":"AgentMessage","messages":[{"content":"hi"}]},"status":"running"}"#;
        assert!(matches!(
            StreamEvent::from_json(missing_role),
            Err(ChatError::Decode(_))
        ));

        let mut bad_meta = StreamEvent::new(
            MessageKind::PlatformMessage,
            vec![turn(Role::Assistant, "x")],
            AgentStatus::Running,
        );
        bad_meta.message.metadata = Some(json!({"type": 7}));
        assert!(decode(&[bad_meta], false).is_err());
    }
}
