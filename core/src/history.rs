/// History merge: persisted prompts -> stream events -> display messages
use crate::error::{ChatError, Result};
use crate::event::{decode, AgentStatus, ConversationTurn, EventPayload, StreamEvent};
use crate::message::{DisplayMessage, MessageKind, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Who authored a persisted prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    User,
    Assistant,
}

/// A persisted user or agent turn, as returned by the history endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: String,
    pub app_id: String,
    pub kind: PromptRole,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_kind: Option<MessageKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// How merge treats the order of the incoming prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOrder {
    /// Require non-decreasing `created_at`; reject otherwise
    #[default]
    Validate,
    /// Stable sort by `created_at` first
    Resort,
}

impl Prompt {
    /// Convert into the stream-event shape, tagged as history
    pub fn to_stream_event(&self) -> StreamEvent {
        let (role, default_kind) = match self.kind {
            PromptRole::User => (Role::User, MessageKind::UserMessage),
            PromptRole::Assistant => (Role::Assistant, MessageKind::AgentMessage),
        };

        StreamEvent {
            message: EventPayload {
                kind: self.message_kind.unwrap_or(default_kind),
                messages: vec![ConversationTurn {
                    role,
                    content: self.prompt.clone(),
                }],
                metadata: self.metadata.clone(),
                agent_state: None,
            },
            status: AgentStatus::Idle,
            trace_id: None,
            id: Some(self.id.clone()),
            created_at: Some(self.created_at),
        }
    }
}

/// Check that `prompts` is ascending by `created_at` (ties allowed)
pub fn validate_order(prompts: &[Prompt]) -> Result<()> {
    match prompts
        .windows(2)
        .position(|pair| pair[1].created_at < pair[0].created_at)
    {
        Some(i) => Err(ChatError::HistoryOrder { index: i + 1 }),
        None => Ok(()),
    }
}

/// Merge persisted prompts into display messages with `is_history = true`
pub fn merge_history(prompts: &[Prompt], order: HistoryOrder) -> Result<Vec<DisplayMessage>> {
    let events: Vec<StreamEvent> = match order {
        HistoryOrder::Validate => {
            validate_order(prompts)?;
            prompts.iter().map(Prompt::to_stream_event).collect()
        }
        HistoryOrder::Resort => {
            let mut sorted: Vec<&Prompt> = prompts.iter().collect();
            // sort_by_key is stable, so equal timestamps keep input order
            sorted.sort_by_key(|p| p.created_at);
            sorted.into_iter().map(Prompt::to_stream_event).collect()
        }
    };

    debug!("Merging {} history prompts ({:?})", events.len(), order);
    decode(&events, true)
}
