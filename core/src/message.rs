/// Display message model shared by the decoder, the store and the renderer
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{ChatError, Result};

/// Wire value the backend and the web client use for the in-progress placeholder
pub const PLACEHOLDER_WIRE_ID: &str = "loading-message";

/// Identifies one chat/app session; messages are grouped under it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ConversationKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Message identity: either the single trailing placeholder or a content id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageId {
    Placeholder,
    Content(String),
}

impl MessageId {
    /// Id from a raw string; the wire sentinel always maps to `Placeholder`
    pub fn content(id: impl Into<String>) -> Self {
        MessageId::from(id.into())
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, MessageId::Placeholder)
    }
}

impl From<String> for MessageId {
    fn from(raw: String) -> Self {
        if raw == PLACEHOLDER_WIRE_ID {
            MessageId::Placeholder
        } else {
            MessageId::Content(raw)
        }
    }
}

impl From<&str> for MessageId {
    fn from(raw: &str) -> Self {
        MessageId::from(raw.to_string())
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        match id {
            MessageId::Placeholder => PLACEHOLDER_WIRE_ID.to_string(),
            MessageId::Content(id) => id,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Placeholder => f.write_str(PLACEHOLDER_WIRE_ID),
            MessageId::Content(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Semantic category of a message, as tagged by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    StageResult,
    PlatformMessage,
    RuntimeError,
    RefinementRequest,
    UserMessage,
    AgentMessage,
    ReviewResult,
}

impl MessageKind {
    pub const ALL: [MessageKind; 7] = [
        MessageKind::StageResult,
        MessageKind::PlatformMessage,
        MessageKind::RuntimeError,
        MessageKind::RefinementRequest,
        MessageKind::UserMessage,
        MessageKind::AgentMessage,
        MessageKind::ReviewResult,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::StageResult => "StageResult",
            MessageKind::PlatformMessage => "PlatformMessage",
            MessageKind::RuntimeError => "RuntimeError",
            MessageKind::RefinementRequest => "RefinementRequest",
            MessageKind::UserMessage => "UserMessage",
            MessageKind::AgentMessage => "AgentMessage",
            MessageKind::ReviewResult => "ReviewResult",
        }
    }
}

/// Deployment lifecycle states carried by platform messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformMessageType {
    DeployInProgress,
    DeploySuccess,
    DeployFailed,
    RepoCreated,
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformMetadata {
    #[serde(rename = "type")]
    pub message_type: PlatformMessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
}

/// Kind-dependent metadata.
///
/// `Platform` is only valid for `MessageKind::PlatformMessage`; every other kind
/// carries a free-form attribute object.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageMetadata {
    Platform(PlatformMetadata),
    Attributes(Map<String, Value>),
}

impl MessageMetadata {
    /// Parse raw wire metadata according to the message kind.
    ///
    /// `null` is treated as absent. Shapes that do not match the kind are rejected.
    pub fn for_kind(kind: MessageKind, raw: Option<Value>) -> Result<Option<Self>> {
        let raw = match raw {
            None | Some(Value::Null) => return Ok(None),
            Some(v) => v,
        };

        match kind {
            MessageKind::PlatformMessage => {
                let platform: PlatformMetadata = serde_json::from_value(raw).map_err(|e| {
                    ChatError::Decode(format!("invalid PlatformMessage metadata: {}", e))
                })?;
                Ok(Some(MessageMetadata::Platform(platform)))
            }
            other => match raw {
                Value::Object(map) => Ok(Some(MessageMetadata::Attributes(map))),
                v => Err(ChatError::Decode(format!(
                    "{} metadata must be an object, got {}",
                    other.as_str(),
                    json_type_name(&v)
                ))),
            },
        }
    }

    /// Whether this metadata variant is valid for `kind`
    pub fn fits(&self, kind: MessageKind) -> bool {
        match self {
            MessageMetadata::Platform(_) => kind == MessageKind::PlatformMessage,
            MessageMetadata::Attributes(_) => kind != MessageKind::PlatformMessage,
        }
    }

    pub fn platform(&self) -> Option<&PlatformMetadata> {
        match self {
            MessageMetadata::Platform(p) => Some(p),
            MessageMetadata::Attributes(_) => None,
        }
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One rendered line of a conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMessage {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    pub kind: MessageKind,
    pub metadata: Option<MessageMetadata>,
    pub is_history: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl DisplayMessage {
    pub fn new(id: MessageId, role: Role, kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            id,
            role,
            text: text.into(),
            kind,
            metadata: None,
            is_history: false,
            created_at: None,
        }
    }

    /// The "response in progress" indicator
    pub fn placeholder(text: impl Into<String>) -> Self {
        Self::new(
            MessageId::Placeholder,
            Role::Assistant,
            MessageKind::AgentMessage,
            text,
        )
    }

    pub fn with_metadata(mut self, metadata: Option<MessageMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_history(mut self, is_history: bool) -> Self {
        self.is_history = is_history;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.is_placeholder()
    }
}

/// Partial update merged into an existing message by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub role: Option<Role>,
    pub text: Option<String>,
    pub kind: Option<MessageKind>,
    pub metadata: Option<MessageMetadata>,
}

impl MessagePatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.role.is_none() && self.text.is_none() && self.kind.is_none() && self.metadata.is_none()
    }

    /// Merge into `msg`. Metadata that no longer fits the resulting kind is dropped.
    pub fn apply(self, msg: &mut DisplayMessage) {
        if let Some(role) = self.role {
            msg.role = role;
        }
        if let Some(text) = self.text {
            msg.text = text;
        }
        if let Some(kind) = self.kind {
            msg.kind = kind;
        }
        if let Some(metadata) = self.metadata {
            msg.metadata = Some(metadata);
        }
        if let Some(metadata) = &msg.metadata {
            if !metadata.fits(msg.kind) {
                tracing::debug!(
                    "Dropping metadata that does not fit kind {} on {}",
                    msg.kind.as_str(),
                    msg.id
                );
                msg.metadata = None;
            }
        }
    }
}
