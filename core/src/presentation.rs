/// Title, tone and icon for each message, and the wire shape handed to renderers
use crate::message::{
    DisplayMessage, MessageKind, MessageMetadata, PlatformMessageType, Role,
};
use serde::Serialize;

/// Colour family a renderer should use for the title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Neutral,
    Accent,
    Success,
    Warning,
    Danger,
    Muted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    pub title: &'static str,
    pub tone: Tone,
    pub icon: &'static str,
}

const fn p(title: &'static str, tone: Tone, icon: &'static str) -> Presentation {
    Presentation { title, tone, icon }
}

/// Presentation for every (role, kind) pair; platform messages refine by deployment state
pub fn presentation(role: Role, kind: MessageKind, metadata: Option<&MessageMetadata>) -> Presentation {
    match (role, kind) {
        (Role::User, MessageKind::RefinementRequest) => p("Your answer", Tone::Accent, "👤"),
        (Role::User, _) => p("You", Tone::Accent, "👤"),

        (_, MessageKind::PlatformMessage) => platform(metadata),
        (_, MessageKind::RuntimeError) => p("Runtime error", Tone::Danger, "✗"),
        (_, MessageKind::StageResult) => p("Stage result", Tone::Success, "✓"),
        (_, MessageKind::ReviewResult) => p("Review", Tone::Warning, "🔍"),
        (_, MessageKind::RefinementRequest) => p("Needs clarification", Tone::Warning, "?"),

        (Role::System, MessageKind::AgentMessage | MessageKind::UserMessage) => {
            p("System", Tone::Muted, "⚙")
        }
        (Role::Assistant, MessageKind::AgentMessage | MessageKind::UserMessage) => {
            p("Assistant", Tone::Neutral, "🤖")
        }
    }
}

fn platform(metadata: Option<&MessageMetadata>) -> Presentation {
    let message_type = metadata
        .and_then(MessageMetadata::platform)
        .map(|m| m.message_type);

    match message_type {
        Some(PlatformMessageType::DeployInProgress) => p("Deploying", Tone::Warning, "⏳"),
        Some(PlatformMessageType::DeploySuccess) => p("Deployed", Tone::Success, "🚀"),
        Some(PlatformMessageType::DeployFailed) => p("Deployment failed", Tone::Danger, "✗"),
        Some(PlatformMessageType::RepoCreated) => p("Repository created", Tone::Success, "📦"),
        Some(PlatformMessageType::Commit) => p("Changes committed", Tone::Neutral, "●"),
        None => p("Platform", Tone::Muted, "⚙"),
    }
}

/// What a renderer receives for one message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedMessage {
    pub role: Role,
    pub text: String,
    pub icon: &'static str,
    pub kind: MessageKind,
    pub metadata: Option<MessageMetadata>,
    pub is_history: bool,
}

impl DisplayMessage {
    pub fn presentation(&self) -> Presentation {
        presentation(self.role, self.kind, self.metadata.as_ref())
    }

    pub fn title(&self) -> &'static str {
        self.presentation().title
    }

    pub fn to_rendered(&self) -> RenderedMessage {
        RenderedMessage {
            role: self.role,
            text: self.text.clone(),
            icon: self.presentation().icon,
            kind: self.kind,
            metadata: self.metadata.clone(),
            is_history: self.is_history,
        }
    }
}
