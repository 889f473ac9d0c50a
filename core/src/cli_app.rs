use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::event::StreamEvent;
use crate::history::Prompt;
use crate::message::{ConversationKey, DisplayMessage};
use crate::message_store::MessageStore;
use crate::presentation::Tone;
use crate::session::{ChatSession, StreamOutcome};
use colored::*;
use std::path::Path;
use tracing::warn;

/// Transcript viewer behind the `chatline` binary.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = MessageStore::new(config.change_buffer);
    let key = ConversationKey::new(config.conversation_key.clone());
    let mut session = ChatSession::new(store, key, &config);

    if let Some(path) = &config.history_path {
        let prompts = load_prompts(path).await?;
        let count = session.load_history(&prompts)?;
        eprintln!(
            "{} Loaded {} history messages",
            "✓".green(),
            count.to_string().cyan()
        );
    }

    if let Some(path) = &config.events_path {
        let events = load_events(path, config.skip_bad_frames).await?;
        let outcome = session.consume(futures_util::stream::iter(events)).await?;
        if let StreamOutcome::Completed { applied } = outcome {
            eprintln!(
                "{} Replayed {} live messages",
                "✓".green(),
                applied.to_string().cyan()
            );
        }
    }

    println!(
        "{} {}",
        "⚡ Conversation".bright_cyan().bold(),
        session.key().as_str().cyan()
    );
    println!();
    for msg in session.messages() {
        println!("{}", render_line(&msg));
    }

    Ok(())
}

/// Read a JSON array of persisted prompts
pub async fn load_prompts(path: &Path) -> Result<Vec<Prompt>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let prompts = serde_json::from_str(&raw).map_err(ChatError::Serialization)?;
    Ok(prompts)
}

/// Read a recorded SSE stream.
///
/// Frames that fail to parse are kept as `Err` so replay stops at them, unless
/// `skip_bad_frames` is set, in which case they are dropped with a warning.
pub async fn load_events(path: &Path, skip_bad_frames: bool) -> Result<Vec<Result<StreamEvent>>> {
    let raw = tokio::fs::read(path).await?;
    let mut decoder = crate::sse::SseDecoder::new();

    let mut frames = decoder.push(&raw);
    frames.extend(decoder.finish());

    let events = frames
        .into_iter()
        .filter(|frame| match frame {
            Ok(_) => true,
            Err(_) if !skip_bad_frames => true,
            Err(e) => {
                warn!("Skipping frame in {}: {}", path.display(), e);
                false
            }
        })
        .collect();
    Ok(events)
}

/// One transcript line: coloured title, then the text. History lines are dimmed.
pub fn render_line(msg: &DisplayMessage) -> String {
    let presentation = msg.presentation();
    let title = format!("{} {}", presentation.icon, presentation.title);
    let title = match presentation.tone {
        Tone::Neutral => title.white().bold(),
        Tone::Accent => title.cyan().bold(),
        Tone::Success => title.green().bold(),
        Tone::Warning => title.yellow().bold(),
        Tone::Danger => title.red().bold(),
        Tone::Muted => title.dimmed(),
    };

    let text = if msg.is_placeholder() {
        msg.text.italic()
    } else if msg.is_history {
        msg.text.dimmed()
    } else {
        msg.text.normal()
    };
    format!("{}  {}", title, text)
}
