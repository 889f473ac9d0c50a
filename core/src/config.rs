/// Configuration management
use crate::error::{ChatError, Result};
use crate::history::HistoryOrder;
use crate::message_store::DEFAULT_CHANGE_BUFFER;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_PLACEHOLDER: &str = "Thinking...";
const DEFAULT_CONVERSATION_KEY: &str = "default";

/// Session and viewer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Text shown in the in-progress placeholder
    pub placeholder_text: String,

    /// Ordering policy for persisted history
    pub history_order: HistoryOrder,

    /// Capacity of the store's change channel
    pub change_buffer: usize,

    /// Conversation the viewer loads into
    pub conversation_key: String,

    /// Default tracing filter when RUST_LOG is unset
    pub log_filter: String,

    /// Persisted prompts (JSON array)
    pub history_path: Option<PathBuf>,

    /// Recorded SSE stream to replay after history
    pub events_path: Option<PathBuf>,

    /// Drop unparseable SSE frames instead of stopping the replay at them
    pub skip_bad_frames: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            placeholder_text: DEFAULT_PLACEHOLDER.to_string(),
            history_order: HistoryOrder::default(),
            change_buffer: DEFAULT_CHANGE_BUFFER,
            conversation_key: DEFAULT_CONVERSATION_KEY.to_string(),
            log_filter: "warn".to_string(),
            history_path: None,
            events_path: None,
            skip_bad_frames: false,
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 2 {
            return Err(ChatError::Config(format!(
                "Usage: {} <history.json> [events.sse] [--key <name>] [--resort] [--placeholder <text>] [--log <filter>] [--skip-bad-frames]",
                args.first().map(String::as_str).unwrap_or("chatline")
            )));
        }

        let mut positional = Vec::new();
        let mut conversation_key: Option<String> = None;
        let mut placeholder_text: Option<String> = None;
        let mut history_order = HistoryOrder::default();
        let mut log_filter: Option<String> = None;
        let mut skip_bad_frames = false;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--key" => {
                    let k = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--key requires a conversation name".to_string())
                    })?;
                    conversation_key = Some(k.clone());
                    i += 2;
                }
                "--placeholder" => {
                    let t = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--placeholder requires a text argument".to_string())
                    })?;
                    placeholder_text = Some(t.clone());
                    i += 2;
                }
                "--log" => {
                    let f = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--log requires a filter argument".to_string())
                    })?;
                    log_filter = Some(f.clone());
                    i += 2;
                }
                "--skip-bad-frames" => {
                    skip_bad_frames = true;
                    i += 1;
                }
                "--resort" => {
                    history_order = HistoryOrder::Resort;
                    i += 1;
                }
                flag if flag.starts_with("--") => {
                    return Err(ChatError::Config(format!("Unknown flag: {}", flag)));
                }
                other => {
                    positional.push(PathBuf::from(other));
                    i += 1;
                }
            }
        }

        if positional.len() > 2 {
            return Err(ChatError::Config(
                "Expected at most two paths: <history.json> [events.sse]".to_string(),
            ));
        }
        let mut paths = positional.into_iter();
        let history_path = paths.next();
        let events_path = paths.next();

        let mut config = Self {
            history_path,
            events_path,
            history_order,
            skip_bad_frames,
            ..Default::default()
        };
        if let Some(k) = conversation_key {
            config.conversation_key = k;
        }
        if let Some(t) = placeholder_text {
            config.placeholder_text = t;
        }

        config.apply_env_overrides(|name| std::env::var(name).ok())?;

        // Explicit flags win over the environment
        if let Some(f) = log_filter {
            config.log_filter = f;
        }
        Ok(config)
    }

    /// Env overrides (nice for scripts)
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(text) = var("CHATLINE_PLACEHOLDER") {
            self.placeholder_text = text;
        }
        if let Some(raw) = var("CHATLINE_RESORT_HISTORY") {
            if parse_flag("CHATLINE_RESORT_HISTORY", &raw)? {
                self.history_order = HistoryOrder::Resort;
            }
        }
        if let Some(filter) = var("CHATLINE_LOG") {
            self.log_filter = filter;
        }
        if let Some(raw) = var("CHATLINE_CHANGE_BUFFER") {
            self.change_buffer = raw.parse::<usize>().map_err(|_| {
                ChatError::Config("CHATLINE_CHANGE_BUFFER must be a positive number".to_string())
            })?;
            if self.change_buffer == 0 {
                return Err(ChatError::Config(
                    "CHATLINE_CHANGE_BUFFER must be a positive number".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ChatError::Config(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}
