/// Live chat session: optimistic sends and streaming merge into the store
use crate::config::Config;
use crate::error::Result;
use crate::event::{decode_event, StreamEvent};
use crate::history::{merge_history, HistoryOrder, Prompt};
use crate::message::{ConversationKey, DisplayMessage, MessageId, MessageKind, Role};
use crate::message_store::MessageStore;
use futures_util::{Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Stops a running [`ChatSession::consume`] before its next mutation
#[derive(Debug, Clone)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

/// How a consumed stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Stream ran to its end
    Completed { applied: usize },
    /// Aborted; any placeholder is left for the caller to remove
    Aborted { applied: usize },
}

/// One conversation bound to a shared store
pub struct ChatSession {
    store: MessageStore,
    key: ConversationKey,
    placeholder_text: String,
    history_order: HistoryOrder,
    abort: AbortHandle,
    ordinal: u64,
}

impl ChatSession {
    pub fn new(store: MessageStore, key: ConversationKey, config: &Config) -> Self {
        Self {
            store,
            key,
            placeholder_text: config.placeholder_text.clone(),
            history_order: config.history_order,
            abort: AbortHandle {
                aborted: Arc::new(AtomicBool::new(false)),
            },
            ordinal: 0,
        }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn messages(&self) -> Vec<DisplayMessage> {
        self.store.get_messages(&self.key)
    }

    /// Handle for the current generation; replaced on every send
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Optimistically record a user message and show the placeholder.
    ///
    /// Starts a new generation, so handles from earlier sends no longer apply.
    pub fn send_user_message(&mut self, text: impl Into<String>) -> MessageId {
        self.abort = AbortHandle {
            aborted: Arc::new(AtomicBool::new(false)),
        };

        let id = MessageId::content(Uuid::new_v4().to_string());
        let message = DisplayMessage::new(id.clone(), Role::User, MessageKind::UserMessage, text);
        self.store.add_message(&self.key, message);
        self.show_loading(self.placeholder_text.clone());

        debug!("Optimistic send {} on {}", id, self.key);
        id
    }

    /// Undo an optimistic send whose request failed
    pub fn rollback(&self, id: &MessageId) {
        self.store.remove_message(&self.key, id);
        self.store.remove_message(&self.key, &MessageId::Placeholder);
        info!("Rolled back message {} on {}", id, self.key);
    }

    /// Set or replace the placeholder text
    pub fn show_loading(&self, text: impl Into<String>) {
        self.store
            .add_loading_message(&self.key, DisplayMessage::placeholder(text));
    }

    /// Decode one live event into the store. Returns the number of messages added.
    ///
    /// A finished (`idle`) event removes the placeholder. Does nothing once aborted.
    pub fn apply(&mut self, event: &StreamEvent) -> Result<usize> {
        if self.abort.is_aborted() {
            debug!("Ignoring event for aborted stream on {}", self.key);
            return Ok(0);
        }

        let ordinal = self.ordinal;
        self.ordinal += 1;
        let messages = decode_event(event, ordinal, false)?;
        let added = messages.len();
        for msg in messages {
            self.store.add_message(&self.key, msg);
        }

        if event.is_finished() {
            self.store.remove_message(&self.key, &MessageId::Placeholder);
        }
        Ok(added)
    }

    /// Apply events from `stream` in arrival order until it ends or the session is aborted.
    ///
    /// A transport or decode error is returned as-is; mutations made before it stay visible.
    pub async fn consume<S>(&mut self, mut stream: S) -> Result<StreamOutcome>
    where
        S: Stream<Item = Result<StreamEvent>> + Unpin,
    {
        let mut applied = 0;
        loop {
            if self.abort.is_aborted() {
                info!("Stream aborted on {} after {} messages", self.key, applied);
                return Ok(StreamOutcome::Aborted { applied });
            }
            let Some(item) = stream.next().await else {
                break;
            };
            if self.abort.is_aborted() {
                info!("Stream aborted on {} after {} messages", self.key, applied);
                return Ok(StreamOutcome::Aborted { applied });
            }

            let event = item.inspect_err(|e| warn!("Stream error on {}: {}", self.key, e))?;
            applied += self.apply(&event)?;
        }

        debug!("Stream completed on {} ({} messages)", self.key, applied);
        Ok(StreamOutcome::Completed { applied })
    }

    /// Replace the conversation with merged history. Returns the message count.
    pub fn load_history(&self, prompts: &[Prompt]) -> Result<usize> {
        let messages = merge_history(prompts, self.history_order)?;
        let count = messages.len();
        self.store.set_messages(&self.key, messages);
        info!("Loaded {} history messages into {}", count, self.key);
        Ok(count)
    }

    pub fn clear(&mut self) {
        self.store.clear_messages(&self.key);
        self.ordinal = 0;
    }
}
