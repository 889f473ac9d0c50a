/// Chatline - conversation message state for streaming chat clients
///
/// Decodes backend stream events and persisted prompts into display messages
/// and keeps them in a keyed store with a single trailing placeholder.

pub mod error;
pub mod config;
pub mod message;
pub mod event;
pub mod sse;
pub mod history;
pub mod message_store;
pub mod presentation;
pub mod session;
pub mod cli_app;

pub use config::Config;
pub use error::{ChatError, Result};
pub use event::{decode, decode_event, StreamEvent};
pub use history::{merge_history, HistoryOrder, Prompt};
pub use message::{ConversationKey, DisplayMessage, MessageId, MessageKind, MessagePatch, Role};
pub use message_store::{MessageStore, StoreChange, StoreOp, Subscription};
pub use session::{AbortHandle, ChatSession, StreamOutcome};
