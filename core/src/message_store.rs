/// Keyed in-memory message store with change notifications
///
/// One ordered list of messages per conversation. At most one placeholder
/// exists per list and it is always the last element.
use crate::message::{ConversationKey, DisplayMessage, MessageId, MessagePatch};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default capacity of the change channel
pub const DEFAULT_CHANGE_BUFFER: usize = 256;

/// Which store operation produced a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Set,
    Added,
    Loading,
    Updated,
    Removed,
    Cleared,
}

/// Notification sent to subscribers after a mutation completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: ConversationKey,
    pub op: StoreOp,
    /// Length of the conversation after the mutation
    pub len: usize,
}

type Conversations = HashMap<ConversationKey, Vec<DisplayMessage>>;

/// Shared message store. Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct MessageStore {
    conversations: Arc<RwLock<Conversations>>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_BUFFER)
    }
}

impl MessageStore {
    pub fn new(change_buffer: usize) -> Self {
        let (changes, _) = broadcast::channel(change_buffer.max(1));
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    // A panic while holding the lock cannot leave a list half-written, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Conversations> {
        self.conversations.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Conversations> {
        self.conversations.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, key: &ConversationKey, op: StoreOp, len: usize) {
        debug!("Store {:?} on {} (len {})", op, key, len);
        // No receivers is not an error
        let _ = self.changes.send(StoreChange {
            key: key.clone(),
            op,
            len,
        });
    }

    /// Current messages for `key`; empty if nothing was recorded
    pub fn get_messages(&self, key: &ConversationKey) -> Vec<DisplayMessage> {
        self.read().get(key).cloned().unwrap_or_default()
    }

    /// Borrow the messages for `key` without cloning them
    pub fn with_messages<R>(&self, key: &ConversationKey, f: impl FnOnce(&[DisplayMessage]) -> R) -> R {
        let guard = self.read();
        f(guard.get(key).map(Vec::as_slice).unwrap_or(&[]))
    }

    pub fn len(&self, key: &ConversationKey) -> usize {
        self.with_messages(key, <[DisplayMessage]>::len)
    }

    pub fn is_empty(&self, key: &ConversationKey) -> bool {
        self.len(key) == 0
    }

    /// Keys that currently hold a message list
    pub fn keys(&self) -> Vec<ConversationKey> {
        let mut keys: Vec<_> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Replace the whole list. A placeholder, if present, is moved to the end;
    /// only the last placeholder in `messages` is kept.
    pub fn set_messages(&self, key: &ConversationKey, messages: Vec<DisplayMessage>) {
        let mut placeholder = None;
        let mut list = Vec::with_capacity(messages.len());
        for msg in messages {
            if msg.is_placeholder() {
                if placeholder.is_some() {
                    debug!("Dropping duplicate placeholder in set_messages for {}", key);
                }
                placeholder = Some(msg);
            } else {
                list.push(msg);
            }
        }
        list.extend(placeholder);

        let len = list.len();
        self.write().insert(key.clone(), list);
        self.notify(key, StoreOp::Set, len);
    }

    /// Append a message, keeping an existing placeholder last.
    ///
    /// A placeholder passed here is routed to [`MessageStore::add_loading_message`].
    pub fn add_message(&self, key: &ConversationKey, message: DisplayMessage) {
        if message.is_placeholder() {
            self.add_loading_message(key, message);
            return;
        }

        let len = {
            let mut conversations = self.write();
            let list = conversations.entry(key.clone()).or_default();
            match list.last() {
                Some(last) if last.is_placeholder() => {
                    let at = list.len() - 1;
                    list.insert(at, message);
                }
                _ => list.push(message),
            }
            list.len()
        };
        self.notify(key, StoreOp::Added, len);
    }

    /// Upsert the trailing placeholder: replace it in place if it is last, else append.
    ///
    /// The message id is forced to [`MessageId::Placeholder`].
    pub fn add_loading_message(&self, key: &ConversationKey, mut message: DisplayMessage) {
        message.id = MessageId::Placeholder;

        let len = {
            let mut conversations = self.write();
            let list = conversations.entry(key.clone()).or_default();
            match list.last_mut() {
                Some(last) if last.is_placeholder() => *last = message,
                _ => list.push(message),
            }
            list.len()
        };
        self.notify(key, StoreOp::Loading, len);
    }

    /// Merge `patch` into the message with `id`. Returns false if no such message.
    pub fn update_message(&self, key: &ConversationKey, id: &MessageId, patch: MessagePatch) -> bool {
        let len = {
            let mut conversations = self.write();
            let Some(list) = conversations.get_mut(key) else {
                return false;
            };
            let Some(msg) = list.iter_mut().find(|m| &m.id == id) else {
                return false;
            };
            patch.apply(msg);
            list.len()
        };
        self.notify(key, StoreOp::Updated, len);
        true
    }

    /// Delete the message with `id`. Returns false if no such message.
    pub fn remove_message(&self, key: &ConversationKey, id: &MessageId) -> bool {
        let len = {
            let mut conversations = self.write();
            let Some(list) = conversations.get_mut(key) else {
                return false;
            };
            let Some(pos) = list.iter().position(|m| &m.id == id) else {
                return false;
            };
            list.remove(pos);
            list.len()
        };
        self.notify(key, StoreOp::Removed, len);
        true
    }

    /// Drop every message recorded under `key`
    pub fn clear_messages(&self, key: &ConversationKey) {
        let had_entry = self.write().remove(key).is_some();
        if had_entry {
            self.notify(key, StoreOp::Cleared, 0);
        }
    }

    /// Receive change notifications for one conversation
    pub fn subscribe(&self, key: &ConversationKey) -> Subscription {
        Subscription {
            key: key.clone(),
            rx: self.changes.subscribe(),
        }
    }
}

/// Change feed filtered to a single conversation key
pub struct Subscription {
    key: ConversationKey,
    rx: broadcast::Receiver<StoreChange>,
}

impl Subscription {
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// Wait for the next change on this key. `None` once every store handle is dropped.
    pub async fn recv(&mut self) -> Option<StoreChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.key == self.key => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Subscriber for {} lagged {} changes", self.key, n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next pending change on this key, if any, without waiting
    pub fn try_recv(&mut self) -> Option<StoreChange> {
        loop {
            match self.rx.try_recv() {
                Ok(change) if change.key == self.key => return Some(change),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Subscriber for {} lagged {} changes", self.key, n);
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}
