use crate::state::ConversationState;
use crate::types::{Message, Role};
use std::sync::Arc;
use tokio::sync::watch;

/// Latest per-turn suggested timestamp, observable by anything that needs
/// to offer a "jump to moment" before the transcript carries it.
#[derive(Clone)]
pub struct SuggestionRelay {
    tx: Arc<watch::Sender<Option<f64>>>,
}

impl SuggestionRelay {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, suggestion: Option<f64>) {
        self.tx.send_replace(suggestion);
    }

    pub fn clear(&self) {
        self.publish(None);
    }

    pub fn latest(&self) -> Option<f64> {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<f64>> {
        self.tx.subscribe()
    }
}

impl Default for SuggestionRelay {
    fn default() -> Self {
        Self::new()
    }
}

/// Suggestion to show for `message`. The message's own value wins; the
/// relay only stands in for the conversation's last assistant message.
pub fn suggestion_for(message: &Message, is_last: bool, relay: &SuggestionRelay) -> Option<f64> {
    if message.suggested_timestamp.is_some() {
        return message.suggested_timestamp;
    }
    if is_last && message.role == Role::Assistant {
        relay.latest()
    } else {
        None
    }
}

/// Suggestion behind the "jump" affordance of the latest message, if any.
pub fn jump_target(messages: &[Message], relay: &SuggestionRelay) -> Option<f64> {
    messages
        .last()
        .and_then(|last| suggestion_for(last, true, relay))
}

/// Like [`jump_target`], but while a turn is streaming or reconciling the
/// in-flight answer is the last thing rendered, so the relay answers for it.
pub fn current_jump_target(state: &ConversationState, relay: &SuggestionRelay) -> Option<f64> {
    if state.live_buffer().is_some() {
        return relay.latest();
    }
    jump_target(state.messages(), relay)
}
