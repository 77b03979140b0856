use crate::api::ApiClient;
use crate::state::relay::{current_jump_target, SuggestionRelay};
use crate::types::{Message, Role};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Where the current turn is. Streaming text only exists while a turn is in
/// `Streaming` or `Reconciling`.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnPhase {
    Idle,
    /// Initial transcript fetch; no answer is being produced.
    Loading,
    AwaitingStream,
    Streaming {
        buffer: String,
    },
    Reconciling {
        buffer: String,
        suggestion: Option<f64>,
    },
    /// Published once when a turn fails; the session resolves to `Idle`
    /// right after and keeps the message in `last_error`.
    Errored {
        message: String,
    },
}

impl TurnPhase {
    pub fn is_idle(&self) -> bool {
        matches!(self, TurnPhase::Idle)
    }

    pub fn live_buffer(&self) -> Option<&str> {
        match self {
            TurnPhase::Streaming { buffer } | TurnPhase::Reconciling { buffer, .. } => {
                Some(buffer.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversationUpdate {
    PhaseChanged(TurnPhase),
    /// Optimistic user message appended at submit time.
    UserMessage(Message),
    Delta(String),
    Suggestion(Option<f64>),
    /// Canonical (or locally finalized) transcript after a turn or load.
    Transcript(Vec<Message>),
    TurnComplete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Another turn was in flight; nothing was sent.
    Rejected,
    Completed {
        /// False when the history fetch failed and the streamed answer was
        /// kept locally instead.
        reconciled: bool,
        suggested_timestamp: Option<f64>,
    },
}

#[derive(Debug, Clone)]
pub struct ConversationState {
    pub(super) file_id: String,
    pub(super) chat_id: Option<String>,
    pub(super) messages: Vec<Message>,
    pub(super) total_messages: u64,
    pub(super) total_tokens: u64,
    pub(super) created_at: Option<DateTime<Utc>>,
    pub(super) updated_at: Option<DateTime<Utc>>,
    pub(super) phase: TurnPhase,
    pub(super) last_error: Option<String>,
    pub(super) turn_seq: u64,
    /// Token of the turn numbered `turn_seq`; cleared together with the
    /// phase returning to `Idle`.
    pub(super) cancel: Option<CancellationToken>,
}

impl ConversationState {
    pub(super) fn new(file_id: String) -> Self {
        Self {
            file_id,
            chat_id: None,
            messages: Vec::new(),
            total_messages: 0,
            total_tokens: 0,
            created_at: None,
            updated_at: None,
            phase: TurnPhase::Idle,
            last_error: None,
            turn_seq: 0,
            cancel: None,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages the server has acknowledged.
    pub fn durable_messages(&self) -> Vec<&Message> {
        self.messages.iter().filter(|m| !m.is_local()).collect()
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn phase(&self) -> &TurnPhase {
        &self.phase
    }

    pub fn live_buffer(&self) -> Option<&str> {
        self.phase.live_buffer()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages
            .last()
            .filter(|message| message.role == Role::Assistant)
    }
}

/// Handle to one file's conversation. Clones share the same state, so a
/// renderer can read snapshots while a turn is driven elsewhere.
#[derive(Clone)]
pub struct ConversationSession {
    pub(super) client: Arc<ApiClient>,
    pub(super) state: Arc<Mutex<ConversationState>>,
    pub(super) relay: SuggestionRelay,
    pub(super) stream_idle_timeout: Duration,
}

impl ConversationSession {
    pub fn new(
        client: Arc<ApiClient>,
        file_id: impl Into<String>,
        stream_idle_timeout: Duration,
    ) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(ConversationState::new(file_id.into()))),
            relay: SuggestionRelay::new(),
            stream_idle_timeout,
        }
    }

    pub fn snapshot(&self) -> ConversationState {
        self.lock_state().clone()
    }

    pub fn phase(&self) -> TurnPhase {
        self.lock_state().phase.clone()
    }

    pub fn live_buffer(&self) -> Option<String> {
        self.lock_state().live_buffer().map(ToOwned::to_owned)
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock_state().last_error.clone()
    }

    pub fn relay(&self) -> SuggestionRelay {
        self.relay.clone()
    }

    /// Moment the jump affordance should offer right now, including for an
    /// answer that is still being reconciled.
    pub fn jump_target(&self) -> Option<f64> {
        current_jump_target(&self.lock_state(), &self.relay)
    }

    pub fn file_id(&self) -> String {
        self.lock_state().file_id.clone()
    }

    pub(super) fn lock_state(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

}
