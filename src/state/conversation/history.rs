use super::streaming::{emit_phase, emit_stream_update, TurnTicket, UpdateSender};
use super::{ConversationSession, ConversationState, ConversationUpdate, TurnOutcome, TurnPhase};
use crate::api::TurnError;
use crate::types::{ChatHistory, Message, Role};
use std::collections::HashMap;

impl ConversationSession {
    /// Fetches the canonical transcript after `Done` and swaps it in.
    ///
    /// A failed fetch is not fatal: the streamed answer is kept as a local
    /// message so nothing already shown disappears. Cancelling while the
    /// fetch is pending fails the turn like a cancel during streaming.
    pub(super) async fn reconcile_turn(
        &self,
        ticket: &TurnTicket,
        suggestion: Option<f64>,
        stream_delta_tx: Option<&UpdateSender>,
    ) -> Result<TurnOutcome, TurnError> {
        let file_id = ticket.file_id.as_str();
        let fetched = tokio::select! {
            biased;
            _ = ticket.cancel.cancelled() => {
                self.fail_turn(ticket.seq, &TurnError::Cancelled, stream_delta_tx);
                return Err(TurnError::Cancelled);
            }
            fetched = self.client.fetch_history(file_id) => fetched,
        };

        let (reconciled, transcript) = {
            let mut state = self.lock_state();
            if state.turn_seq != ticket.seq {
                return Ok(TurnOutcome::Completed {
                    reconciled: false,
                    suggested_timestamp: suggestion,
                });
            }

            let buffer = match std::mem::replace(&mut state.phase, TurnPhase::Idle) {
                TurnPhase::Reconciling { buffer, .. } => buffer,
                _ => String::new(),
            };
            state.cancel = None;

            let reconciled = match fetched {
                Ok(history) => {
                    apply_history(&mut state, history, suggestion);
                    true
                }
                Err(error) => {
                    tracing::warn!(
                        file_id,
                        error = %error,
                        "history reconciliation failed; keeping streamed answer locally"
                    );
                    keep_streamed_answer(&mut state, buffer, suggestion);
                    false
                }
            };
            (reconciled, state.messages.clone())
        };

        tracing::info!(file_id, reconciled, "turn complete");
        emit_stream_update(stream_delta_tx, ConversationUpdate::Transcript(transcript));
        emit_phase(stream_delta_tx, TurnPhase::Idle);
        emit_stream_update(stream_delta_tx, ConversationUpdate::TurnComplete);

        Ok(TurnOutcome::Completed {
            reconciled,
            suggested_timestamp: suggestion,
        })
    }
}

/// Replaces the local sequence with the server's, then re-attaches the
/// per-turn suggestion the server does not persist.
pub(super) fn apply_history(
    state: &mut ConversationState,
    history: ChatHistory,
    suggestion: Option<f64>,
) {
    if history.file_id != state.file_id {
        tracing::warn!(
            expected = %state.file_id,
            received = %history.file_id,
            "history belongs to a different file"
        );
    }

    // The backend invents a fresh chat id for an empty history, so only a
    // populated transcript can assign one.
    let adopt_chat_id = match &state.chat_id {
        None => !history.messages.is_empty(),
        Some(existing) => {
            if *existing != history.chat_id {
                tracing::warn!(
                    kept = %existing,
                    received = %history.chat_id,
                    "server reported a different chat id; keeping the assigned one"
                );
            }
            false
        }
    };
    if adopt_chat_id {
        tracing::debug!(chat_id = %history.chat_id, "conversation assigned a chat id");
        state.chat_id = Some(history.chat_id.clone());
    }

    let known_suggestions = suggestions_by_id(&state.messages);
    let mut messages = history.messages;
    for message in &mut messages {
        if let Some(seconds) = known_suggestions.get(&message.message_id) {
            message.attach_suggestion(*seconds);
        }
    }
    if let (Some(seconds), Some(last)) = (suggestion, messages.last_mut()) {
        if last.role == Role::Assistant {
            last.attach_suggestion(seconds);
        }
    }

    state.messages = messages;
    state.total_messages = history.total_messages;
    state.total_tokens = history.total_tokens;
    state.created_at = Some(history.created_at);
    state.updated_at = Some(history.updated_at);
}

fn keep_streamed_answer(state: &mut ConversationState, buffer: String, suggestion: Option<f64>) {
    if buffer.is_empty() && suggestion.is_none() {
        return;
    }
    let mut answer = Message::local(Role::Assistant, buffer);
    answer.suggested_timestamp = suggestion;
    state.messages.push(answer);
}

/// Suggestions already attached to server-issued messages; they must survive
/// later reconciliations since the server never stores them.
fn suggestions_by_id(messages: &[Message]) -> HashMap<String, f64> {
    messages
        .iter()
        .filter(|message| !message.is_local())
        .filter_map(|message| {
            message
                .suggested_timestamp
                .map(|seconds| (message.message_id.clone(), seconds))
        })
        .collect()
}
