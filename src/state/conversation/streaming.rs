use super::{ConversationSession, ConversationUpdate, TurnPhase};
use crate::api::TurnError;
use crate::types::{AskRequest, Message, Role, StreamEvent, MAX_QUESTION_CHARS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub type UpdateSender = mpsc::UnboundedSender<ConversationUpdate>;

/// Everything the driver needs for one accepted turn.
pub(super) struct TurnTicket {
    pub(super) seq: u64,
    pub(super) file_id: String,
    pub(super) request: AskRequest,
    pub(super) cancel: CancellationToken,
}

pub(super) enum StreamStep {
    Continue,
    Done(Option<f64>),
    Failed(String),
}

impl ConversationSession {
    /// Accepts a turn only from `Idle`; returns `None` when one is already in
    /// flight.
    pub(super) fn begin_turn(
        &self,
        question: String,
        stream_delta_tx: Option<&UpdateSender>,
    ) -> Option<TurnTicket> {
        let (ticket, user_message) = {
            let mut state = self.lock_state();
            if !state.phase.is_idle() {
                tracing::debug!(
                    file_id = %state.file_id,
                    phase = ?state.phase,
                    "rejecting submit while a turn is in flight"
                );
                return None;
            }

            let user_message = Message::local(Role::User, question.clone());
            state.messages.push(user_message.clone());
            state.last_error = None;
            state.phase = TurnPhase::AwaitingStream;
            state.turn_seq += 1;

            let ticket = TurnTicket {
                seq: state.turn_seq,
                file_id: state.file_id.clone(),
                request: AskRequest {
                    question,
                    chat_id: state.chat_id.clone(),
                },
                cancel: CancellationToken::new(),
            };
            state.cancel = Some(ticket.cancel.clone());
            (ticket, user_message)
        };

        self.relay.clear();

        tracing::info!(
            file_id = %ticket.file_id,
            chat_id = ticket.request.chat_id.as_deref().unwrap_or("<new>"),
            "submitting question"
        );
        emit_stream_update(stream_delta_tx, ConversationUpdate::UserMessage(user_message));
        emit_stream_update(stream_delta_tx, ConversationUpdate::Suggestion(None));
        emit_phase(stream_delta_tx, TurnPhase::AwaitingStream);
        Some(ticket)
    }

    pub(super) fn apply_stream_event(
        &self,
        seq: u64,
        event: StreamEvent,
        stream_delta_tx: Option<&UpdateSender>,
    ) -> StreamStep {
        match event {
            StreamEvent::ContentDelta { text } => {
                let entered_streaming = {
                    let mut state = self.lock_state();
                    if state.turn_seq != seq {
                        return StreamStep::Continue;
                    }
                    if matches!(state.phase, TurnPhase::AwaitingStream) {
                        let phase = TurnPhase::Streaming {
                            buffer: text.clone(),
                        };
                        state.phase = phase.clone();
                        Some(phase)
                    } else if let TurnPhase::Streaming { buffer } = &mut state.phase {
                        buffer.push_str(&text);
                        None
                    } else {
                        tracing::warn!(phase = ?state.phase, "content delta outside of a streaming turn");
                        return StreamStep::Continue;
                    }
                };

                if let Some(phase) = entered_streaming {
                    emit_phase(stream_delta_tx, phase);
                }
                if !text.is_empty() {
                    emit_stream_update(stream_delta_tx, ConversationUpdate::Delta(text));
                }
                StreamStep::Continue
            }
            StreamEvent::Done {
                suggested_timestamp,
            } => {
                let phase = {
                    let mut state = self.lock_state();
                    if state.turn_seq != seq {
                        return StreamStep::Continue;
                    }
                    let buffer = match std::mem::replace(&mut state.phase, TurnPhase::Idle) {
                        TurnPhase::Streaming { buffer } => buffer,
                        _ => String::new(),
                    };
                    state.phase = TurnPhase::Reconciling {
                        buffer,
                        suggestion: suggested_timestamp,
                    };
                    state.phase.clone()
                };

                if suggested_timestamp.is_some() {
                    self.relay.publish(suggested_timestamp);
                    emit_stream_update(
                        stream_delta_tx,
                        ConversationUpdate::Suggestion(suggested_timestamp),
                    );
                }
                emit_phase(stream_delta_tx, phase);
                StreamStep::Done(suggested_timestamp)
            }
            StreamEvent::Error { message } => StreamStep::Failed(message),
        }
    }

    /// Ends a turn that never completed. Persisted messages and the
    /// optimistic question stay; the partial answer and its suggestion are
    /// dropped.
    pub(super) fn fail_turn(
        &self,
        seq: u64,
        error: &TurnError,
        stream_delta_tx: Option<&UpdateSender>,
    ) {
        let message = error.to_string();
        {
            let mut state = self.lock_state();
            if state.turn_seq != seq {
                return;
            }
            let discarded = state.live_buffer().map_or(0, str::len);
            tracing::warn!(
                file_id = %state.file_id,
                discarded_bytes = discarded,
                error = %message,
                "turn failed"
            );
            state.last_error = Some(message.clone());
            state.phase = TurnPhase::Idle;
            state.cancel = None;
        }
        if self.relay.latest().is_some() {
            self.relay.clear();
            emit_stream_update(stream_delta_tx, ConversationUpdate::Suggestion(None));
        }

        emit_phase(stream_delta_tx, TurnPhase::Errored { message });
        emit_phase(stream_delta_tx, TurnPhase::Idle);
    }
}

/// Trims and bounds a question before anything is mutated.
pub(super) fn validate_question(question: String) -> Result<String, TurnError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(TurnError::EmptyQuestion);
    }
    if trimmed.chars().count() > MAX_QUESTION_CHARS {
        return Err(TurnError::QuestionTooLong {
            max: MAX_QUESTION_CHARS,
        });
    }
    Ok(trimmed.to_string())
}

pub(super) fn emit_stream_update(
    stream_delta_tx: Option<&UpdateSender>,
    update: ConversationUpdate,
) {
    if let Some(tx) = stream_delta_tx {
        let _ = tx.send(update);
    }
}

pub(super) fn emit_phase(stream_delta_tx: Option<&UpdateSender>, phase: TurnPhase) {
    emit_stream_update(stream_delta_tx, ConversationUpdate::PhaseChanged(phase));
}
