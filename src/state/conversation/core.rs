use super::history::apply_history;
use super::streaming::{
    emit_stream_update, validate_question, StreamStep, TurnTicket, UpdateSender,
};
use super::{ConversationSession, ConversationUpdate, TurnOutcome, TurnPhase};
use crate::api::{dispatch_frame, ApiError, ByteStream, FrameDecoder, TurnError};
use futures::StreamExt;

const ABANDONED_TURN_MESSAGE: &str = "the question was abandoned before it completed";

impl ConversationSession {
    /// Runs one question/answer turn to completion.
    ///
    /// Returns `TurnOutcome::Rejected` without touching state or the network
    /// when another turn is still in flight. Validation errors are returned
    /// before anything changes; every other error has already been applied to
    /// the conversation (phase back to `Idle`, `last_error` set) when it is
    /// returned.
    pub async fn submit(
        &self,
        question: impl Into<String>,
        stream_delta_tx: Option<&UpdateSender>,
    ) -> Result<TurnOutcome, TurnError> {
        let question = validate_question(question.into())?;
        let Some(ticket) = self.begin_turn(question, stream_delta_tx) else {
            return Ok(TurnOutcome::Rejected);
        };

        let mut guard = TurnGuard::new(self, ticket.seq);
        let result = self.run_turn(&ticket, stream_delta_tx).await;
        guard.disarm();
        result
    }

    /// Initial transcript load for a freshly opened conversation. Returns
    /// `false` if a turn is in flight.
    pub async fn load_history(
        &self,
        stream_delta_tx: Option<&UpdateSender>,
    ) -> Result<bool, ApiError> {
        let (seq, file_id) = {
            let mut state = self.lock_state();
            if !state.phase.is_idle() {
                return Ok(false);
            }
            state.turn_seq += 1;
            state.phase = TurnPhase::Loading;
            (state.turn_seq, state.file_id.clone())
        };

        let mut guard = TurnGuard::new(self, seq);
        let fetched = self.client.fetch_history(&file_id).await;
        guard.disarm();

        let transcript = {
            let mut state = self.lock_state();
            if state.turn_seq == seq {
                state.phase = TurnPhase::Idle;
            }
            let history = fetched?;
            apply_history(&mut state, history, None);
            state.messages.clone()
        };

        tracing::debug!(file_id = %file_id, messages = transcript.len(), "history loaded");
        emit_stream_update(stream_delta_tx, ConversationUpdate::Transcript(transcript));
        Ok(true)
    }

    /// Aborts the in-flight turn, if any, up to the moment its transcript is
    /// reconciled. The turn then fails with `TurnError::Cancelled`. Returns
    /// `false` when there was nothing left to cancel.
    pub fn cancel_turn(&self) -> bool {
        let token = {
            let mut state = self.lock_state();
            match state.phase {
                TurnPhase::AwaitingStream
                | TurnPhase::Streaming { .. }
                | TurnPhase::Reconciling { .. } => state.cancel.take(),
                _ => None,
            }
        };
        match token {
            Some(token) => {
                tracing::debug!("cancelling in-flight turn");
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn run_turn(
        &self,
        ticket: &TurnTicket,
        stream_delta_tx: Option<&UpdateSender>,
    ) -> Result<TurnOutcome, TurnError> {
        let streamed = match self.open_answer_stream(ticket).await {
            Ok(stream) => self.consume_stream(ticket, stream, stream_delta_tx).await,
            Err(error) => Err(error),
        };

        match streamed {
            Ok(suggestion) => self.reconcile_turn(ticket, suggestion, stream_delta_tx).await,
            Err(error) => {
                self.fail_turn(ticket.seq, &error, stream_delta_tx);
                Err(error)
            }
        }
    }

    async fn open_answer_stream(&self, ticket: &TurnTicket) -> Result<ByteStream, TurnError> {
        let open = tokio::time::timeout(
            self.stream_idle_timeout,
            self.client.open_stream(&ticket.file_id, &ticket.request),
        );

        tokio::select! {
            biased;
            _ = ticket.cancel.cancelled() => Err(TurnError::Cancelled),
            opened = open => match opened {
                Err(_elapsed) => Err(self.idle_timeout_error()),
                Ok(result) => result.map_err(TurnError::from),
            },
        }
    }

    /// Feeds the body through the decoder until a terminal event. Returns the
    /// suggestion carried by `Done`.
    async fn consume_stream(
        &self,
        ticket: &TurnTicket,
        mut stream: ByteStream,
        stream_delta_tx: Option<&UpdateSender>,
    ) -> Result<Option<f64>, TurnError> {
        let mut decoder = FrameDecoder::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = ticket.cancel.cancelled() => return Err(TurnError::Cancelled),
                next = tokio::time::timeout(self.stream_idle_timeout, stream.next()) => next,
            };

            let (frames, ended) = match next {
                Err(_elapsed) => return Err(self.idle_timeout_error()),
                Ok(Some(Err(error))) => return Err(TurnError::Transport(error)),
                Ok(Some(Ok(chunk))) => (decoder.process(&chunk), false),
                Ok(None) => (decoder.finish(), true),
            };

            for frame in frames {
                let Some(event) = dispatch_frame(frame) else {
                    continue;
                };
                match self.apply_stream_event(ticket.seq, event, stream_delta_tx) {
                    StreamStep::Continue => {}
                    StreamStep::Done(suggestion) => return Ok(suggestion),
                    StreamStep::Failed(message) => return Err(TurnError::Stream(message)),
                }
            }

            if ended {
                tracing::warn!(file_id = %ticket.file_id, "answer stream closed without a terminal event");
                return Err(TurnError::Incomplete);
            }
        }
    }

    fn idle_timeout_error(&self) -> TurnError {
        TurnError::Timeout {
            secs: self.stream_idle_timeout.as_secs(),
        }
    }

    fn abandon_turn(&self, seq: u64) {
        let token = {
            let mut state = self.lock_state();
            if state.turn_seq != seq || state.phase.is_idle() {
                return;
            }
            tracing::warn!(file_id = %state.file_id, phase = ?state.phase, "turn abandoned");
            state.phase = TurnPhase::Idle;
            state.last_error = Some(ABANDONED_TURN_MESSAGE.to_string());
            state.cancel.take()
        };
        if let Some(token) = token {
            token.cancel();
        }
    }
}

/// Restores `Idle` if the future driving a turn is dropped mid-flight.
struct TurnGuard<'a> {
    session: &'a ConversationSession,
    seq: u64,
    armed: bool,
}

impl<'a> TurnGuard<'a> {
    fn new(session: &'a ConversationSession, seq: u64) -> Self {
        Self {
            session,
            seq,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.abandon_turn(self.seq);
        }
    }
}
