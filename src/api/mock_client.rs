use crate::api::client::{ByteStream, MockBackend};
use crate::api::ApiError;
use crate::types::{AskRequest, ChatHistory};
use bytes::Bytes;
use futures::channel::{mpsc, oneshot};
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream;
use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub enum ScriptedStream {
    Chunks(Vec<Bytes>),
    /// Chunks pushed by the test while the turn is running.
    Live(mpsc::UnboundedReceiver<Result<Bytes, ApiError>>),
    Reject(ApiError),
}

impl ScriptedStream {
    /// One chunk per payload, each framed as `data: <json>\n\n`.
    pub fn frames(payloads: &[&str]) -> Self {
        ScriptedStream::Chunks(
            payloads
                .iter()
                .map(|payload| Bytes::from(format!("data: {payload}\n\n")))
                .collect(),
        )
    }

    pub fn raw(chunks: &[&[u8]]) -> Self {
        ScriptedStream::Chunks(chunks.iter().map(|c| Bytes::copy_from_slice(c)).collect())
    }

    pub fn live() -> (mpsc::UnboundedSender<Result<Bytes, ApiError>>, Self) {
        let (tx, rx) = mpsc::unbounded();
        (tx, ScriptedStream::Live(rx))
    }
}

enum ScriptedHistory {
    Ready(Result<ChatHistory, ApiError>),
    /// Resolved by the test through the paired sender.
    Gated(oneshot::Receiver<Result<ChatHistory, ApiError>>),
}

pub fn status_error(status: StatusCode, detail: &str) -> ApiError {
    ApiError::Status {
        url: "http://localhost:8000/api/v1/mock".to_string(),
        status,
        detail: detail.to_string(),
    }
}

#[derive(Clone, Default)]
pub struct MockApiClient {
    streams: Arc<Mutex<VecDeque<ScriptedStream>>>,
    histories: Arc<Mutex<VecDeque<ScriptedHistory>>>,
    stream_requests: Arc<Mutex<Vec<(String, AskRequest)>>>,
    history_requests: Arc<Mutex<Vec<String>>>,
}

impl MockApiClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stream(&self, stream: ScriptedStream) -> &Self {
        self.streams.lock().unwrap().push_back(stream);
        self
    }

    pub fn push_history(&self, history: Result<ChatHistory, ApiError>) -> &Self {
        self.histories
            .lock()
            .unwrap()
            .push_back(ScriptedHistory::Ready(history));
        self
    }

    /// Queues a history fetch that stays pending until the returned sender
    /// fires. Dropping the sender fails the fetch.
    pub fn push_gated_history(&self) -> oneshot::Sender<Result<ChatHistory, ApiError>> {
        let (tx, rx) = oneshot::channel();
        self.histories
            .lock()
            .unwrap()
            .push_back(ScriptedHistory::Gated(rx));
        tx
    }

    pub fn stream_requests(&self) -> Vec<(String, AskRequest)> {
        self.stream_requests.lock().unwrap().clone()
    }

    pub fn history_request_count(&self) -> usize {
        self.history_requests.lock().unwrap().len()
    }
}

impl MockBackend for MockApiClient {
    fn open_stream(&self, file_id: &str, request: &AskRequest) -> Result<ByteStream, ApiError> {
        self.stream_requests
            .lock()
            .unwrap()
            .push((file_id.to_string(), request.clone()));

        let scripted = self.streams.lock().unwrap().pop_front().ok_or_else(|| {
            status_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "MockApiClient: no more streams configured",
            )
        })?;

        match scripted {
            ScriptedStream::Chunks(chunks) => {
                Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
            }
            ScriptedStream::Live(rx) => Ok(Box::pin(rx)),
            ScriptedStream::Reject(error) => Err(error),
        }
    }

    fn fetch_history(&self, file_id: &str) -> BoxFuture<'static, Result<ChatHistory, ApiError>> {
        self.history_requests
            .lock()
            .unwrap()
            .push(file_id.to_string());

        match self.histories.lock().unwrap().pop_front() {
            Some(ScriptedHistory::Ready(history)) => future::ready(history).boxed(),
            Some(ScriptedHistory::Gated(rx)) => async move {
                rx.await.unwrap_or_else(|_| {
                    Err(status_error(
                        StatusCode::SERVICE_UNAVAILABLE,
                        "MockApiClient: gated history dropped",
                    ))
                })
            }
            .boxed(),
            None => future::ready(Err(status_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "MockApiClient: no more histories configured",
            )))
            .boxed(),
        }
    }
}
