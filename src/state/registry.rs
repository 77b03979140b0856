use super::ConversationSession;
use crate::api::ApiClient;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// One conversation per file. Sessions for different files never share
/// state, so their turns may run concurrently.
#[derive(Clone)]
pub struct SessionRegistry {
    client: Arc<ApiClient>,
    stream_idle_timeout: Duration,
    sessions: Arc<Mutex<HashMap<String, ConversationSession>>>,
}

impl SessionRegistry {
    pub fn new(client: Arc<ApiClient>, stream_idle_timeout: Duration) -> Self {
        Self {
            client,
            stream_idle_timeout,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn session(&self, file_id: &str) -> ConversationSession {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(file_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(file_id, "opening conversation");
                ConversationSession::new(
                    Arc::clone(&self.client),
                    file_id,
                    self.stream_idle_timeout,
                )
            })
            .clone()
    }

    pub fn get(&self, file_id: &str) -> Option<ConversationSession> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock_client::MockApiClient;

    fn registry() -> SessionRegistry {
        let client = ApiClient::new_mock(Arc::new(MockApiClient::new()));
        SessionRegistry::new(Arc::new(client), Duration::from_secs(5))
    }

    #[test]
    fn test_session_is_created_once_per_file() {
        let registry = registry();
        assert!(registry.is_empty());
        assert!(registry.get("f1").is_none());

        let first = registry.session("f1");
        let again = registry.session("f1");
        assert_eq!(registry.len(), 1);

        first.relay().publish(Some(12.0));
        assert_eq!(again.relay().latest(), Some(12.0));
    }

    #[test]
    fn test_sessions_for_different_files_are_independent() {
        let registry = registry();
        let a = registry.session("a");
        let b = registry.session("b");
        assert_eq!(registry.len(), 2);

        a.relay().publish(Some(5.0));
        assert_eq!(b.relay().latest(), None);
        assert_eq!(a.file_id(), "a");
        assert_eq!(b.file_id(), "b");
    }
}
