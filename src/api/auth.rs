use std::sync::{Arc, RwLock};

/// Source of the bearer token attached to every request.
///
/// Read once per request so a token refreshed elsewhere is picked up by the
/// next call.
pub trait CredentialStore: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// In-memory token holder shared between the client and whatever refreshes it.
#[derive(Clone, Default)]
pub struct SharedToken {
    token: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(normalize(token))),
        }
    }

    pub fn set(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = normalize(token);
        }
    }
}

impl CredentialStore for SharedToken {
    fn access_token(&self) -> Option<String> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }
}

fn normalize(token: Option<String>) -> Option<String> {
    token
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_token_ignores_blank_values() {
        let token = SharedToken::new(Some("   ".to_string()));
        assert_eq!(token.access_token(), None);

        token.set(Some(" abc ".to_string()));
        assert_eq!(token.access_token().as_deref(), Some("abc"));

        let clone = token.clone();
        clone.set(None);
        assert_eq!(token.access_token(), None);
    }
}
