use secrecy::{ExposeSecret, SecretString};
use std::sync::{PoisonError, RwLock};

/// Read-only view of the session token. The core never writes tokens;
/// login and refresh belong to whoever owns the provider.
pub trait CredentialProvider: Send + Sync {
    fn token(&self) -> Option<SecretString>;

    fn has_token(&self) -> bool {
        self.token().is_some()
    }
}

/// A fixed token, e.g. a service key.
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }
}

impl CredentialProvider for StaticToken {
    fn token(&self) -> Option<SecretString> {
        Some(copy_secret(&self.0))
    }
}

/// Token slot filled in by the login flow and cleared on logout.
#[derive(Default)]
pub struct SessionCredentials {
    slot: RwLock<Option<SecretString>>,
}

impl SessionCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let credentials = Self::new();
        credentials.set(token);
        credentials
    }

    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = (!token.trim().is_empty()).then(|| SecretString::new(token));
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl CredentialProvider for SessionCredentials {
    fn token(&self) -> Option<SecretString> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(copy_secret)
    }
}

/// Always unauthenticated.
pub struct NoCredentials;

impl CredentialProvider for NoCredentials {
    fn token(&self) -> Option<SecretString> {
        None
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::new(secret.expose_secret().clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token() {
        let provider = StaticToken::new("abc");
        assert_eq!(provider.token().unwrap().expose_secret(), "abc");
    }

    #[test]
    fn test_session_credentials_lifecycle() {
        let provider = SessionCredentials::new();
        assert!(!provider.has_token());

        provider.set("t-1");
        assert_eq!(provider.token().unwrap().expose_secret(), "t-1");

        provider.set("t-2");
        assert_eq!(provider.token().unwrap().expose_secret(), "t-2");

        provider.clear();
        assert!(provider.token().is_none());
    }

    #[test]
    fn test_blank_token_counts_as_missing() {
        let provider = SessionCredentials::with_token("   ");
        assert!(!provider.has_token());
    }

    #[test]
    fn test_no_credentials() {
        assert!(NoCredentials.token().is_none());
    }

    #[test]
    fn test_debug_does_not_leak_token() {
        let token = StaticToken::new("super-secret").token().unwrap();
        assert!(!format!("{token:?}").contains("super-secret"));
    }
}
