//! Credential seam for channel authorization.
//!
//! The portal's auth layer owns login and token refresh; the channel only
//! needs "the current credential" at handshake time, so it consumes this
//! trait instead of a concrete storage API.

use async_trait::async_trait;
use secrecy::SecretString;

/// Supplies the opaque bearer credential used to authorize the channel.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The current credential, or `None` to connect unauthenticated.
    async fn current_token(&self) -> Option<SecretString>;
}

/// Fixed token, for tests and the diagnostic CLI.
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn current_token(&self) -> Option<SecretString> {
        Some(self.0.clone())
    }
}

/// No credential; the upgrade request carries no Authorization header.
pub struct Anonymous;

#[async_trait]
impl CredentialProvider for Anonymous {
    async fn current_token(&self) -> Option<SecretString> {
        None
    }
}
