//! Bearer-token authentication.
//!
//! The relay hands the token from a client's first frame to a
//! [`CredentialService`] and binds the returned [`Principal`] to the
//! connection.

use std::collections::HashMap;

use futures_util::future::BoxFuture;

use crate::identity::Principal;

/// Errors returned by a credential service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The token is unknown, expired or malformed.
    #[error("invalid or missing credentials")]
    Unauthenticated,
    /// The credential backend could not be reached.
    #[error("credential service unavailable: {0}")]
    Unavailable(String),
}

/// Resolves bearer tokens to principals.
pub trait CredentialService: Send + Sync {
    /// Authenticates `token`.
    fn authenticate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Principal, AuthError>>;
}

/// A fixed token table, loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    tokens: HashMap<String, Principal>,
}

impl StaticCredentials {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a token.
    pub fn insert(&mut self, token: impl Into<String>, principal: Principal) {
        self.tokens.insert(token.into(), principal);
    }

    /// Every principal in the table.
    pub fn principals(&self) -> impl Iterator<Item = &Principal> {
        self.tokens.values()
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if no token is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl CredentialService for StaticCredentials {
    fn authenticate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Principal, AuthError>> {
        Box::pin(async move {
            if token.is_empty() {
                return Err(AuthError::Unauthenticated);
            }
            self.tokens
                .get(token)
                .cloned()
                .ok_or(AuthError::Unauthenticated)
        })
    }
}
