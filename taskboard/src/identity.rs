//! Who is calling: email addresses, authenticated principals, and callers.

use std::fmt;

use serde::{Deserialize, Serialize};
use taskboard_proto::id::UserId;

use crate::events::ConnectionId;

/// Error returned when an email address is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid email address: {0:?}")]
pub struct EmailError(pub String);

/// A normalized (trimmed, lowercased) email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Parses and normalizes an address.
    ///
    /// Requires exactly one `@`, a non-empty local part, and a domain
    /// containing a dot that neither starts nor ends the domain.
    ///
    /// # Errors
    ///
    /// Returns [`EmailError`] if the address does not look like `local@domain.tld`.
    pub fn parse(raw: &str) -> Result<Self, EmailError> {
        let normalized = raw.trim().to_lowercase();
        let valid = match normalized.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
                    && !normalized.chars().any(char::is_whitespace)
            }
            None => false,
        };
        if valid {
            Ok(Self(normalized))
        } else {
            Err(EmailError(raw.to_string()))
        }
    }

    /// The normalized address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

/// An identity vouched for by the credential service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable user identity.
    pub id: UserId,
    /// Verified email address.
    pub email: Email,
    /// Display name.
    pub name: String,
}

/// The principal on whose behalf a board operation runs, plus the realtime
/// connection it came from (excluded from the resulting broadcast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// The authenticated principal.
    pub principal: Principal,
    /// Originating realtime connection, if any.
    pub origin: Option<ConnectionId>,
}

impl Caller {
    /// A caller without a realtime connection.
    #[must_use]
    pub const fn new(principal: Principal) -> Self {
        Self {
            principal,
            origin: None,
        }
    }

    /// Marks the realtime connection the request came from.
    #[must_use]
    pub const fn with_origin(mut self, origin: ConnectionId) -> Self {
        self.origin = Some(origin);
        self
    }

    /// The caller's identity.
    #[must_use]
    pub const fn user(&self) -> UserId {
        self.principal.id
    }

    /// The caller's verified email.
    #[must_use]
    pub const fn email(&self) -> &Email {
        &self.principal.email
    }
}
