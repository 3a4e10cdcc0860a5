//! Socket messages exchanged between realtime clients and the relay.
//!
//! The protocol is small: a client authenticates with a bearer token,
//! joins project rooms, and publishes [`BoardEvent`]s which the relay fans
//! out to every other subscriber of the room.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError};
use crate::event::{BoardEvent, RoomId};
use crate::id::UserId;

/// Stable error categories a client can branch on without parsing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The referenced project, task or invitation does not exist.
    NotFound,
    /// The caller lacks the required role.
    Forbidden,
    /// Duplicate invitation, existing membership, or a used token.
    Conflict,
    /// The invitation's horizon has passed.
    Expired,
    /// Malformed input.
    Validation,
    /// Storage or transport failure.
    Unavailable,
    /// Missing or rejected credentials.
    Unauthenticated,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::Expired => "expired",
            Self::Validation => "validation",
            Self::Unavailable => "unavailable",
            Self::Unauthenticated => "unauthenticated",
        };
        f.write_str(s)
    }
}

/// Messages sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Must be the first message on a connection.
    Authenticate {
        /// Bearer token understood by the credential service.
        token: String,
    },
    /// Subscribe to a project room.
    JoinRoom {
        /// The room to join.
        room: RoomId,
    },
    /// Unsubscribe from a project room.
    LeaveRoom {
        /// The room to leave.
        room: RoomId,
    },
    /// Relay an event to the other subscribers of a room.
    Publish {
        /// Target room.
        room: RoomId,
        /// The change being announced.
        event: BoardEvent,
    },
}

/// Messages sent by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Authentication succeeded.
    Authenticated {
        /// The identity bound to this connection.
        user: UserId,
    },
    /// The connection is now subscribed to `room`.
    Joined {
        /// The joined room.
        room: RoomId,
    },
    /// The connection is no longer subscribed to `room`.
    Left {
        /// The room that was left.
        room: RoomId,
    },
    /// An event published by another subscriber or by the server.
    Event {
        /// Room the event was published to.
        room: RoomId,
        /// The change.
        event: BoardEvent,
    },
    /// A request failed.
    Error {
        /// Stable category.
        kind: ErrorKind,
        /// Human-readable description.
        reason: String,
    },
}

impl ServerMessage {
    /// Builds an error message.
    pub fn error(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self::Error {
            kind,
            reason: reason.into(),
        }
    }
}

/// Encodes a [`ClientMessage`].
///
/// # Errors
///
/// Returns [`CodecError`] if serialization fails.
pub fn encode_client(msg: &ClientMessage) -> Result<Vec<u8>, CodecError> {
    codec::encode(msg)
}

/// Decodes a [`ClientMessage`].
///
/// # Errors
///
/// Returns [`CodecError`] if the bytes are not a valid client message.
pub fn decode_client(bytes: &[u8]) -> Result<ClientMessage, CodecError> {
    codec::decode(bytes)
}

/// Encodes a [`ServerMessage`].
///
/// # Errors
///
/// Returns [`CodecError`] if serialization fails.
pub fn encode_server(msg: &ServerMessage) -> Result<Vec<u8>, CodecError> {
    codec::encode(msg)
}

/// Decodes a [`ServerMessage`].
///
/// # Errors
///
/// Returns [`CodecError`] if the bytes are not a valid server message.
pub fn decode_server(bytes: &[u8]) -> Result<ServerMessage, CodecError> {
    codec::decode(bytes)
}
