//! Wire protocol for room broadcasts.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use web_time::SystemTime;

use crate::ClientId;

/// Messages exchanged between collaborators in a document room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CollabMessage {
    /// Full normalized document text after a local edit.
    Content {
        /// Document text
        text: String,
    },

    /// Cursor position update (presence)
    Cursor {
        /// Character offset in the sender's text
        offset: usize,
        /// Display name for the cursor label
        username: SmolStr,
    },

    /// Collaborator joined the room
    Join {
        /// Display name for presence UI
        username: SmolStr,
    },

    /// Collaborator left the room
    Leave,
}

/// Versioned wire format with sender and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum WireMessage {
    V0 {
        from: ClientId,
        timestamp: u64,
        message: CollabMessage,
    },
}

/// A decoded message with sender and timestamp info.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    /// Sending client.
    pub from: ClientId,
    /// When the message was sent (micros since epoch).
    pub timestamp: u64,
    /// The decoded message.
    pub message: CollabMessage,
}

/// Error type for wire encoding.
#[derive(Debug, thiserror::Error, Diagnostic)]
#[diagnostic(code(quire::transport::wire))]
pub enum WireError {
    #[error("failed to encode message")]
    Encode(#[source] postcard::Error),
    #[error("malformed message payload")]
    Decode(#[source] postcard::Error),
}

impl CollabMessage {
    /// Wrap the message with sender info and encode to postcard bytes.
    pub fn encode(&self, from: &ClientId) -> Result<Vec<u8>, WireError> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default();
        let wire = WireMessage::V0 {
            from: from.clone(),
            timestamp,
            message: self.clone(),
        };
        postcard::to_stdvec(&wire).map_err(WireError::Encode)
    }

    /// Decode a payload produced by [`CollabMessage::encode`].
    pub fn decode(bytes: &[u8]) -> Result<ReceivedMessage, WireError> {
        let wire: WireMessage = postcard::from_bytes(bytes).map_err(WireError::Decode)?;
        let WireMessage::V0 {
            from,
            timestamp,
            message,
        } = wire;
        Ok(ReceivedMessage {
            from,
            timestamp,
            message,
        })
    }
}
