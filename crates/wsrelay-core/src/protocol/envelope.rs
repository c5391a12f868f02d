//! Wire envelope (JSON text frames).
//!
//! Field names (`id`, `messageType`, `message`, `replyId`) are part of the
//! wire contract shared with other implementations of this protocol and must
//! not change. Optional fields are omitted entirely when absent.
//!
//! The payload is stored as `RawValue` to enable lazy decoding: the broker
//! never looks inside it, and the client only decodes it once a handler (or
//! a pending reply) is found for the message.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use uuid::Uuid;

use crate::error::{RelayError, Result};

/// Inbound envelope decoded from a text frame.
///
/// `message_type` and `message` are required; a frame missing either fails
/// with [`RelayError::MalformedEnvelope`] and is dropped by the caller.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    /// Request identifier, present only when the sender expects a reply.
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Type tag used for handler dispatch.
    #[serde(rename = "messageType")]
    pub message_type: String,
    /// Payload, opaque at this layer (lazy parsing).
    pub message: Box<RawValue>,
    /// Identifier of the request this envelope replies to.
    #[serde(rename = "replyId", default)]
    pub reply_id: Option<Uuid>,
}

/// Outbound envelope. Borrows the already-serialized payload so broadcast
/// paths serialize once.
#[derive(Debug, Serialize)]
pub struct Outbound<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(rename = "messageType")]
    pub message_type: &'a str,
    pub message: &'a RawValue,
    #[serde(rename = "replyId", skip_serializing_if = "Option::is_none")]
    pub reply_id: Option<Uuid>,
}

impl<'a> Outbound<'a> {
    /// Fire-and-forget envelope: no id, no reply binding.
    pub fn event(message_type: &'a str, message: &'a RawValue) -> Self {
        Self {
            id: None,
            message_type,
            message,
            reply_id: None,
        }
    }

    /// Envelope that expects a correlated reply.
    pub fn request(id: Uuid, message_type: &'a str, message: &'a RawValue) -> Self {
        Self {
            id: Some(id),
            message_type,
            message,
            reply_id: None,
        }
    }

    /// Reply envelope echoing the originating request id as `replyId`.
    pub fn reply(reply_id: Uuid, message_type: &'a str, message: &'a RawValue) -> Self {
        Self {
            id: None,
            message_type,
            message,
            reply_id: Some(reply_id),
        }
    }

    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| RelayError::Internal(format!("envelope encode failed: {e}")))
    }
}

/// Decode a text frame into an [`Envelope`].
///
/// Tolerant by contract: failure means the frame is dropped, not that the
/// connection dies.
pub fn decode(text: &str) -> Result<Envelope> {
    serde_json::from_str(text).map_err(|e| RelayError::MalformedEnvelope(e.to_string()))
}
