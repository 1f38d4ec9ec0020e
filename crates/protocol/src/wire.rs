// Frame classification for the sync wire protocol.
//
// Two disjoint message classes travel over one socket. Binary frames carry
// raw document update bytes with no header. Text frames carry JSON control
// messages dispatched by their `type` tag: `awareness` for presence deltas
// and `sync` for base64 update bytes on transports that cannot deliver raw
// binary (outbound, the same shape carries the handshake state vector).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{DocumentId, ParticipantId};

/// One transport-level frame, as delivered by or handed to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Binary(Vec<u8>),
    Text(String),
}

/// Structured control message carried in a text frame.
///
/// The enum is closed: recognized tags parse into their variant, any other
/// tag lands in `Unknown` instead of failing the frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Awareness {
        #[serde(rename = "documentId")]
        document_id: DocumentId,
        awareness: AwarenessDelta,
    },
    Sync {
        data: String,
    },
    #[serde(other)]
    Unknown,
}

/// Presence changes for a set of participants.
///
/// `states` carries the full current `(clock, state)` entry for every id in
/// `added` or `updated`; ids in `removed` have no entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AwarenessDelta {
    #[serde(default)]
    pub added: Vec<ParticipantId>,
    #[serde(default)]
    pub updated: Vec<ParticipantId>,
    #[serde(default)]
    pub removed: Vec<ParticipantId>,
    #[serde(default)]
    pub states: Vec<ParticipantEntry>,
}

impl AwarenessDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
            && self.states.is_empty()
    }
}

/// Full presence entry for one participant as carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantEntry {
    pub participant_id: ParticipantId,
    pub clock: u32,
    pub state: Value,
}

/// A decoded inbound frame, ready for the session to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Update bytes to merge into the local document.
    DocumentUpdate(Vec<u8>),
    /// A presence delta addressed to the named document.
    Awareness {
        document_id: DocumentId,
        delta: AwarenessDelta,
    },
    /// A well-formed control message of a kind this client does not know.
    Unknown,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed control message: {detail}")]
    Json { detail: String },
    #[error("sync payload is not valid base64: {detail}")]
    Base64 { detail: String },
}

/// Classify one inbound frame.
///
/// Binary payloads are always document updates. Text payloads are parsed as
/// JSON and dispatched by tag; a `sync` message decodes its base64 payload
/// into the same `DocumentUpdate` case as a binary frame.
pub fn decode(frame: WireFrame) -> Result<InboundMessage, ProtocolError> {
    match frame {
        WireFrame::Binary(update) => Ok(InboundMessage::DocumentUpdate(update)),
        WireFrame::Text(raw) => {
            let message: ControlMessage =
                serde_json::from_str(&raw).map_err(|error| ProtocolError::Json {
                    detail: error.to_string(),
                })?;
            match message {
                ControlMessage::Awareness {
                    document_id,
                    awareness,
                } => Ok(InboundMessage::Awareness {
                    document_id,
                    delta: awareness,
                }),
                ControlMessage::Sync { data } => {
                    let update = STANDARD.decode(data).map_err(|error| ProtocolError::Base64 {
                        detail: error.to_string(),
                    })?;
                    Ok(InboundMessage::DocumentUpdate(update))
                }
                ControlMessage::Unknown => Ok(InboundMessage::Unknown),
            }
        }
    }
}

/// Binary frame for one outbound document update.
pub fn document_update_frame(update: Vec<u8>) -> WireFrame {
    WireFrame::Binary(update)
}

/// Handshake sync request carrying the local state summary.
pub fn sync_request_frame(state_vector: &[u8]) -> Result<WireFrame, ProtocolError> {
    encode_control(&ControlMessage::Sync {
        data: STANDARD.encode(state_vector),
    })
}

/// Awareness frame addressed to the given document.
pub fn awareness_frame(
    document_id: &DocumentId,
    delta: &AwarenessDelta,
) -> Result<WireFrame, ProtocolError> {
    encode_control(&ControlMessage::Awareness {
        document_id: document_id.clone(),
        awareness: delta.clone(),
    })
}

fn encode_control(message: &ControlMessage) -> Result<WireFrame, ProtocolError> {
    let encoded = serde_json::to_string(message).map_err(|error| ProtocolError::Json {
        detail: error.to_string(),
    })?;
    Ok(WireFrame::Text(encoded))
}
