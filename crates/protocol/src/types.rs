// Shared identifier types for documents and participants.
//
// Both are carried as explicit fields end to end; nothing is recovered by
// parsing connection addresses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one participant in a shared document.
///
/// This is the client id of the underlying replicated document: generated
/// fresh for every provider instance, never persisted, and not stable across
/// reconnects of the same logical user.
pub type ParticipantId = u64;

/// Identity of the shared document (the room both ends agree on).
///
/// Carried as an explicit field everywhere it matters: a constructor
/// argument, a path segment of the connection URL, and a mandatory field of
/// every awareness message. It is never reconstructed by splitting an
/// address string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
