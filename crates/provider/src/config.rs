// Provider configuration: server endpoint, document identity, reconnect
// pacing. There is no file-backed config; the embedding application builds
// one of these per synchronized document.

use std::time::Duration;
use syncline_protocol::types::DocumentId;
use thiserror::Error;
use url::Url;

/// Default pause between losing a connection and dialing again.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Server endpoint. `ws`/`wss` are used as given; `http`/`https` are
    /// normalized to their WebSocket counterparts.
    pub server_url: String,
    pub document_id: DocumentId,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,
}

impl ProviderConfig {
    pub fn new(server_url: impl Into<String>, document_id: impl Into<DocumentId>) -> Self {
        Self {
            server_url: server_url.into(),
            document_id: document_id.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Resolve the WebSocket URL for this document: scheme normalized and
    /// the document id appended as a path segment.
    pub fn connect_url(&self) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.server_url).map_err(|error| ConfigError::InvalidUrl {
            url: self.server_url.clone(),
            detail: error.to_string(),
        })?;

        let replacement = match url.scheme() {
            "ws" | "wss" => None,
            "http" => Some("ws"),
            "https" => Some("wss"),
            other => {
                return Err(ConfigError::UnsupportedScheme {
                    scheme: other.to_string(),
                })
            }
        };
        if let Some(scheme) = replacement {
            url.set_scheme(scheme)
                .map_err(|()| ConfigError::InvalidUrl {
                    url: self.server_url.clone(),
                    detail: format!("cannot switch scheme to {scheme}"),
                })?;
        }

        url.path_segments_mut()
            .map_err(|()| ConfigError::InvalidUrl {
                url: self.server_url.clone(),
                detail: "URL cannot carry a document path".to_string(),
            })?
            .pop_if_empty()
            .push(self.document_id.as_str());
        Ok(url)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid server URL `{url}`: {detail}")]
    InvalidUrl { url: String, detail: String },
    #[error("unsupported server URL scheme `{scheme}` (expected ws, wss, http, or https)")]
    UnsupportedScheme { scheme: String },
}
