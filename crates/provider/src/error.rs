use thiserror::Error;

use crate::config::ConfigError;

/// Failures opening or using the underlying connection.
///
/// Never fatal to the provider: they surface as status transitions and,
/// while the provider is meant to stay connected, a reconnect attempt.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to open connection to {url}: {detail}")]
    Connect { url: String, detail: String },
    #[error("transport error: {detail}")]
    Transport { detail: String },
    #[error("not connected")]
    NotConnected,
}

/// Failures merging received update bytes into the local document.
///
/// The offending update is dropped and logged; later frames still apply.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("update bytes failed to decode: {detail}")]
    Decode { detail: String },
    #[error("update failed to merge: {detail}")]
    Merge { detail: String },
}

/// Failures constructing a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid provider configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to register document observer: {detail}")]
    Observer { detail: String },
}
