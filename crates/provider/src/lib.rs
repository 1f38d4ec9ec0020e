// syncline-provider: realtime sync client for shared documents.
//
// Keeps a locally-mutable replicated document consistent with a remote
// authority over a WebSocket and broadcasts ephemeral per-participant
// awareness. The embedding application owns the document; the provider
// only merges updates into it and forwards the ones it did not merge.

pub mod config;
pub mod doc;
pub mod error;
pub mod provider;
pub mod reconnect;
pub mod session;
pub mod transport;
