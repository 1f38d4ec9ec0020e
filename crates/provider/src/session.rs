// One connection attempt: handshake, frame pump, teardown.
//
// The session owns the transport and is the only place inbound frames are
// decoded. Malformed frames are dropped here with a warning so a single bad
// frame never takes the connection down. Every physical attempt gets a
// fresh session id; reconnection is a brand-new session, never a resume.

use syncline_protocol::types::DocumentId;
use syncline_protocol::wire::{self, AwarenessDelta, InboundMessage, WireFrame};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::ConnectionError;
use crate::transport::Transport;

/// Lifecycle of one connection session.
///
/// `Connected` becomes `Synced` on the first successfully merged document
/// update; there is no shortcut from `Idle` to `Synced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Synced,
    Closed,
}

/// What a received frame means to the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Update bytes ready to merge into the local document.
    Update(Vec<u8>),
    /// Presence delta addressed to this session's document.
    Awareness(AwarenessDelta),
    /// The underlying connection is gone.
    Closed { reason: String },
}

pub struct ConnectionSession<T> {
    id: Uuid,
    document_id: DocumentId,
    pub(crate) transport: T,
    state: SessionState,
}

impl<T: Transport> ConnectionSession<T> {
    pub fn new(document_id: DocumentId, transport: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            transport,
            state: SessionState::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session currently owns a live connection.
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Connected | SessionState::Synced)
    }

    /// Open the connection and run the handshake, in its mandatory order: a
    /// sync request carrying the local state summary, then the full local
    /// presence snapshot. The remote has no memory of a prior session.
    pub async fn open(
        &mut self,
        url: &Url,
        state_vector: &[u8],
        awareness: &AwarenessDelta,
    ) -> Result<(), ConnectionError> {
        if self.is_active() {
            return Ok(());
        }

        let sync_request =
            wire::sync_request_frame(state_vector).map_err(|error| ConnectionError::Transport {
                detail: error.to_string(),
            })?;
        let presence = wire::awareness_frame(&self.document_id, awareness).map_err(|error| {
            ConnectionError::Transport {
                detail: error.to_string(),
            }
        })?;

        self.id = Uuid::new_v4();
        self.state = SessionState::Connecting;
        if let Err(error) = self.transport.connect(url).await {
            self.state = SessionState::Closed;
            return Err(error);
        }
        self.state = SessionState::Connected;
        info!(session_id = %self.id, doc = %self.document_id, "connection established");

        self.send_frame(sync_request).await?;
        self.send_frame(presence).await?;
        Ok(())
    }

    /// Forward one document update. Dropped unless the session is live.
    pub async fn send_update(&mut self, update: Vec<u8>) -> Result<(), ConnectionError> {
        if !self.is_active() {
            debug!(session_id = %self.id, "dropping outbound update while not connected");
            return Ok(());
        }
        self.send_frame(wire::document_update_frame(update)).await
    }

    /// Forward one presence delta. Dropped unless the session is live.
    pub async fn send_awareness(&mut self, delta: &AwarenessDelta) -> Result<(), ConnectionError> {
        if !self.is_active() {
            return Ok(());
        }
        match wire::awareness_frame(&self.document_id, delta) {
            Ok(frame) => self.send_frame(frame).await,
            Err(error) => {
                warn!(session_id = %self.id, error = %error, "dropping unencodable awareness frame");
                Ok(())
            }
        }
    }

    /// Receive the next meaningful event.
    ///
    /// Malformed frames, unknown control messages, and awareness frames for
    /// other documents are dropped in here; the call resolves only with a
    /// real event. Returns `Closed` once when the transport goes away.
    pub async fn recv_event(&mut self) -> SessionEvent {
        loop {
            match self.transport.recv().await {
                Ok(Some(frame)) => match wire::decode(frame) {
                    Ok(InboundMessage::DocumentUpdate(update)) => {
                        return SessionEvent::Update(update);
                    }
                    Ok(InboundMessage::Awareness { document_id, delta }) => {
                        if document_id != self.document_id {
                            warn!(
                                session_id = %self.id,
                                got = %document_id,
                                expected = %self.document_id,
                                "dropping awareness frame for another document"
                            );
                            continue;
                        }
                        return SessionEvent::Awareness(delta);
                    }
                    Ok(InboundMessage::Unknown) => {
                        debug!(session_id = %self.id, "ignoring unrecognized control message");
                    }
                    Err(error) => {
                        warn!(session_id = %self.id, error = %error, "dropping malformed frame");
                    }
                },
                Ok(None) => {
                    self.close().await;
                    return SessionEvent::Closed {
                        reason: "connection closed by peer".to_string(),
                    };
                }
                Err(error) => {
                    warn!(session_id = %self.id, error = %error, "transport failed");
                    self.close().await;
                    return SessionEvent::Closed {
                        reason: error.to_string(),
                    };
                }
            }
        }
    }

    /// Record the first successfully merged update. True exactly when this
    /// call performed the `Connected` to `Synced` transition.
    pub fn mark_synced(&mut self) -> bool {
        if self.state == SessionState::Connected {
            self.state = SessionState::Synced;
            info!(session_id = %self.id, doc = %self.document_id, "initial sync complete");
            return true;
        }
        false
    }

    /// Tear the connection down. Safe from any state, repeatedly.
    pub async fn close(&mut self) {
        if self.is_active() {
            info!(session_id = %self.id, doc = %self.document_id, "session closed");
        }
        self.transport.close().await;
        self.state = SessionState::Closed;
    }

    async fn send_frame(&mut self, frame: WireFrame) -> Result<(), ConnectionError> {
        if let Err(error) = self.transport.send(frame).await {
            warn!(session_id = %self.id, error = %error, "send failed, closing session");
            self.close().await;
            return Err(error);
        }
        Ok(())
    }
}
