// Frame transport behind a trait so session and provider logic test against
// an in-memory mock. The production implementation is a tokio-tungstenite
// WebSocket client.

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use syncline_protocol::wire::WireFrame;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::ConnectionError;

/// Frame-level connection owned by one session.
///
/// Implementations hold at most one underlying socket, opened by `connect`
/// and torn down by `close`. `recv` yields data frames only; keepalive and
/// close bookkeeping stay inside the transport.
pub trait Transport {
    fn connect(&mut self, url: &Url) -> impl Future<Output = Result<(), ConnectionError>> + Send;
    fn send(&mut self, frame: WireFrame) -> impl Future<Output = Result<(), ConnectionError>> + Send;
    /// Next data frame, or `None` once the peer has closed the connection.
    fn recv(&mut self) -> impl Future<Output = Result<Option<WireFrame>, ConnectionError>> + Send;
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production transport: one client WebSocket per connection attempt.
#[derive(Default)]
pub struct WsTransport {
    stream: Option<WsStream>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self { stream: None }
    }
}

impl Transport for WsTransport {
    async fn connect(&mut self, url: &Url) -> Result<(), ConnectionError> {
        let (stream, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|error| ConnectionError::Connect {
                    url: url.to_string(),
                    detail: error.to_string(),
                })?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, frame: WireFrame) -> Result<(), ConnectionError> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotConnected)?;
        let message = match frame {
            WireFrame::Binary(payload) => WsMessage::Binary(payload.into()),
            WireFrame::Text(payload) => WsMessage::Text(payload.into()),
        };
        stream
            .send(message)
            .await
            .map_err(|error| ConnectionError::Transport {
                detail: error.to_string(),
            })
    }

    async fn recv(&mut self) -> Result<Option<WireFrame>, ConnectionError> {
        let outcome = loop {
            let stream = match self.stream.as_mut() {
                Some(stream) => stream,
                None => return Ok(None),
            };
            match stream.next().await {
                Some(Ok(WsMessage::Binary(payload))) => {
                    return Ok(Some(WireFrame::Binary(payload.to_vec())))
                }
                Some(Ok(WsMessage::Text(payload))) => {
                    return Ok(Some(WireFrame::Text(payload.as_str().to_owned())))
                }
                Some(Ok(WsMessage::Ping(payload))) => {
                    if let Err(error) = stream.send(WsMessage::Pong(payload)).await {
                        break Err(ConnectionError::Transport {
                            detail: error.to_string(),
                        });
                    }
                }
                Some(Ok(WsMessage::Pong(_))) | Some(Ok(WsMessage::Frame(_))) => {}
                Some(Ok(WsMessage::Close(_))) | None => break Ok(None),
                Some(Err(error)) => {
                    break Err(ConnectionError::Transport {
                        detail: error.to_string(),
                    })
                }
            }
        };
        self.stream = None;
        outcome
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted transport for session and provider tests. Outbound frames
    /// are recorded; inbound results replay from a queue, and an exhausted
    /// queue behaves like a quiet open socket.
    #[derive(Default)]
    pub(crate) struct MockTransport {
        pub connected: bool,
        pub connect_calls: usize,
        pub connect_error: Option<String>,
        pub send_error: Option<String>,
        pub sent: Vec<WireFrame>,
        pub recv_queue: VecDeque<Result<Option<WireFrame>, String>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queue_frame(&mut self, frame: WireFrame) {
            self.recv_queue.push_back(Ok(Some(frame)));
        }

        pub fn queue_close(&mut self) {
            self.recv_queue.push_back(Ok(None));
        }

        pub fn queue_error(&mut self, detail: &str) {
            self.recv_queue.push_back(Err(detail.to_string()));
        }
    }

    impl Transport for MockTransport {
        async fn connect(&mut self, url: &Url) -> Result<(), ConnectionError> {
            self.connect_calls += 1;
            if let Some(detail) = self.connect_error.take() {
                return Err(ConnectionError::Connect {
                    url: url.to_string(),
                    detail,
                });
            }
            self.connected = true;
            Ok(())
        }

        async fn send(&mut self, frame: WireFrame) -> Result<(), ConnectionError> {
            if !self.connected {
                return Err(ConnectionError::NotConnected);
            }
            if let Some(detail) = self.send_error.take() {
                return Err(ConnectionError::Transport { detail });
            }
            self.sent.push(frame);
            Ok(())
        }

        async fn recv(&mut self) -> Result<Option<WireFrame>, ConnectionError> {
            if !self.connected {
                return Ok(None);
            }
            match self.recv_queue.pop_front() {
                Some(Ok(frame)) => Ok(frame),
                Some(Err(detail)) => Err(ConnectionError::Transport { detail }),
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {
            self.connected = false;
        }
    }
}
