//! WebSocket transport seam.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use kestrel_markets::{ErrorKind, VenueError, VenueResult};
use tokio_tungstenite::tungstenite::Message;

/// Protocol-agnostic frame passed between the runtime and the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// One live socket.
#[async_trait]
pub trait WsSession: Send {
    async fn send(&mut self, frame: WsFrame) -> VenueResult<()>;
    /// `None` means the peer closed the stream.
    async fn next_frame(&mut self) -> Option<VenueResult<WsFrame>>;
    async fn close(&mut self);
}

/// Establishes sessions; the seam that lets tests script socket behavior.
#[async_trait]
pub trait WsTransport: Send + Sync {
    async fn connect(&self, url: &str) -> VenueResult<Box<dyn WsSession>>;
}

fn ws_error(message: impl Into<String>) -> VenueError {
    VenueError::new(ErrorKind::WebSocketDisconnected, message)
}

/// Production transport over `tokio-tungstenite` (rustls).
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

struct TungsteniteSession {
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

#[async_trait]
impl WsTransport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> VenueResult<Box<dyn WsSession>> {
        let (stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|error| ws_error(format!("connect failed: {error}")).with_cause(error))?;
        Ok(Box::new(TungsteniteSession { stream }))
    }
}

#[async_trait]
impl WsSession for TungsteniteSession {
    async fn send(&mut self, frame: WsFrame) -> VenueResult<()> {
        let message = match frame {
            WsFrame::Text(text) => Message::Text(text.into()),
            WsFrame::Binary(data) => Message::Binary(data.into()),
            WsFrame::Ping(data) => Message::Ping(data.into()),
            WsFrame::Pong(data) => Message::Pong(data.into()),
            WsFrame::Close => Message::Close(None),
        };
        self.stream
            .send(message)
            .await
            .map_err(|error| ws_error(format!("send failed: {error}")).with_cause(error))
    }

    async fn next_frame(&mut self) -> Option<VenueResult<WsFrame>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(error) => {
                    return Some(Err(
                        ws_error(format!("receive failed: {error}")).with_cause(error)
                    ))
                }
            };
            let frame = match message {
                Message::Text(text) => WsFrame::Text(text.to_string()),
                Message::Binary(data) => WsFrame::Binary(data.to_vec()),
                Message::Ping(data) => WsFrame::Ping(data.to_vec()),
                Message::Pong(data) => WsFrame::Pong(data.to_vec()),
                Message::Close(_) => WsFrame::Close,
                // Raw frames are an implementation detail of tungstenite.
                Message::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
