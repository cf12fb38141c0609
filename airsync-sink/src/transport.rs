//! The sink's half of the bidirectional reliable ordered message
//! channel: a WebSocket client, abstracted behind [`SinkTransport`] so
//! the session state machine can be driven from tests without opening a
//! real socket.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::io;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::MaybeTlsStream;

/// One binary frame in, one binary frame out. `recv` returning `Ok(None)`
/// means the peer closed the channel cleanly.
#[async_trait]
pub trait SinkTransport: Send {
    async fn send(&mut self, bytes: Vec<u8>) -> io::Result<()>;
    async fn recv(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// [`SinkTransport`] over a `tokio-tungstenite` WebSocket client
/// connection, carrying each encoded message as one binary frame.
pub struct WsSinkTransport {
    socket: tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WsSinkTransport {
    pub async fn connect(url: &str) -> io::Result<Self> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::ConnectionRefused, e.to_string()))?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl SinkTransport for WsSinkTransport {
    async fn send(&mut self, bytes: Vec<u8>) -> io::Result<()> {
        self.socket
            .send(WsMessage::Binary(bytes.into()))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e.to_string()))
    }

    async fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            match self.socket.next().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
                Some(Ok(WsMessage::Binary(data))) => return Ok(Some(data.to_vec())),
                Some(Ok(WsMessage::Close(_))) => return Ok(None),
                // Ping/Pong/Text/Frame carry no protocol meaning here.
                Some(Ok(_)) => continue,
            }
        }
    }
}

/// In-memory [`SinkTransport`] pair for tests: two channel-backed ends
/// that hand messages to each other directly, with no socket involved.
pub mod duplex {
    use super::*;
    use tokio::sync::mpsc;

    pub struct ChannelTransport {
        tx: mpsc::Sender<Vec<u8>>,
        rx: mpsc::Receiver<Vec<u8>>,
    }

    #[async_trait]
    impl SinkTransport for ChannelTransport {
        async fn send(&mut self, bytes: Vec<u8>) -> io::Result<()> {
            self.tx
                .send(bytes)
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer dropped"))
        }

        async fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
            Ok(self.rx.recv().await)
        }
    }

    /// Builds a connected pair: `(a, b)` where whatever `a` sends, `b`
    /// receives, and vice versa.
    pub fn pair(capacity: usize) -> (ChannelTransport, ChannelTransport) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (ChannelTransport { tx: a_tx, rx: a_rx }, ChannelTransport { tx: b_tx, rx: b_rx })
    }
}
