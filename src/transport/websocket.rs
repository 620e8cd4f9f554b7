//! WebSocket transport.
//!
//! One WebSocket message carries exactly one envelope, so no length prefix
//! is written. Binary and text messages are both accepted inbound; replies
//! always go out as binary.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{accept_async_with_config, WebSocketStream};
use tracing::trace;

use super::{Connection, FrameSink, FrameSource};
use crate::error::{GatewayError, Result};
use crate::processor::BoxFuture;
use crate::protocol::EnvelopeParts;

/// Run the server handshake on an accepted TCP stream.
///
/// The handshake must finish within `handshake_timeout`; inbound messages
/// longer than `max_frame_len` are rejected by the WebSocket layer.
pub async fn accept_websocket(
    stream: TcpStream,
    max_frame_len: usize,
    handshake_timeout: Duration,
) -> Result<Connection> {
    let local: Option<SocketAddr> = stream.local_addr().ok();
    let remote: Option<SocketAddr> = stream.peer_addr().ok();
    stream.set_nodelay(true)?;

    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_frame_len);
    config.max_frame_size = Some(max_frame_len);

    let handshake = accept_async_with_config(stream, Some(config));
    let ws = match tokio::time::timeout(handshake_timeout, handshake).await {
        Ok(ws) => ws?,
        Err(_) => {
            let reason = "websocket handshake timed out".to_string();
            return Err(GatewayError::Protocol(reason));
        }
    };

    let connection = Connection::websocket(ws, max_frame_len);
    Ok(connection.with_addrs(local, remote))
}

impl Connection {
    /// Envelope-per-message framing over an established WebSocket.
    pub fn websocket<S>(ws: WebSocketStream<S>, max_frame_len: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws.split();
        Connection::new(
            Box::new(WsSource {
                stream,
                max_frame_len,
            }),
            Box::new(WsSink { sink }),
            max_frame_len,
        )
    }
}

/// Reading half of a WebSocket connection.
pub struct WsSource<S> {
    stream: SplitStream<WebSocketStream<S>>,
    max_frame_len: usize,
}

impl<S> WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn checked(&self, data: Vec<u8>) -> Result<Option<Bytes>> {
        if data.len() > self.max_frame_len {
            return Err(GatewayError::Protocol(format!(
                "message too long: {} bytes, maximum {}",
                data.len(),
                self.max_frame_len
            )));
        }
        Ok(Some(Bytes::from(data)))
    }

    async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            let message = match self.stream.next().await {
                None => return Ok(None),
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(message)) => message,
            };

            match message {
                WsMessage::Binary(data) => return self.checked(data),
                WsMessage::Text(text) => return self.checked(text.into_bytes()),
                WsMessage::Close(_) => return Ok(None),
                other => trace!("skipping websocket control message: {:?}", other),
            }
        }
    }
}

impl<S> FrameSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn read_frame(&mut self) -> BoxFuture<'_, Result<Option<Bytes>>> {
        Box::pin(self.next_frame())
    }
}

/// Writing half of a WebSocket connection.
pub struct WsSink<S> {
    sink: SplitSink<WebSocketStream<S>, WsMessage>,
}

impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn write_batch<'a>(&'a mut self, batch: &'a [EnvelopeParts]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for frame in batch {
                self.sink.feed(WsMessage::Binary(frame.to_vec())).await?;
            }
            self.sink.flush().await?;
            Ok(())
        })
    }

    fn shutdown(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match self.sink.close().await {
                Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ByteOrder;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn pair() -> (Connection, WebSocketStream<tokio::io::DuplexStream>) {
        let (a, b) = tokio::io::duplex(4096);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        (Connection::websocket(server, 64), client)
    }

    #[tokio::test]
    async fn test_binary_and_text_become_frames() {
        let (conn, mut client) = pair().await;
        let mut parts = conn.into_parts();

        client.send(WsMessage::Binary(vec![1, 2, 3])).await.unwrap();
        client.send(WsMessage::Text("hi".into())).await.unwrap();
        client.send(WsMessage::Ping(vec![9])).await.unwrap();
        client.send(WsMessage::Binary(vec![4])).await.unwrap();

        let mut frames = Vec::new();
        for _ in 0..3 {
            frames.push(parts.source.read_frame().await.unwrap().unwrap());
        }
        assert_eq!(&frames[0][..], &[1, 2, 3]);
        assert_eq!(&frames[1][..], b"hi");
        assert_eq!(&frames[2][..], &[4]);
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let (conn, mut client) = pair().await;
        let mut parts = conn.into_parts();

        client.close(None).await.unwrap();
        assert!(parts.source.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let (conn, mut client) = pair().await;
        let mut parts = conn.into_parts();

        client.send(WsMessage::Binary(vec![0u8; 65])).await.unwrap();
        assert!(parts.source.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn test_sink_sends_one_binary_message_per_envelope() {
        let (conn, mut client) = pair().await;
        let mut parts = conn.into_parts();

        let batch = vec![
            EnvelopeParts::new(1, 2, Bytes::from_static(b"a"), ByteOrder::Big),
            EnvelopeParts::new(3, 4, Bytes::from_static(b"bc"), ByteOrder::Big),
        ];
        parts.sink.write_batch(&batch).await.unwrap();

        for expected in &batch {
            match client.next().await.unwrap().unwrap() {
                WsMessage::Binary(data) => assert_eq!(data, expected.to_vec()),
                other => panic!("unexpected: {:?}", other),
            }
        }
    }
}
