//! Transport module - how envelopes reach the socket.
//!
//! A session only sees two halves:
//! - [`FrameSource`]: yields one envelope per call, `None` on orderly close
//! - [`FrameSink`]: writes batches of envelopes, then shuts down
//!
//! Two transports are provided:
//! - length-prefixed byte streams (TCP, or any `AsyncRead + AsyncWrite`)
//! - WebSocket, one binary message per envelope

mod stream;
mod websocket;

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::Result;
use crate::processor::BoxFuture;
use crate::protocol::{EnvelopeParts, LengthPrefix};

pub use stream::{StreamSink, StreamSource};
pub use websocket::{accept_websocket, WsSink, WsSource};

/// Read half of a connection.
pub trait FrameSource: Send + 'static {
    /// Read the next complete envelope.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection cleanly.
    fn read_frame(&mut self) -> BoxFuture<'_, Result<Option<Bytes>>>;
}

/// Write half of a connection.
pub trait FrameSink: Send + 'static {
    /// Write every envelope of `batch`, in order, and flush.
    fn write_batch<'a>(&'a mut self, batch: &'a [EnvelopeParts]) -> BoxFuture<'a, Result<()>>;

    /// Flush and close the write direction.
    fn shutdown(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// An accepted connection, split into its halves.
pub struct Connection {
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
    max_frame_len: usize,
}

impl Connection {
    /// Assemble a connection from custom halves.
    pub fn new(
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        max_frame_len: usize,
    ) -> Self {
        Self {
            source,
            sink,
            local_addr: None,
            remote_addr: None,
            max_frame_len,
        }
    }

    /// Attach socket addresses for [`SessionHandle`](crate::session::SessionHandle) queries.
    pub fn with_addrs(mut self, local: Option<SocketAddr>, remote: Option<SocketAddr>) -> Self {
        self.local_addr = local;
        self.remote_addr = remote;
        self
    }

    /// Length-prefixed framing over any byte stream.
    ///
    /// Handy with `tokio::io::duplex` in tests.
    pub fn from_stream<S>(stream: S, prefix: LengthPrefix) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(
            Box::new(StreamSource::new(reader, prefix)),
            Box::new(StreamSink::new(writer, prefix)),
            prefix.max_len() as usize,
        )
    }

    /// Length-prefixed framing over an accepted TCP stream.
    pub fn tcp(stream: TcpStream, prefix: LengthPrefix) -> Result<Self> {
        let local = stream.local_addr().ok();
        let remote = stream.peer_addr().ok();
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        Ok(Self::new(
            Box::new(StreamSource::new(reader, prefix)),
            Box::new(StreamSink::new(writer, prefix)),
            prefix.max_len() as usize,
        )
        .with_addrs(local, remote))
    }

    #[inline]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    #[inline]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Largest envelope either direction accepts.
    #[inline]
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    pub(crate) fn into_parts(self) -> ConnectionParts {
        ConnectionParts {
            source: self.source,
            sink: self.sink,
            local_addr: self.local_addr,
            remote_addr: self.remote_addr,
            max_frame_len: self.max_frame_len,
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("local_addr", &self.local_addr)
            .field("remote_addr", &self.remote_addr)
            .field("max_frame_len", &self.max_frame_len)
            .finish()
    }
}

pub(crate) struct ConnectionParts {
    pub source: Box<dyn FrameSource>,
    pub sink: Box<dyn FrameSink>,
    pub local_addr: Option<SocketAddr>,
    pub remote_addr: Option<SocketAddr>,
    pub max_frame_len: usize,
}
