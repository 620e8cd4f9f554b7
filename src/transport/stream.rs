//! Length-prefixed framing over byte streams.
//!
//! Each envelope is preceded by a 1-, 2- or 4-byte length in the prefix's
//! byte order. Reads go through a [`FrameBuffer`]; writes hand the prefix
//! and the envelope segments to `write_vectored` without copying them into
//! one buffer.

use std::collections::VecDeque;
use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{FrameSink, FrameSource};
use crate::error::{GatewayError, Result};
use crate::processor::BoxFuture;
use crate::protocol::{EnvelopeParts, FrameBuffer, LengthPrefix};

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Reading half of a length-prefixed stream.
pub struct StreamSource<R> {
    reader: R,
    frames: FrameBuffer,
    ready: VecDeque<Bytes>,
    buf: Vec<u8>,
}

impl<R> StreamSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, prefix: LengthPrefix) -> Self {
        Self {
            reader,
            frames: FrameBuffer::new(prefix),
            ready: VecDeque::new(),
            buf: vec![0u8; READ_BUFFER_SIZE],
        }
    }

    async fn next_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }

            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                if self.frames.is_idle() {
                    return Ok(None);
                }
                return Err(GatewayError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed inside a frame",
                )));
            }

            self.ready.extend(self.frames.push(&self.buf[..n])?);
        }
    }
}

impl<R> FrameSource for StreamSource<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn read_frame(&mut self) -> BoxFuture<'_, Result<Option<Bytes>>> {
        Box::pin(self.next_frame())
    }
}

/// Writing half of a length-prefixed stream.
pub struct StreamSink<W> {
    writer: W,
    prefix: LengthPrefix,
}

impl<W> StreamSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(writer: W, prefix: LengthPrefix) -> Self {
        Self { writer, prefix }
    }

    async fn write_all_frames(&mut self, batch: &[EnvelopeParts]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let width = self.prefix.width().bytes();
        let prefixes = batch
            .iter()
            .map(|frame| self.prefix.encode(frame.len()))
            .collect::<Result<Vec<_>>>()?;

        let mut segments: Vec<&[u8]> = Vec::with_capacity(batch.len() * 4);
        for (frame, prefix) in batch.iter().zip(&prefixes) {
            segments.push(&prefix[..width]);
            segments.extend(frame.segments().into_iter().filter(|s| !s.is_empty()));
        }

        write_segments(&mut self.writer, &segments).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

impl<W> FrameSink for StreamSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn write_batch<'a>(&'a mut self, batch: &'a [EnvelopeParts]) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.write_all_frames(batch))
    }

    fn shutdown(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.writer.shutdown().await?;
            Ok(())
        })
    }
}

/// Write every segment with vectored I/O, resuming after partial writes.
async fn write_segments<W>(writer: &mut W, segments: &[&[u8]]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total: usize = segments.iter().map(|s| s.len()).sum();
    let mut written = 0;

    while written < total {
        let slices = remaining_slices(segments, written);
        let n = writer.write_vectored(&slices).await?;
        if n == 0 {
            return Err(GatewayError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        written += n;
    }
    Ok(())
}

/// IoSlices for what is left after `skip` bytes went out.
fn remaining_slices<'a>(segments: &[&'a [u8]], skip: usize) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(segments.len());
    let mut start = 0;

    for segment in segments {
        let end = start + segment.len();
        if skip < end {
            let offset = skip.saturating_sub(start);
            slices.push(IoSlice::new(&segment[offset..]));
        }
        start = end;
    }
    slices
}
