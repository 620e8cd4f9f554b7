//! Dedicated writer task per session.
//!
//! Replies and pushes from any task go through a [`WriterHandle`] into an
//! mpsc channel; one writer task owns the [`FrameSink`] and drains the
//! channel in batches.
//!
//! ```text
//! Session loop ─┐
//! Handler A    ─┼─► mpsc::Sender<EnvelopeParts> ─► Writer Task ─► FrameSink
//! Handler B    ─┘
//! ```
//!
//! The number of queued envelopes is capped; a sender that finds the queue
//! full waits up to the write timeout, then fails with
//! [`GatewayError::BackpressureTimeout`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Notify};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, trace};

use crate::error::{GatewayError, Result};
use crate::protocol::EnvelopeParts;
use crate::transport::FrameSink;

/// Default maximum queued envelopes per session.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 100;

/// Default time a sender waits for the queue to drain.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum envelopes handed to the sink in one call.
const MAX_BATCH_SIZE: usize = 64;

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum queued envelopes before senders have to wait.
    pub max_pending_frames: usize,
    /// How long a sender waits for room in the queue.
    pub write_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// State shared between handles and the task.
struct WriterShared {
    pending: AtomicUsize,
    closing: AtomicBool,
    close: Notify,
}

/// Handle for queueing envelopes on a session's writer task.
///
/// Cheap to clone; every clone feeds the same task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<EnvelopeParts>,
    shared: Arc<WriterShared>,
    abort: AbortHandle,
    max_pending: usize,
    max_frame_len: usize,
    timeout: Duration,
}

impl WriterHandle {
    /// Queue one envelope.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::ConnectionClosed`] once the writer is closing or gone
    /// - [`GatewayError::BackpressureTimeout`] if the queue stays full
    /// - a protocol error for envelopes longer than the transport allows
    pub async fn send(&self, frame: EnvelopeParts) -> Result<()> {
        if self.is_closed() {
            return Err(GatewayError::ConnectionClosed);
        }
        if frame.len() > self.max_frame_len {
            return Err(GatewayError::Protocol(format!(
                "message too long: {} bytes, maximum {}",
                frame.len(),
                self.max_frame_len
            )));
        }

        if self.shared.pending.load(Ordering::Acquire) >= self.max_pending {
            self.wait_for_room().await?;
        }

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(frame).await.map_err(|_| {
            self.shared.pending.fetch_sub(1, Ordering::Release);
            GatewayError::ConnectionClosed
        })
    }

    async fn wait_for_room(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_micros(100);

        loop {
            if self.shared.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }
            if self.is_closed() {
                return Err(GatewayError::ConnectionClosed);
            }
            if start.elapsed() > self.timeout {
                return Err(GatewayError::BackpressureTimeout);
            }
            tokio::time::sleep(check_interval).await;
        }
    }

    /// Queued envelopes not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Whether new envelopes are refused.
    pub fn is_closed(&self) -> bool {
        self.shared.closing.load(Ordering::Acquire) || self.tx.is_closed()
    }

    /// Stop accepting envelopes; the task writes what is queued, then shuts
    /// the sink down.
    pub fn close(&self) {
        if !self.shared.closing.swap(true, Ordering::AcqRel) {
            self.shared.close.notify_one();
        }
    }

    /// Stop the task immediately, dropping whatever is queued.
    pub fn terminate(&self) {
        self.shared.closing.store(true, Ordering::Release);
        self.abort.abort();
    }
}

impl std::fmt::Debug for WriterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterHandle")
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Spawn the writer task for `sink`.
///
/// `done` is notified when the task finishes on its own, either after a
/// graceful close or because the sink failed.
pub fn spawn_writer_task(
    sink: Box<dyn FrameSink>,
    config: WriterConfig,
    max_frame_len: usize,
    done: Arc<Notify>,
) -> (WriterHandle, JoinHandle<Result<()>>) {
    let max_pending = config.max_pending_frames.max(1);
    let (tx, rx) = mpsc::channel(max_pending);
    let shared = Arc::new(WriterShared {
        pending: AtomicUsize::new(0),
        closing: AtomicBool::new(false),
        close: Notify::new(),
    });

    let task = tokio::spawn(writer_loop(rx, sink, shared.clone(), done));

    let handle = WriterHandle {
        tx,
        shared,
        abort: task.abort_handle(),
        max_pending,
        max_frame_len,
        timeout: config.write_timeout,
    };
    (handle, task)
}

async fn writer_loop(
    rx: mpsc::Receiver<EnvelopeParts>,
    sink: Box<dyn FrameSink>,
    shared: Arc<WriterShared>,
    done: Arc<Notify>,
) -> Result<()> {
    let result = run_writer(rx, sink, &shared).await;
    shared.closing.store(true, Ordering::Release);
    if let Err(e) = &result {
        debug!("writer stopped: {}", e);
    }
    done.notify_one();
    result
}

async fn run_writer(
    mut rx: mpsc::Receiver<EnvelopeParts>,
    mut sink: Box<dyn FrameSink>,
    shared: &WriterShared,
) -> Result<()> {
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    loop {
        let first = tokio::select! {
            biased;
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = shared.close.notified() => break,
        };

        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        sink.write_batch(&batch).await?;
        batch.clear();
        shared.pending.fetch_sub(batch_size, Ordering::Release);
    }

    // Flush whatever was queued before the close.
    rx.close();
    while let Ok(frame) = rx.try_recv() {
        batch.push(frame);
        if batch.len() == MAX_BATCH_SIZE {
            sink.write_batch(&batch).await?;
            shared.pending.fetch_sub(batch.len(), Ordering::Release);
            batch.clear();
        }
    }
    if !batch.is_empty() {
        sink.write_batch(&batch).await?;
        shared.pending.fetch_sub(batch.len(), Ordering::Release);
    }

    trace!("writer drained, shutting down sink");
    sink.shutdown().await
}
