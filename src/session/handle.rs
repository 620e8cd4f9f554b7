//! Shareable handle to a live session.

use std::any::Any;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::Notify;

use crate::error::Result;
use crate::processor::{Message, Processor};
use crate::protocol::NO_REPLY_CONTEXT;
use crate::writer::WriterHandle;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

type Attachment = Arc<dyn Any + Send + Sync>;

struct SessionInner {
    id: u64,
    processor: Arc<Processor>,
    writer: WriterHandle,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
    attachment: RwLock<Option<Attachment>>,
    stop: Arc<Notify>,
}

/// Handle to one client session.
///
/// Cheap to clone and safe to use from any task: handlers get one, hooks
/// get one, and application code may keep one to push messages later.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl SessionHandle {
    pub(crate) fn new(
        processor: Arc<Processor>,
        writer: WriterHandle,
        local_addr: Option<SocketAddr>,
        remote_addr: Option<SocketAddr>,
        stop: Arc<Notify>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                processor,
                writer,
                local_addr,
                remote_addr,
                attachment: RwLock::new(None),
                stop,
            }),
        }
    }

    /// Process-unique session number, for logs.
    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Encode `message` under `context` and queue it.
    pub async fn reply(&self, context: u32, message: &dyn Message) -> Result<()> {
        let parts = self.inner.processor.encode(context, message)?;
        self.inner.writer.send(parts).await
    }

    /// Send an unsolicited message (context 0).
    pub async fn push(&self, message: &dyn Message) -> Result<()> {
        self.reply(NO_REPLY_CONTEXT, message).await
    }

    /// Close gracefully: queued messages are written first, then the
    /// connection is shut down and the read loop ends.
    pub fn close(&self) {
        self.inner.writer.close();
    }

    /// Close immediately, discarding queued messages.
    pub fn terminate(&self) {
        self.inner.writer.terminate();
        self.inner.stop.notify_one();
    }

    /// Whether the session no longer accepts outbound messages.
    pub fn is_closed(&self) -> bool {
        self.inner.writer.is_closed()
    }

    #[inline]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr
    }

    #[inline]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    pub fn processor(&self) -> &Arc<Processor> {
        &self.inner.processor
    }

    /// Attached application value, if one of type `T` is set.
    pub fn attachment<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let slot = self
            .inner
            .attachment
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slot.clone().and_then(|value| value.downcast::<T>().ok())
    }

    /// Replace the attached value.
    pub fn set_attachment<T: Any + Send + Sync>(&self, value: T) {
        let mut slot = self
            .inner
            .attachment
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::new(value));
    }

    /// Remove and return the attached value.
    pub fn take_attachment(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner
            .attachment
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.inner.id)
            .field("remote_addr", &self.inner.remote_addr)
            .field("writer", &self.inner.writer)
            .finish()
    }
}
