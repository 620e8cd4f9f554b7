//! The per-connection read loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use super::handle::SessionHandle;
use super::replay::ReplayCache;
use super::SessionServices;
use crate::error::{self, GatewayError};
use crate::processor::Reply;
use crate::protocol::expects_reply;
use crate::transport::{Connection, FrameSource};
use crate::writer::spawn_writer_task;

/// Why a session's read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Peer closed the connection.
    PeerClosed,
    /// Reading or framing failed.
    ReadFailed,
    /// An envelope could not be decoded.
    DecodeFailed,
    /// A handler raised an error with the kick flag.
    Kicked,
    /// The outbound side is gone.
    WriteFailed,
    /// Closed locally or by gateway shutdown.
    Stopped,
    /// Application code panicked.
    Fault,
}

/// One client session: a connection plus its read loop.
pub struct Session {
    handle: SessionHandle,
    source: Box<dyn FrameSource>,
    services: SessionServices,
    replay: ReplayCache,
    stop: Arc<Notify>,
    writer_task: JoinHandle<error::Result<()>>,
}

impl Session {
    /// Set up a session and spawn its writer task.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(connection: Connection, services: SessionServices) -> Self {
        let parts = connection.into_parts();
        let stop = Arc::new(Notify::new());
        let (writer, writer_task) = spawn_writer_task(
            parts.sink,
            services.writer.clone(),
            parts.max_frame_len,
            stop.clone(),
        );
        let handle = SessionHandle::new(
            services.processor.clone(),
            writer,
            parts.local_addr,
            parts.remote_addr,
            stop.clone(),
        );

        Self {
            handle,
            source: parts.source,
            services,
            replay: ReplayCache::new(),
            stop,
            writer_task,
        }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Run until the connection ends, then close it and fire `on_close`.
    ///
    /// Queued replies are flushed before this returns; a writer that cannot
    /// drain within the write timeout is aborted. A panic in handler code is
    /// contained here and ends only this session.
    pub async fn run(mut self) -> SessionEnd {
        let handle = self.handle.clone();
        let hooks = self.services.hooks.clone();
        if let Some(hooks) = &hooks {
            hooks.on_open(&handle);
        }

        let end = match AssertUnwindSafe(self.serve()).catch_unwind().await {
            Ok(end) => end,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(session = handle.id(), "session fault: {}", reason);
                SessionEnd::Fault
            }
        };
        debug!(session = handle.id(), ?end, "session ended");

        handle.close();
        let drain = self.services.writer.write_timeout;
        match tokio::time::timeout(drain, self.writer_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => debug!(session = handle.id(), "writer ended: {}", e),
            Ok(Err(_)) => {}
            Err(_) => {
                debug!(session = handle.id(), "writer did not drain, aborting");
                handle.terminate();
            }
        }
        if let Some(hooks) = &hooks {
            hooks.on_close(&handle);
        }
        end
    }

    async fn serve(&mut self) -> SessionEnd {
        let session = self.handle.id();
        let mut shutdown = self.services.shutdown.clone();

        loop {
            self.replay.trim();

            let frame = tokio::select! {
                biased;
                _ = self.stop.notified() => return SessionEnd::Stopped,
                _ = wait_for_shutdown(&mut shutdown) => return SessionEnd::Stopped,
                frame = self.source.read_frame() => frame,
            };

            let data = match frame {
                Ok(Some(data)) => data,
                Ok(None) => return SessionEnd::PeerClosed,
                Err(e) => {
                    debug!(session, "read message: {}", e);
                    return SessionEnd::ReadFailed;
                }
            };

            let (context, inbound) = match self.services.processor.decode(data) {
                Ok(decoded) => decoded,
                Err(e) => {
                    debug!(session, "unmarshal message error: {}", e);
                    return SessionEnd::DecodeFailed;
                }
            };

            if let Some(cached) = self.replay.lookup(context) {
                trace!(session, context, "replaying cached reply");
                if let Err(end) = send(&self.handle, context, &cached).await {
                    return end;
                }
                continue;
            }

            let routed = self.services.processor.route(inbound, &self.handle).await;
            match routed {
                Ok(Some(reply)) => {
                    if let Err(end) = self.deliver(context, reply).await {
                        return end;
                    }
                }
                Ok(None) => {}
                Err(GatewayError::Application(info)) => {
                    debug!(session, context, "message error: {}", info);
                    if let Some(build) = self.services.error_reply.clone() {
                        if let Err(end) = self.deliver(context, build(&info)).await {
                            return end;
                        }
                    }
                    if info.kick() {
                        return SessionEnd::Kicked;
                    }
                }
                Err(e) => debug!(session, context, "message error: {}", e),
            }
        }
    }

    /// Send a reply and remember it for duplicates.
    async fn deliver(&mut self, context: u32, reply: Reply) -> Result<(), SessionEnd> {
        if !expects_reply(context) {
            return Ok(());
        }
        send(&self.handle, context, &reply).await?;
        self.replay.insert(context, reply);
        Ok(())
    }
}

/// Queue a reply. Only a dead or stalled writer ends the session; encode
/// failures are logged and skipped.
async fn send(handle: &SessionHandle, context: u32, reply: &Reply) -> Result<(), SessionEnd> {
    match handle.reply(context, reply.as_ref()).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_write_fatal() => {
            debug!(session = handle.id(), "write message: {}", e);
            Err(SessionEnd::WriteFailed)
        }
        Err(e) => {
            let shape = reply.shape();
            error!(session = handle.id(), "marshal {} error: {}", shape, e);
            Ok(())
        }
    }
}

pub(crate) async fn wait_for_shutdown(shutdown: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = shutdown else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
