//! Per-connection sessions.
//!
//! A [`Session`] owns one connection's read loop: it decodes envelopes,
//! answers duplicates from its replay cache, routes everything else through
//! the [`Processor`], and turns application errors into error replies.
//! Everything outside the loop talks to the session through a
//! [`SessionHandle`].

mod agent;
mod handle;
mod replay;

use std::sync::Arc;

use tokio::sync::watch;

use crate::error_info::ErrorInfo;
use crate::processor::{Message, Processor, Reply};
use crate::writer::WriterConfig;

pub(crate) use agent::wait_for_shutdown;
pub use agent::{Session, SessionEnd};
pub use handle::SessionHandle;
pub use replay::{ReplayCache, ReplayEntry, REPLAY_CAPACITY};

/// Lifecycle callbacks, run once per session.
///
/// Both default to doing nothing.
pub trait SessionHooks: Send + Sync + 'static {
    /// Called before the first message is read.
    fn on_open(&self, _session: &SessionHandle) {}

    /// Called after the read loop ended and the close was requested.
    fn on_close(&self, _session: &SessionHandle) {}
}

/// Builds the reply sent for an application error.
pub type ErrorReplyFn = Arc<dyn Fn(&ErrorInfo) -> Reply + Send + Sync>;

/// Everything a session needs besides its connection.
#[derive(Clone)]
pub struct SessionServices {
    pub(crate) processor: Arc<Processor>,
    pub(crate) hooks: Option<Arc<dyn SessionHooks>>,
    pub(crate) error_reply: Option<ErrorReplyFn>,
    pub(crate) writer: WriterConfig,
    pub(crate) shutdown: Option<watch::Receiver<bool>>,
}

impl SessionServices {
    pub fn new(processor: Arc<Processor>) -> Self {
        Self {
            processor,
            hooks: None,
            error_reply: None,
            writer: WriterConfig::default(),
            shutdown: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Reply with `build(&err)` whenever a handler fails with an [`ErrorInfo`].
    pub fn with_error_reply<F, M>(mut self, build: F) -> Self
    where
        F: Fn(&ErrorInfo) -> M + Send + Sync + 'static,
        M: Message,
    {
        let reply_for = move |err: &ErrorInfo| Arc::new(build(err)) as Reply;
        self.error_reply = Some(Arc::new(reply_for));
        self
    }

    pub fn with_writer_config(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }

    /// End the session when the watched value turns `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn processor(&self) -> &Arc<Processor> {
        &self.processor
    }
}

impl std::fmt::Debug for SessionServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionServices")
            .field("processor", &self.processor)
            .field("hooks", &self.hooks.is_some())
            .field("error_reply", &self.error_reply.is_some())
            .field("writer", &self.writer)
            .finish()
    }
}
