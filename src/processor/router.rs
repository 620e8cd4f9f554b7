//! Forwarding messages to an external worker.
//!
//! A [`Router`] takes a message together with its shape and the session it
//! came from, and eventually produces the reply. [`ChannelRouter`] is the
//! stock implementation: it hands each message to a worker task over a
//! bounded channel and waits for the worker's answer.
//!
//! # Example
//!
//! ```ignore
//! let (router, mut calls) = ChannelRouter::new(64);
//! processor.set_router::<Login>(Arc::new(router));
//!
//! tokio::spawn(async move {
//!     while let Some(call) = calls.recv().await {
//!         let login = call.downcast_ref::<Login>().cloned();
//!         call.respond(reply(LoginOk { name: login.unwrap().name }));
//!     }
//! });
//! ```

use tokio::sync::{mpsc, oneshot};
use tracing::trace;

use super::handler::BoxFuture;
use super::message::{HandlerResult, Message, MessageShape, Reply};
use crate::error::{GatewayError, Result};
use crate::session::SessionHandle;

/// Destination that accepts messages of one or more shapes.
pub trait Router: Send + Sync + 'static {
    fn dispatch(
        &self,
        shape: MessageShape,
        message: Box<dyn Message>,
        session: SessionHandle,
    ) -> BoxFuture<'static, Result<Option<Reply>>>;
}

/// One routed message waiting for the worker's answer.
pub struct RouterCall {
    shape: MessageShape,
    message: Box<dyn Message>,
    session: SessionHandle,
    reply_tx: oneshot::Sender<Result<Option<Reply>>>,
}

impl RouterCall {
    #[inline]
    pub fn shape(&self) -> MessageShape {
        self.shape
    }

    #[inline]
    pub fn message(&self) -> &dyn Message {
        self.message.as_ref()
    }

    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.message.downcast_ref::<M>()
    }

    /// Session the message arrived on.
    #[inline]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Answer the call. A session that has already gone away is ignored.
    pub fn respond(self, result: HandlerResult) {
        if self
            .reply_tx
            .send(result.map_err(GatewayError::from))
            .is_err()
        {
            trace!(shape = %self.shape, "router reply dropped, session gone");
        }
    }
}

impl std::fmt::Debug for RouterCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterCall")
            .field("shape", &self.shape)
            .field("message", &self.message)
            .field("session", &self.session.id())
            .finish()
    }
}

/// Router backed by a bounded mpsc channel.
#[derive(Clone)]
pub struct ChannelRouter {
    tx: mpsc::Sender<RouterCall>,
}

impl ChannelRouter {
    /// Create the router and the receiving end for the worker.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RouterCall>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Router for ChannelRouter {
    fn dispatch(
        &self,
        shape: MessageShape,
        message: Box<dyn Message>,
        session: SessionHandle,
    ) -> BoxFuture<'static, Result<Option<Reply>>> {
        let tx = self.tx.clone();
        Box::pin(async move {
            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(RouterCall {
                shape,
                message,
                session,
                reply_tx,
            })
            .await
            .map_err(|_| GatewayError::RouterClosed)?;

            reply_rx.await.map_err(|_| GatewayError::RouterClosed)?
        })
    }
}
