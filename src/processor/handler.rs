//! Handler contracts.
//!
//! A typed handler receives the decoded message by value plus the session it
//! arrived on. A raw handler receives the wire id and the undecoded payload.
//! Both return a [`HandlerResult`]; the session turns an `Err(ErrorInfo)`
//! into an error reply.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use bytes::Bytes;

use super::message::{HandlerResult, Message, Reply};
use crate::error::{GatewayError, Result};
use crate::session::SessionHandle;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler for one registered message shape.
pub trait Handler: Send + Sync + 'static {
    /// Handle a decoded message.
    fn call(
        &self,
        message: Box<dyn Message>,
        session: SessionHandle,
    ) -> BoxFuture<'static, Result<Option<Reply>>>;
}

/// Wrapper that downcasts the message before calling the closure.
pub struct TypedHandler<F, M, Fut>
where
    F: Fn(M, SessionHandle) -> Fut + Send + Sync + 'static,
    M: Message,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(M) -> Fut>,
}

impl<F, M, Fut> TypedHandler<F, M, Fut>
where
    F: Fn(M, SessionHandle) -> Fut + Send + Sync + 'static,
    M: Message,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, M, Fut> Handler for TypedHandler<F, M, Fut>
where
    F: Fn(M, SessionHandle) -> Fut + Send + Sync + 'static,
    M: Message,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(
        &self,
        message: Box<dyn Message>,
        session: SessionHandle,
    ) -> BoxFuture<'static, Result<Option<Reply>>> {
        let typed = match message.into_any().downcast::<M>() {
            Ok(m) => *m,
            Err(_) => {
                return Box::pin(async {
                    Err(GatewayError::ShapeMismatch {
                        expected: std::any::type_name::<M>(),
                    })
                })
            }
        };

        let fut = (self.handler)(typed, session);
        Box::pin(async move { fut.await.map_err(GatewayError::from) })
    }
}

/// Handler that takes over an id's payload without decoding it.
///
/// Implemented for any `Fn(u32, Bytes, SessionHandle) -> impl Future<Output = HandlerResult>`.
pub trait RawHandler: Send + Sync + 'static {
    fn call(
        &self,
        id: u32,
        payload: Bytes,
        session: SessionHandle,
    ) -> BoxFuture<'static, Result<Option<Reply>>>;
}

impl<F, Fut> RawHandler for F
where
    F: Fn(u32, Bytes, SessionHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(
        &self,
        id: u32,
        payload: Bytes,
        session: SessionHandle,
    ) -> BoxFuture<'static, Result<Option<Reply>>> {
        let fut = (self)(id, payload, session);
        Box::pin(async move { fut.await.map_err(GatewayError::from) })
    }
}
