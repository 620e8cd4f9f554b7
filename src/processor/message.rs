//! Message shapes and routed values.
//!
//! Any `Serialize + Send + Sync + Debug + 'static` type is a [`Message`];
//! registering it on a [`Processor`](super::Processor) binds it to a wire id.
//! Inbound frames decode into an [`Inbound`], which is either a typed message
//! or, for ids with a raw handler, the undecoded payload.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::Result;
use crate::error_info::ErrorInfo;

/// A value that can travel inside an envelope.
pub trait Message: Any + Send + Sync + fmt::Debug {
    /// Serialize the payload part of the envelope.
    fn encode_payload(&self) -> Result<Vec<u8>>;

    /// Shape of the concrete type behind the trait object.
    fn shape(&self) -> MessageShape;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T> Message for T
where
    T: Serialize + Send + Sync + fmt::Debug + 'static,
{
    fn encode_payload(&self) -> Result<Vec<u8>> {
        MsgPackCodec::encode(self)
    }

    fn shape(&self) -> MessageShape {
        MessageShape::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl dyn Message {
    /// Borrow the concrete message if it has shape `M`.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }

    /// Whether the concrete message has shape `M`.
    pub fn is<M: Message>(&self) -> bool {
        self.as_any().is::<M>()
    }
}

/// Stable identity of a message type.
#[derive(Clone, Copy)]
pub struct MessageShape {
    type_id: TypeId,
    name: &'static str,
}

impl MessageShape {
    pub fn of<M: Message>() -> Self {
        Self {
            type_id: TypeId::of::<M>(),
            name: std::any::type_name::<M>(),
        }
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Type name, for logs.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn is<M: Message>(&self) -> bool {
        self.type_id == TypeId::of::<M>()
    }
}

impl PartialEq for MessageShape {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for MessageShape {}

impl fmt::Debug for MessageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageShape").field(&self.name).finish()
    }
}

impl fmt::Display for MessageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A decoded inbound message, ready for routing.
#[derive(Debug)]
pub enum Inbound {
    /// Payload decoded into the registered shape.
    Typed(Box<dyn Message>),
    /// Payload left undecoded for the id's raw handler.
    Raw { id: u32, payload: Bytes },
}

impl Inbound {
    /// Borrow the typed message, if this is one.
    pub fn as_typed(&self) -> Option<&dyn Message> {
        match self {
            Inbound::Typed(message) => Some(message.as_ref()),
            Inbound::Raw { .. } => None,
        }
    }
}

/// A response produced by application logic.
///
/// Shared so the session can keep it in its replay cache and resend it.
pub type Reply = Arc<dyn Message>;

/// What handlers return: an optional reply, or an application error.
pub type HandlerResult = std::result::Result<Option<Reply>, ErrorInfo>;

/// Wrap a message as a handler's reply.
pub fn reply<M: Message>(message: M) -> HandlerResult {
    Ok(Some(Arc::new(message)))
}
