//! Message registry, codec binding and routing.

mod handler;
mod message;
mod registry;
mod router;

pub use handler::{BoxFuture, Handler, RawHandler, TypedHandler};
pub use message::{reply, HandlerResult, Inbound, Message, MessageShape, Reply};
pub use registry::Processor;
pub use router::{ChannelRouter, Router, RouterCall};
