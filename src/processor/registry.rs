//! Message registry and router.
//!
//! The [`Processor`] maps message shapes to 32-bit wire ids, decodes inbound
//! envelopes into registered shapes, routes them to a handler, raw handler,
//! or [`Router`], and encodes outbound replies.
//!
//! Registration takes `&mut self`; once the processor is wrapped in an
//! `Arc` and handed to the gateway it is read-only and safe to share
//! between sessions.
//!
//! # Example
//!
//! ```
//! use gatewire::processor::{reply, Processor};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Ping {}
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Pong {}
//!
//! let mut processor = Processor::new();
//! processor.register::<Ping>(1);
//! processor.register::<Pong>(2);
//! processor.set_handler(|_: Ping, _session| async { reply(Pong {}) });
//!
//! assert_eq!(processor.id_of::<Pong>(), Some(2));
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use super::handler::{Handler, RawHandler, TypedHandler};
use super::message::{HandlerResult, Inbound, Message, MessageShape, Reply};
use super::router::Router;
use crate::codec::MsgPackCodec;
use crate::error::{GatewayError, Result};
use crate::protocol::{ByteOrder, EnvelopeHeader, EnvelopeParts, ENVELOPE_HEADER_SIZE};
use crate::session::SessionHandle;

type DecodeFn = fn(&[u8]) -> Result<Box<dyn Message>>;

fn decode_as<M>(payload: &[u8]) -> Result<Box<dyn Message>>
where
    M: Message + DeserializeOwned,
{
    let message: M = MsgPackCodec::decode(payload)?;
    Ok(Box::new(message))
}

/// Registration entry for one wire id.
struct MessageInfo {
    shape: MessageShape,
    decode: DecodeFn,
    handler: Option<Box<dyn Handler>>,
    router: Option<Arc<dyn Router>>,
    raw_handler: Option<Box<dyn RawHandler>>,
}

/// Registry of message shapes, wire ids and their routes.
pub struct Processor {
    order: ByteOrder,
    infos: HashMap<u32, MessageInfo>,
    ids: HashMap<TypeId, u32>,
}

impl Processor {
    /// Create an empty processor using big-endian headers.
    pub fn new() -> Self {
        Self {
            order: ByteOrder::Big,
            infos: HashMap::new(),
            ids: HashMap::new(),
        }
    }

    /// Byte order used for envelope headers.
    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.order = order;
    }

    /// Bind message shape `M` to wire id `id`.
    ///
    /// # Panics
    ///
    /// Panics if `M` is already registered, or if `id` is already bound to
    /// another shape. Both are setup bugs.
    pub fn register<M>(&mut self, id: u32)
    where
        M: Message + DeserializeOwned,
    {
        let shape = MessageShape::of::<M>();
        if let Some(existing) = self.ids.get(&shape.type_id()) {
            panic!(
                "message {} is already registered with id {}",
                shape, existing
            );
        }
        if let Some(existing) = self.infos.get(&id) {
            panic!(
                "message id {} is already registered to {}",
                id, existing.shape
            );
        }

        self.infos.insert(
            id,
            MessageInfo {
                shape,
                decode: decode_as::<M>,
                handler: None,
                router: None,
                raw_handler: None,
            },
        );
        self.ids.insert(shape.type_id(), id);
    }

    /// Attach a typed handler to registered shape `M`.
    ///
    /// # Panics
    ///
    /// Panics if `M` is not registered.
    pub fn set_handler<M, F, Fut>(&mut self, handler: F)
    where
        M: Message,
        F: Fn(M, SessionHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.info_mut::<M>().handler = Some(Box::new(TypedHandler::new(handler)));
    }

    /// Forward registered shape `M` to `router`.
    ///
    /// # Panics
    ///
    /// Panics if `M` is not registered.
    pub fn set_router<M: Message>(&mut self, router: Arc<dyn Router>) {
        self.info_mut::<M>().router = Some(router);
    }

    /// Take over wire id `id` with a handler that receives the raw payload.
    ///
    /// Payloads for this id are no longer decoded.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered.
    pub fn set_raw_handler<F, Fut>(&mut self, id: u32, handler: F)
    where
        F: Fn(u32, Bytes, SessionHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        match self.infos.get_mut(&id) {
            Some(info) => info.raw_handler = Some(Box::new(handler)),
            None => panic!("message id {} not registered", id),
        }
    }

    fn info_mut<M: Message>(&mut self) -> &mut MessageInfo {
        let shape = MessageShape::of::<M>();
        let info = self
            .ids
            .get(&shape.type_id())
            .and_then(|id| self.infos.get_mut(id));
        match info {
            Some(info) => info,
            None => panic!("message {} not registered", shape),
        }
    }

    /// Wire id of shape `M`, if registered.
    pub fn id_of<M: Message>(&self) -> Option<u32> {
        self.ids.get(&TypeId::of::<M>()).copied()
    }

    /// Shape bound to `id`, if any.
    pub fn shape_of(&self, id: u32) -> Option<MessageShape> {
        self.infos.get(&id).map(|info| info.shape)
    }

    /// Visit every registration as `(id, shape)`.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(u32, MessageShape),
    {
        for (&id, info) in &self.infos {
            f(id, info.shape);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Decode one envelope into `(context, message)`.
    ///
    /// Ids with a raw handler come back as [`Inbound::Raw`] without their
    /// payload being decoded.
    ///
    /// # Errors
    ///
    /// - envelope shorter than the 8-byte header
    /// - [`GatewayError::UnknownMessageId`] for an unregistered id
    /// - payload that does not decode into the registered shape
    pub fn decode(&self, data: Bytes) -> Result<(u32, Inbound)> {
        let header = EnvelopeHeader::decode(&data, self.order)?;
        let info = self
            .infos
            .get(&header.id)
            .ok_or(GatewayError::UnknownMessageId {
                context: header.context,
                id: header.id,
            })?;

        let payload = data.slice(ENVELOPE_HEADER_SIZE..);
        if info.raw_handler.is_some() {
            return Ok((
                header.context,
                Inbound::Raw {
                    id: header.id,
                    payload,
                },
            ));
        }

        let message = (info.decode)(&payload)?;
        Ok((header.context, Inbound::Typed(message)))
    }

    /// Deliver a decoded message to its route.
    ///
    /// Order: raw handler, then typed handler, then router. A registered
    /// shape with none of them yields `Ok(None)`.
    pub async fn route(&self, inbound: Inbound, session: &SessionHandle) -> Result<Option<Reply>> {
        match inbound {
            Inbound::Raw { id, payload } => {
                let info = self
                    .infos
                    .get(&id)
                    .ok_or(GatewayError::UnregisteredId(id))?;
                match &info.raw_handler {
                    Some(handler) => handler.call(id, payload, session.clone()).await,
                    None => Ok(None),
                }
            }
            Inbound::Typed(message) => {
                let shape = message.shape();
                let info = self
                    .ids
                    .get(&shape.type_id())
                    .and_then(|id| self.infos.get(id))
                    .ok_or(GatewayError::UnregisteredShape(shape.name()))?;

                if let Some(handler) = &info.handler {
                    return handler.call(message, session.clone()).await;
                }
                if let Some(router) = &info.router {
                    return router.dispatch(shape, message, session.clone()).await;
                }
                Ok(None)
            }
        }
    }

    /// Encode `message` under `context` into wire segments.
    ///
    /// # Errors
    ///
    /// [`GatewayError::UnregisteredShape`] if the shape has no wire id, or a
    /// codec error.
    pub fn encode(&self, context: u32, message: &dyn Message) -> Result<EnvelopeParts> {
        let shape = message.shape();
        let id = *self
            .ids
            .get(&shape.type_id())
            .ok_or(GatewayError::UnregisteredShape(shape.name()))?;
        let payload = message.encode_payload()?;
        Ok(EnvelopeParts::new(
            context,
            id,
            Bytes::from(payload),
            self.order,
        ))
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.infos.iter().map(|(id, i)| (*id, i.shape)).collect();
        ids.sort_by_key(|(id, _)| *id);
        f.debug_struct("Processor")
            .field("order", &self.order)
            .field("messages", &ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_info::fail;
    use crate::processor::{reply, ChannelRouter};
    use crate::protocol::LengthPrefix;
    use crate::session::{Session, SessionServices};
    use crate::transport::Connection;
    use serde::{Deserialize, Serialize};
    use tokio::io::DuplexStream;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Ping {}

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Pong {}

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Chat {
        text: String,
    }

    fn envelope(processor: &Processor, context: u32, message: &dyn Message) -> Bytes {
        Bytes::from(processor.encode(context, message).unwrap().to_vec())
    }

    /// A live handle for routing tests; the peer end is kept alive by the caller.
    fn session_for(processor: Processor) -> (Arc<Processor>, SessionHandle, DuplexStream) {
        let processor = Arc::new(processor);
        let (ours, theirs) = tokio::io::duplex(4096);
        let conn = Connection::from_stream(ours, LengthPrefix::default());
        let session = Session::new(conn, SessionServices::new(processor.clone()));
        (processor, session.handle().clone(), theirs)
    }

    #[test]
    fn test_register_assigns_ids() {
        let mut processor = Processor::new();
        processor.register::<Ping>(1);
        processor.register::<Pong>(7);

        assert_eq!(processor.id_of::<Ping>(), Some(1));
        assert_eq!(processor.id_of::<Pong>(), Some(7));
        assert_eq!(processor.id_of::<Chat>(), None);
        assert_eq!(processor.shape_of(7), Some(MessageShape::of::<Pong>()));
        assert_eq!(processor.len(), 2);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_shape_panics() {
        let mut processor = Processor::new();
        processor.register::<Ping>(1);
        processor.register::<Ping>(2);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_id_panics() {
        let mut processor = Processor::new();
        processor.register::<Ping>(1);
        processor.register::<Pong>(1);
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn test_handler_for_unregistered_shape_panics() {
        let mut processor = Processor::new();
        processor.set_handler(|_: Ping, _| async { Ok(None) });
    }

    #[test]
    #[should_panic(expected = "message id 99 not registered")]
    fn test_raw_handler_for_unregistered_id_panics() {
        let mut processor = Processor::new();
        processor.register::<Ping>(1);
        processor.set_raw_handler(99, |_id, _payload, _| async { Ok(None) });
    }

    #[test]
    fn test_for_each_visits_all() {
        let mut processor = Processor::new();
        processor.register::<Ping>(1);
        processor.register::<Pong>(2);
        processor.register::<Chat>(3);

        let mut seen = Vec::new();
        processor.for_each(|id, shape| seen.push((id, shape)));
        seen.sort_by_key(|(id, _)| *id);

        assert_eq!(seen.len(), 3);
        assert!(seen[2].1.is::<Chat>());
    }

    #[test]
    fn test_decode_typed() {
        let mut processor = Processor::new();
        processor.register::<Chat>(5);

        let data = envelope(&processor, 11, &Chat { text: "hey".into() });
        let (context, inbound) = processor.decode(data).unwrap();

        assert_eq!(context, 11);
        let chat = inbound.as_typed().unwrap().downcast_ref::<Chat>().unwrap();
        assert_eq!(chat.text, "hey");
    }

    #[test]
    fn test_decode_unknown_id_keeps_context() {
        let processor = Processor::new();
        let data = Bytes::from(EnvelopeHeader::new(9, 42).encode(ByteOrder::Big).to_vec());

        match processor.decode(data) {
            Err(GatewayError::UnknownMessageId { context, id }) => {
                assert_eq!(context, 9);
                assert_eq!(id, 42);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decode_short_envelope() {
        let processor = Processor::new();
        assert!(processor.decode(Bytes::from_static(&[0, 0, 1])).is_err());
    }

    #[test]
    fn test_decode_bad_payload() {
        let mut processor = Processor::new();
        processor.register::<Chat>(5);

        let mut data = EnvelopeHeader::new(1, 5).encode(ByteOrder::Big).to_vec();
        data.extend_from_slice(&[0xc1]);
        assert!(processor.decode(Bytes::from(data)).is_err());
    }

    #[test]
    fn test_encode_respects_byte_order() {
        let mut processor = Processor::new();
        processor.set_byte_order(ByteOrder::Little);
        processor.register::<Ping>(0x0102);

        let parts = processor.encode(3, &Ping {}).unwrap();
        assert_eq!(parts.context, [3, 0, 0, 0]);
        assert_eq!(parts.id, [0x02, 0x01, 0, 0]);
    }

    #[test]
    fn test_encode_unregistered_shape() {
        let processor = Processor::new();
        match processor.encode(1, &Pong {}) {
            Err(GatewayError::UnregisteredShape(name)) => assert!(name.ends_with("Pong")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_raw_handler_skips_decoding() {
        let mut processor = Processor::new();
        processor.register::<Chat>(5);
        processor.set_raw_handler(5, |_id, _payload, _| async { Ok(None) });

        let mut data = EnvelopeHeader::new(1, 5).encode(ByteOrder::Big).to_vec();
        data.extend_from_slice(b"not msgpack");
        let (_, inbound) = processor.decode(Bytes::from(data)).unwrap();

        match inbound {
            Inbound::Raw { id, payload } => {
                assert_eq!(id, 5);
                assert_eq!(&payload[..], b"not msgpack");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_route_to_handler() {
        let mut processor = Processor::new();
        processor.register::<Ping>(1);
        processor.register::<Pong>(2);
        processor.set_handler(|_: Ping, _| async { reply(Pong {}) });

        let (processor, session, _peer) = session_for(processor);
        let data = envelope(&processor, 1, &Ping {});
        let (_, inbound) = processor.decode(data).unwrap();

        let out = processor.route(inbound, &session).await.unwrap().unwrap();
        assert!(out.shape().is::<Pong>());
    }

    #[tokio::test]
    async fn test_route_without_route_is_empty() {
        let mut processor = Processor::new();
        processor.register::<Ping>(1);

        let (processor, session, _peer) = session_for(processor);
        let out = processor
            .route(Inbound::Typed(Box::new(Ping {})), &session)
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_route_handler_error_is_application() {
        let mut processor = Processor::new();
        processor.register::<Ping>(1);
        processor.set_handler(|_: Ping, _| async { fail(4, "nope", true) });

        let (processor, session, _peer) = session_for(processor);
        let err = processor
            .route(Inbound::Typed(Box::new(Ping {})), &session)
            .await
            .unwrap_err();
        let info = err.as_application().unwrap();
        assert!(info.kick());
        assert_eq!(info.debug(), "nope");
    }

    #[tokio::test]
    async fn test_route_unregistered_shape() {
        let (processor, session, _peer) = session_for(Processor::new());
        let err = processor
            .route(Inbound::Typed(Box::new(Ping {})), &session)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnregisteredShape(_)));
    }

    #[tokio::test]
    async fn test_handler_takes_priority_over_router() {
        let (router, _calls) = ChannelRouter::new(1);
        let mut processor = Processor::new();
        processor.register::<Ping>(1);
        processor.register::<Pong>(2);
        processor.set_router::<Ping>(Arc::new(router));
        processor.set_handler(|_: Ping, _| async { reply(Pong {}) });

        let (processor, session, _peer) = session_for(processor);
        let out = processor
            .route(Inbound::Typed(Box::new(Ping {})), &session)
            .await
            .unwrap();
        assert!(out.unwrap().shape().is::<Pong>());
    }

    #[tokio::test]
    async fn test_route_through_channel_router() {
        let (router, mut calls) = ChannelRouter::new(4);
        let mut processor = Processor::new();
        processor.register::<Chat>(3);
        processor.set_router::<Chat>(Arc::new(router));

        tokio::spawn(async move {
            while let Some(call) = calls.recv().await {
                let text = call.downcast_ref::<Chat>().unwrap().text.to_uppercase();
                call.respond(reply(Chat { text }));
            }
        });

        let (processor, session, _peer) = session_for(processor);
        let chat = Chat { text: "hi".into() };
        let out = processor
            .route(Inbound::Typed(Box::new(chat)), &session)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.downcast_ref::<Chat>().unwrap().text, "HI");
    }

    #[tokio::test]
    async fn test_channel_router_closed() {
        let (router, calls) = ChannelRouter::new(1);
        drop(calls);

        let mut processor = Processor::new();
        processor.register::<Chat>(3);
        processor.set_router::<Chat>(Arc::new(router));

        let (processor, session, _peer) = session_for(processor);
        let chat = Chat { text: "x".into() };
        let err = processor
            .route(Inbound::Typed(Box::new(chat)), &session)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RouterClosed));
    }

    #[tokio::test]
    async fn test_route_raw() {
        let mut processor = Processor::new();
        processor.register::<Chat>(5);
        processor.register::<Pong>(6);
        processor.set_raw_handler(5, |id, payload: Bytes, _| async move {
            assert_eq!(id, 5);
            assert_eq!(&payload[..], b"raw");
            reply(Pong {})
        });

        let (processor, session, _peer) = session_for(processor);
        let out = processor
            .route(
                Inbound::Raw {
                    id: 5,
                    payload: Bytes::from_static(b"raw"),
                },
                &session,
            )
            .await
            .unwrap();
        assert!(out.unwrap().shape().is::<Pong>());
    }
}
