//! # gatewire
//!
//! Message gateway for game-style client/server protocols.
//!
//! Clients connect over length-prefixed TCP or WebSocket and exchange
//! envelopes: a 4-byte context, a 4-byte message id, and a MessagePack
//! payload. The gateway decodes each envelope into a registered message
//! type, routes it to a handler or an external router, and writes the reply
//! back under the same context.
//!
//! ## Architecture
//!
//! - **Processor**: registry of message types, wire ids and routes
//! - **Session**: one read loop per connection, with a small replay cache
//!   so retransmitted requests get the stored reply instead of running twice
//! - **Writer**: one task per connection that owns the socket's write half
//! - **Gateway**: listeners, connection cap, graceful shutdown
//!
//! ## Example
//!
//! ```ignore
//! use gatewire::processor::{reply, Processor};
//! use gatewire::{ensure, Gateway, GatewayConfig};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Ping { seq: u32 }
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Pong { seq: u32 }
//!
//! #[tokio::main]
//! async fn main() -> gatewire::Result<()> {
//!     let mut processor = Processor::new();
//!     processor.register::<Ping>(1);
//!     processor.register::<Pong>(2);
//!     processor.set_handler(|ping: Ping, _session| async move {
//!         ensure!(ping.seq > 0, 400, "seq must be positive");
//!         reply(Pong { seq: ping.seq })
//!     });
//!
//!     Gateway::builder(processor)
//!         .tcp_addr("0.0.0.0:3563")
//!         .build()?
//!         .run(async { tokio::signal::ctrl_c().await.ok(); })
//!         .await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod error_info;
pub mod gateway;
pub mod processor;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod writer;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use error_info::{ErrorCode, ErrorInfo};
pub use gateway::{BoundGateway, Gateway, GatewayBuilder};
pub use processor::{reply, Message, Processor, Reply};
pub use session::{SessionEnd, SessionHandle, SessionHooks};
