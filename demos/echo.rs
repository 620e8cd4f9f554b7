//! Echo gateway - request/reply over TCP and WebSocket.
//!
//! Run with `RUST_LOG=gatewire=debug cargo run --example echo` and point a
//! client at `127.0.0.1:3563` (2-byte big-endian length prefix) or
//! `ws://127.0.0.1:3653`.
//!
//! Ids:
//! - `1` `Echo { text }` is answered with `2` `Echoed { text, session }`
//! - `3` `Shout { text }` is broadcast back as a push, no reply
//! - `9` `Fault { code, debug }` is sent for rejected requests

use gatewire::processor::{reply, Processor};
use gatewire::{
    ensure, ensure_kick, ErrorInfo, Gateway, GatewayConfig, SessionHandle, SessionHooks,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, Serialize)]
struct Echo {
    text: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct Echoed {
    text: String,
    session: u64,
}

#[derive(Debug, Deserialize, Serialize)]
struct Shout {
    text: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct Fault {
    code: i32,
    debug: String,
}

struct Presence;

impl SessionHooks for Presence {
    fn on_open(&self, session: &SessionHandle) {
        info!(session = session.id(), remote = ?session.remote_addr(), "player joined");
    }

    fn on_close(&self, session: &SessionHandle) {
        info!(session = session.id(), "player left");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut processor = Processor::new();
    processor.register::<Echo>(1);
    processor.register::<Echoed>(2);
    processor.register::<Shout>(3);
    processor.register::<Fault>(9);

    processor.set_handler(|echo: Echo, session: SessionHandle| async move {
        ensure!(!echo.text.is_empty(), 400, "empty text");
        let len = echo.text.len();
        ensure_kick!(len <= 256, 413, "text too long: {}", len);
        reply(Echoed {
            text: echo.text,
            session: session.id(),
        })
    });

    processor.set_handler(|shout: Shout, session: SessionHandle| async move {
        session
            .push(&Shout {
                text: shout.text.to_uppercase(),
            })
            .await
            .map_err(|e| ErrorInfo::new(500, e.to_string()))?;
        Ok(None)
    });

    let config = GatewayConfig {
        tcp_addr: Some("127.0.0.1:3563".to_string()),
        ws_addr: Some("127.0.0.1:3653".to_string()),
        ..GatewayConfig::default()
    };

    let gateway = Gateway::builder(processor)
        .config(config)
        .hooks(Presence)
        .error_reply(|err: &ErrorInfo| Fault {
            code: err.code().0,
            debug: err.debug().to_string(),
        })
        .build()?
        .bind()
        .await?;

    info!(
        tcp = ?gateway.tcp_local_addr(),
        ws = ?gateway.ws_local_addr(),
        "echo gateway listening"
    );

    gateway
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("echo gateway stopped");
    Ok(())
}
