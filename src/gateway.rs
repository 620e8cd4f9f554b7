//! Gateway builder and accept loops.
//!
//! The [`GatewayBuilder`] collects the processor, configuration, hooks and
//! error-reply builder. [`Gateway::bind`] opens the configured listeners and
//! [`BoundGateway::serve`] runs them:
//! 1. Accept a connection, enforcing the per-listener connection cap
//! 2. Frame it (length-prefixed TCP or WebSocket)
//! 3. Run a [`Session`] for it on its own task
//! 4. On shutdown, stop accepting, stop every session and wait for them
//!
//! # Example
//!
//! ```ignore
//! use gatewire::{Gateway, GatewayConfig, Processor};
//!
//! #[tokio::main]
//! async fn main() -> gatewire::Result<()> {
//!     let mut processor = Processor::new();
//!     // register messages and handlers...
//!
//!     let config = GatewayConfig {
//!         tcp_addr: Some("0.0.0.0:3563".into()),
//!         ..Default::default()
//!     };
//!
//!     Gateway::builder(processor)
//!         .config(config)
//!         .build()?
//!         .run(async { tokio::signal::ctrl_c().await.ok(); })
//!         .await
//! }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::error_info::ErrorInfo;
use crate::processor::{Message, Processor};
use crate::protocol::LengthPrefix;
use crate::session::{wait_for_shutdown, Session, SessionHooks, SessionServices};
use crate::transport::{accept_websocket, Connection};

const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Builder for a [`Gateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    services: SessionServices,
}

impl GatewayBuilder {
    fn new(processor: Processor) -> Self {
        Self {
            config: GatewayConfig::default(),
            services: SessionServices::new(Arc::new(processor)),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Listen for length-prefixed TCP on `addr`.
    pub fn tcp_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.tcp_addr = Some(addr.into());
        self
    }

    /// Listen for WebSocket connections on `addr`.
    pub fn ws_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.ws_addr = Some(addr.into());
        self
    }

    /// Set the session lifecycle hooks.
    pub fn hooks<H: SessionHooks>(mut self, hooks: H) -> Self {
        self.services = self.services.with_hooks(Arc::new(hooks));
        self
    }

    /// Set how application errors are turned into replies.
    ///
    /// Without it, application errors produce no reply (kick is still honored).
    pub fn error_reply<F, M>(mut self, build: F) -> Self
    where
        F: Fn(&ErrorInfo) -> M + Send + Sync + 'static,
        M: Message,
    {
        self.services = self.services.with_error_reply(build);
        self
    }

    /// Validate the configuration and build the gateway.
    pub fn build(self) -> Result<Gateway> {
        self.config.validate()?;
        let prefix = self.config.length_prefix()?;
        let writer = self.config.writer_config();
        let services = self.services.with_writer_config(writer);

        Ok(Gateway {
            config: self.config,
            prefix,
            services,
        })
    }
}

/// A configured, not yet listening gateway.
pub struct Gateway {
    config: GatewayConfig,
    prefix: LengthPrefix,
    services: SessionServices,
}

impl Gateway {
    pub fn builder(processor: Processor) -> GatewayBuilder {
        GatewayBuilder::new(processor)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn processor(&self) -> &Arc<Processor> {
        self.services.processor()
    }

    /// Open the configured listeners.
    pub async fn bind(self) -> Result<BoundGateway> {
        let tcp = match &self.config.tcp_addr {
            Some(addr) => Some(TcpListener::bind(addr.as_str()).await?),
            None => None,
        };
        let ws = match &self.config.ws_addr {
            Some(addr) => Some(TcpListener::bind(addr.as_str()).await?),
            None => None,
        };

        Ok(BoundGateway {
            tcp,
            ws,
            prefix: self.prefix,
            max_conn_num: self.config.max_conn_num,
            max_frame_len: self.config.max_msg_len as usize,
            http_timeout: self.config.http_timeout(),
            services: self.services,
        })
    }

    /// Bind, then serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        self.bind().await?.serve(shutdown).await
    }
}

/// A gateway whose listeners are open.
pub struct BoundGateway {
    tcp: Option<TcpListener>,
    ws: Option<TcpListener>,
    prefix: LengthPrefix,
    max_conn_num: usize,
    max_frame_len: usize,
    http_timeout: Duration,
    services: SessionServices,
}

impl BoundGateway {
    /// Actual TCP listen address (useful with port 0).
    pub fn tcp_local_addr(&self) -> Option<SocketAddr> {
        self.tcp.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Actual WebSocket listen address.
    pub fn ws_local_addr(&self) -> Option<SocketAddr> {
        self.ws.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Accept connections until `shutdown` resolves, then stop every
    /// session and wait for all of them to finish.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let services = self.services.with_shutdown(stop_rx.clone());
        let mut listeners = JoinSet::new();

        if let Some(listener) = self.tcp {
            info!("tcp listening on {:?}", listener.local_addr().ok());
            listeners.spawn(accept_loop(
                listener,
                Framing::Stream(self.prefix),
                services.clone(),
                self.max_conn_num,
                stop_rx.clone(),
            ));
        }
        if let Some(listener) = self.ws {
            info!("websocket listening on {:?}", listener.local_addr().ok());
            listeners.spawn(accept_loop(
                listener,
                Framing::WebSocket {
                    max_frame_len: self.max_frame_len,
                    handshake_timeout: self.http_timeout,
                },
                services,
                self.max_conn_num,
                stop_rx,
            ));
        }

        shutdown.await;
        info!("gateway shutting down");
        let _ = stop_tx.send(true);

        while let Some(joined) = listeners.join_next().await {
            if let Err(e) = joined {
                error!("listener task failed: {}", e);
            }
        }
        info!("gateway stopped");
        Ok(())
    }
}

/// How a listener frames its connections.
#[derive(Debug, Clone, Copy)]
enum Framing {
    Stream(LengthPrefix),
    WebSocket {
        max_frame_len: usize,
        handshake_timeout: Duration,
    },
}

impl Framing {
    async fn connect(self, stream: TcpStream) -> Result<Connection> {
        match self {
            Framing::Stream(prefix) => Connection::tcp(stream, prefix),
            Framing::WebSocket {
                max_frame_len,
                handshake_timeout,
            } => accept_websocket(stream, max_frame_len, handshake_timeout).await,
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    framing: Framing,
    services: SessionServices,
    max_conn_num: usize,
    stop: watch::Receiver<bool>,
) {
    let limit = Arc::new(Semaphore::new(max_conn_num));
    let mut sessions = JoinSet::new();
    let mut stop = Some(stop);
    let mut backoff = Duration::ZERO;

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut stop) => break,
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => {
                        backoff = Duration::ZERO;
                        pair
                    }
                    Err(e) => {
                        backoff = next_backoff(backoff);
                        warn!("accept error: {}; retrying in {:?}", e, backoff);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                };

                let permit = match limit.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("too many connections, rejecting {}", peer);
                        drop(stream);
                        continue;
                    }
                };

                let services = services.clone();
                sessions.spawn(async move {
                    let _permit = permit;
                    let connection = match framing.connect(stream).await {
                        Ok(connection) => connection,
                        Err(e) => {
                            debug!("connection from {} failed: {}", peer, e);
                            return;
                        }
                    };
                    let end = Session::new(connection, services).run().await;
                    debug!("connection from {} closed: {:?}", peer, end);
                });
            }
        }
    }

    drop(listener);
    while sessions.join_next().await.is_some() {}
}

fn next_backoff(current: Duration) -> Duration {
    if current.is_zero() {
        Duration::from_millis(5)
    } else {
        (current * 2).min(MAX_ACCEPT_BACKOFF)
    }
}
