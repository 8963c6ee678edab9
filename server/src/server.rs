//! The TCP accept loop: binds the configured address, allocates a
//! connection id per incoming socket, and hands each one off to its own
//! task running the connection state machine.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

use common::config::NetConfig;
use common::err::MysqlError;
use common::server::Server;

use crate::auth::AuthEngine;
use crate::conn::connection::{handle_connection, ServerParams};
use crate::conn::registry::ConnectionRegistry;
use crate::framer::PacketFramer;
use crate::packet::err::ErrPacket;
use crate::session::{IdentityProvider, Session};

/// Builds a fresh `Session` for each newly accepted connection. The
/// protocol engine never constructs sessions itself; it only ever holds
/// onto a factory the embedder supplied.
pub trait SessionFactory: Send + Sync {
    fn new_session(&self) -> Box<dyn Session>;
}

impl<F> SessionFactory for F
where
    F: Fn() -> Box<dyn Session> + Send + Sync,
{
    fn new_session(&self) -> Box<dyn Session> {
        (self)()
    }
}

/// The embeddable MySQL protocol server: one listener, many connection
/// tasks, wired into the `common::server::Server` lifecycle so it can sit
/// in a `ShutdownHandle` next to whatever else the embedder is running.
pub struct MysqlServer {
    net: NetConfig,
    params: Arc<ServerParams>,
    session_factory: Arc<dyn SessionFactory>,
    shutdown: Arc<Notify>,
    accept_handle: Option<JoinHandle<()>>,
    connections: Arc<Mutex<JoinSet<()>>>,
}

impl MysqlServer {
    pub fn new(
        net: NetConfig,
        server_version: String,
        identity_provider: Arc<dyn IdentityProvider>,
        session_factory: Arc<dyn SessionFactory>,
    ) -> Self {
        let server_id = net.server_id.unwrap_or_else(|| rand::thread_rng().gen());
        let params = Arc::new(ServerParams {
            server_version,
            identity_provider,
            auth_engine: Arc::new(AuthEngine::new()),
            connection_registry: Arc::new(ConnectionRegistry::new(server_id)),
        });

        MysqlServer {
            net,
            params,
            session_factory,
            shutdown: Arc::new(Notify::new()),
            accept_handle: None,
            connections: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.params.connection_registry.active_count()
    }
}

#[async_trait]
impl Server for MysqlServer {
    async fn start(&mut self) -> Result<(), MysqlError> {
        let addr = format!("{}:{}", self.net.bind_host, self.net.bind_port);
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, "mysql protocol server listening");

        let params = Arc::clone(&self.params);
        let session_factory = Arc::clone(&self.session_factory);
        let shutdown = Arc::clone(&self.shutdown);
        let connections = Arc::clone(&self.connections);
        let max_connections = self.net.max_connections;

        let handle = tokio::spawn(async move {
            loop {
                let (socket, peer) = tokio::select! {
                    _ = shutdown.notified() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    },
                };

                if params.connection_registry.active_count() >= max_connections {
                    warn!(%peer, max_connections, "rejecting connection: too many connections");
                    let err = MysqlError::MaxConnectionsExceeded;
                    let mut framer = PacketFramer::new(socket);
                    let _ = framer.write_packet(&ErrPacket::from_error(&err).serialize()).await;
                    continue;
                }

                let _ = socket.set_nodelay(true);

                let connection_id = params.connection_registry.allocate();
                let connection_params = Arc::clone(&params);
                let session = session_factory.new_session();

                let mut joinset = connections.lock().await;
                joinset.spawn(async move {
                    info!(connection_id, %peer, "connection accepted");
                    if let Err(e) =
                        handle_connection(socket, connection_id, &connection_params, session).await
                    {
                        warn!(connection_id, error = %e, "connection ended with error");
                    }
                    connection_params.connection_registry.release(connection_id);
                });
            }
        });

        self.accept_handle = Some(handle);
        Ok(())
    }

    async fn shutdown(&mut self, graceful: bool) -> Result<(), MysqlError> {
        self.shutdown.notify_waiters();
        if let Some(handle) = self.accept_handle.take() {
            if graceful {
                let _ = handle.await;
            } else {
                handle.abort();
            }
        }

        let mut connections = self.connections.lock().await;
        if graceful {
            while connections.join_next().await.is_some() {}
        } else {
            connections.shutdown().await;
        }
        Ok(())
    }
}
