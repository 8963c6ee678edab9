use futures_util::future::join_all;

use crate::err::MysqlError;

/// A long-running service with a cooperative start/shutdown lifecycle.
#[async_trait::async_trait]
pub trait Server: Send {
    async fn start(&mut self) -> Result<(), MysqlError>;

    async fn shutdown(&mut self, graceful: bool) -> Result<(), MysqlError>;
}

/// Tracks every in-flight service so shutdown can drain them together.
///
/// The MySQL server registers its listener loop and its live connection
/// handlers here; `shutdown_services` stops accepting new work and waits
/// for everything already running to finish (or be cut short when
/// `graceful` is false).
#[derive(Default)]
pub struct ShutdownHandle {
    services: Vec<Box<dyn Server>>,
}

impl ShutdownHandle {
    #[inline]
    pub fn create() -> Self {
        Self { services: vec![] }
    }

    #[inline]
    pub fn add_service(&mut self, server: Box<dyn Server>) {
        self.services.push(server);
    }

    pub async fn shutdown_services(&mut self, graceful: bool) -> Result<(), MysqlError> {
        let futures = self.services.iter_mut().map(|s| s.shutdown(graceful));
        let results = join_all(futures).await;
        results.into_iter().find(Result::is_err).unwrap_or(Ok(()))
    }
}
