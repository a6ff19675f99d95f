use std::{net::SocketAddr, sync::Arc};

use crate::config::PoolConfiguration;

use super::{Connection, ConnectionError, TcpConnection};

/// Creates unauthenticated connections to an endpoint.
///
/// The pool owns one factory and calls it whenever it grows or repairs its
/// connection set. Any `Fn(SocketAddr) -> Result<Arc<dyn Connection>, _>`
/// closure is a factory.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self, endpoint: SocketAddr) -> Result<Arc<dyn Connection>, ConnectionError>;
}

impl<F> ConnectionFactory for F
where
    F: Fn(SocketAddr) -> Result<Arc<dyn Connection>, ConnectionError> + Send + Sync,
{
    fn create(&self, endpoint: SocketAddr) -> Result<Arc<dyn Connection>, ConnectionError> {
        self(endpoint)
    }
}

/// Opens [`TcpConnection`]s using the pool's timeouts.
#[derive(Debug, Clone)]
pub struct TcpConnectionFactory {
    config: PoolConfiguration,
}

impl TcpConnectionFactory {
    pub fn new(config: PoolConfiguration) -> Self {
        Self { config }
    }
}

impl ConnectionFactory for TcpConnectionFactory {
    fn create(&self, endpoint: SocketAddr) -> Result<Arc<dyn Connection>, ConnectionError> {
        let connection: Arc<dyn Connection> =
            Arc::new(TcpConnection::connect(endpoint, &self.config)?);
        Ok(connection)
    }
}
