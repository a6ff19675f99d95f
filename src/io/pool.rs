//! Shared, self-healing connection pool for one server node.
//!
//! The pool keeps up to `max_size` authenticated [`Connection`]s to a single
//! endpoint and hands them out round-robin. Connections are *shared*: the
//! same connection may be held by several callers at once, and correlation of
//! requests with responses is left to the protocol's opaque field.
//!
//! # Lifecycle
//!
//! - [`acquire`](ConnectionPool::acquire) grows the pool on demand until it is
//!   full, then only rotates over the existing set.
//! - [`release`](ConnectionPool::release) repairs the pool when the released
//!   connection is dead: the dead connection is disposed, the owner is told,
//!   and an authenticated replacement takes its place before `release`
//!   returns.
//! - [`initialize`](ConnectionPool::initialize) rebuilds the full set eagerly.
//!   Failures are recorded in a sticky flag instead of being returned.
//! - [`dispose`](ConnectionPool::dispose) tears everything down once.
//!
//! # Locking
//!
//! Structural changes (add, remove, clear) happen while holding the pool's
//! state mutex, so no two of them interleave. The connection list itself sits
//! behind an `RwLock`; the full-pool fast path of `acquire` only takes the
//! read side and never waits for a connection being created.
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use floe::config::PoolConfiguration;
//! use floe::io::{ConnectionPool, PlainSaslAuthenticator, SharedConnectionPool, TcpConnectionFactory};
//!
//! let config = PoolConfiguration::builder().max_size(4).build().unwrap();
//! let pool = SharedConnectionPool::new(
//!     "127.0.0.1:11210".parse().unwrap(),
//!     config.clone(),
//!     Arc::new(TcpConnectionFactory::new(config)),
//!     PlainSaslAuthenticator::new("user", "password"),
//! )
//! .unwrap()
//! .with_owner(|is_dead: bool| println!("connection dead: {is_dead}"));
//!
//! pool.initialize();
//! assert!(!pool.initialization_failed());
//!
//! let connection = pool.acquire().unwrap();
//! // write an operation ...
//! pool.release(Some(connection)).unwrap();
//! ```
use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::config::{ConfigError, PoolConfiguration};

use super::{Authenticator, Connection, ConnectionError, ConnectionFactory};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("connection pool for {0} has been disposed")]
    Disposed(SocketAddr),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Receives liveness of connections whose fate the pool has decided.
///
/// Called with the connection's dead flag when it is repaired away or when the
/// pool is disposed. Any `Fn(bool)` closure is an observer.
pub trait HealthObserver: Send + Sync {
    fn check_online(&self, is_dead: bool);
}

impl<F> HealthObserver for F
where
    F: Fn(bool) + Send + Sync,
{
    fn check_online(&self, is_dead: bool) {
        self(is_dead)
    }
}

/// Point-in-time view of a pool, for monitoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    pub endpoint: SocketAddr,
    pub size: usize,
    pub max_size: usize,
    pub disposed: bool,
    pub initialization_failed: bool,
}

/// Operations every pool offers to the layers above it.
pub trait ConnectionPool: Send + Sync {
    fn endpoint(&self) -> SocketAddr;

    fn config(&self) -> &PoolConfiguration;

    /// Returns a connection, creating one first if the pool is not yet full.
    fn acquire(&self) -> Result<Arc<dyn Connection>, PoolError>;

    /// Hands a connection back; dead connections are replaced. `None` is ignored.
    fn release(&self, connection: Option<Arc<dyn Connection>>) -> Result<(), PoolError>;

    /// Disposes any existing connections and opens `max_size` new ones.
    fn initialize(&self);

    fn dispose(&self);

    /// Whether the last [`initialize`](ConnectionPool::initialize) stopped early.
    fn initialization_failed(&self) -> bool;

    fn size(&self) -> usize;

    fn status(&self) -> PoolStatus;
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
struct PoolState {
    disposed: bool,
}

pub struct SharedConnectionPool {
    identity: u64,
    endpoint: SocketAddr,
    config: PoolConfiguration,
    factory: Arc<dyn ConnectionFactory>,
    authenticator: Box<dyn Authenticator>,
    owner: Option<Box<dyn HealthObserver>>,
    connections: RwLock<Vec<Arc<dyn Connection>>>,
    cursor: AtomicUsize,
    state: Mutex<PoolState>,
    initialization_failed: AtomicBool,
}

impl SharedConnectionPool {
    pub fn new(
        endpoint: SocketAddr,
        config: PoolConfiguration,
        factory: Arc<dyn ConnectionFactory>,
        authenticator: impl Authenticator + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            identity: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            endpoint,
            connections: RwLock::new(Vec::with_capacity(config.max_size)),
            config,
            factory,
            authenticator: Box::new(authenticator),
            owner: None,
            cursor: AtomicUsize::new(0),
            state: Mutex::new(PoolState::default()),
            initialization_failed: AtomicBool::new(false),
        })
    }

    /// Registers the node that wants to hear about dead connections.
    #[must_use]
    pub fn with_owner(mut self, owner: impl HealthObserver + 'static) -> Self {
        self.owner = Some(Box::new(owner));
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_connections(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn Connection>>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_connections(&self) -> RwLockWriteGuard<'_, Vec<Arc<dyn Connection>>> {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Round-robin pick. `connections` must not be empty.
    fn select(&self, connections: &[Arc<dyn Connection>]) -> Arc<dyn Connection> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % connections.len();
        Arc::clone(&connections[index])
    }

    fn notify(&self, is_dead: bool) {
        if let Some(owner) = &self.owner {
            owner.check_online(is_dead);
        }
    }

    /// Opens a connection and runs the handshake. Callers hold the state lock.
    fn create_and_auth_connection(&self) -> Result<Arc<dyn Connection>, ConnectionError> {
        debug!(
            "pool {} creating connection to {}; refs={}",
            self.identity,
            self.endpoint,
            self.size()
        );

        let connection = self.factory.create(self.endpoint)?;
        if let Err(e) = self.authenticator.authenticate(connection.as_ref()) {
            warn!(
                "pool {} failed to authenticate {} to {}: {e}",
                self.identity,
                connection.id(),
                self.endpoint
            );
            connection.dispose();
            return Err(e);
        }
        connection.set_authenticated(true);

        debug!(
            "pool {} acquired new {} | {} | [{}, {}]",
            self.identity,
            connection.id(),
            self.endpoint,
            self.size() + 1,
            self.config.max_size
        );

        Ok(connection)
    }
}

impl ConnectionPool for SharedConnectionPool {
    fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    fn config(&self) -> &PoolConfiguration {
        &self.config
    }

    fn acquire(&self) -> Result<Arc<dyn Connection>, PoolError> {
        {
            let connections = self.read_connections();
            if connections.len() >= self.config.max_size {
                return Ok(self.select(&connections));
            }
        }

        let state = self.lock_state();
        if state.disposed {
            return Err(PoolError::Disposed(self.endpoint));
        }

        // Another caller may have filled the pool while this one waited.
        let size = self.size();
        if size < self.config.max_size {
            let connection = self.create_and_auth_connection()?;
            self.write_connections().push(connection);
        }

        let connections = self.read_connections();
        Ok(self.select(&connections))
    }

    fn release(&self, connection: Option<Arc<dyn Connection>>) -> Result<(), PoolError> {
        let Some(connection) = connection else {
            return Ok(());
        };

        connection.mark_used(false);
        if !connection.is_dead() {
            return Ok(());
        }

        let _state = self.lock_state();
        let removed = {
            let mut connections = self.write_connections();
            connections
                .iter()
                .position(|c| c.id() == connection.id())
                .map(|index| connections.remove(index))
        };

        // Already replaced through another holder, or cleared by initialize/dispose.
        let Some(removed) = removed else {
            debug!(
                "pool {} ignoring release of {}; no longer pooled",
                self.identity,
                connection.id()
            );
            return Ok(());
        };

        removed.dispose();
        self.notify(removed.is_dead());
        info!(
            "pool {} replacing dead {} to {}",
            self.identity,
            removed.id(),
            self.endpoint
        );

        let replacement = self.create_and_auth_connection()?;
        self.write_connections().push(replacement);
        Ok(())
    }

    fn initialize(&self) {
        let state = self.lock_state();
        self.initialization_failed.store(false, Ordering::SeqCst);

        if state.disposed {
            warn!(
                "pool {} for {} cannot initialize after dispose",
                self.identity, self.endpoint
            );
            self.initialization_failed.store(true, Ordering::SeqCst);
            return;
        }

        let stale = std::mem::take(&mut *self.write_connections());
        for connection in stale {
            connection.dispose();
        }

        for _ in 0..self.config.max_size {
            match self.create_and_auth_connection() {
                Ok(connection) => self.write_connections().push(connection),
                Err(e) => {
                    error!(
                        "pool {} initialize failed for {}: {e}",
                        self.identity, self.endpoint
                    );
                    self.initialization_failed.store(true, Ordering::SeqCst);
                    return;
                }
            }
        }

        info!(
            "pool {} initialized {} connections to {}",
            self.identity, self.config.max_size, self.endpoint
        );
    }

    fn dispose(&self) {
        let mut state = self.lock_state();
        if state.disposed {
            return;
        }
        state.disposed = true;

        let connections = std::mem::take(&mut *self.write_connections());
        for connection in connections {
            connection.dispose();
            self.notify(connection.is_dead());
        }

        info!("pool {} for {} disposed", self.identity, self.endpoint);
    }

    fn initialization_failed(&self) -> bool {
        self.initialization_failed.load(Ordering::SeqCst)
    }

    fn size(&self) -> usize {
        self.read_connections().len()
    }

    fn status(&self) -> PoolStatus {
        let disposed = self.lock_state().disposed;
        PoolStatus {
            endpoint: self.endpoint,
            size: self.size(),
            max_size: self.config.max_size,
            disposed,
            initialization_failed: self.initialization_failed(),
        }
    }
}

impl fmt::Debug for SharedConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedConnectionPool")
            .field("identity", &self.identity)
            .field("endpoint", &self.endpoint)
            .field("size", &self.size())
            .field("max_size", &self.config.max_size)
            .finish_non_exhaustive()
    }
}

impl Drop for SharedConnectionPool {
    fn drop(&mut self) {
        self.dispose();
    }
}
