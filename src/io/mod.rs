//! Connections and connection pooling.
//!
//! This module owns the transport side of the client: authenticated channels
//! to a server node ([`Connection`]), the strategies that create and
//! authenticate them ([`ConnectionFactory`], [`Authenticator`]) and the
//! [`SharedConnectionPool`] that keeps a bounded, self-healing set of them for
//! one endpoint.
//!
//! # Key Components
//!
//! - [`TcpConnection`]: blocking TCP channel; responses are matched to
//!   requests by opaque.
//! - [`SharedConnectionPool`]: round-robin, shared (non-exclusive) pool that
//!   replaces dead connections when they are released.
//! - [`HealthObserver`]: one-way notification from a pool to the node that
//!   owns it.
//! - [`execute`]: acquire/write/read/release loop with clone-based retries.
//!
//! # Failure Model
//!
//! - An I/O failure marks the connection dead. The caller sees the error; the
//!   pool repairs itself when the connection is released.
//! - A timeout between frames is reported as [`ConnectionError::Timeout`] and
//!   does not kill the connection. A timeout in the middle of a frame leaves
//!   the stream out of step and does.
//! - Authentication failures propagate from `acquire` and `release`;
//!   `initialize` records them in its failed flag instead.
//!
//! Callers must release every connection they acquire, including on error
//! paths, or dead connections are never repaired.
//!
//! # See Also
//!
//! - [`operations`](crate::operations): Frames written onto these connections.
mod auth;
mod connection;
mod executor;
mod factory;
#[cfg(test)]
pub(crate) mod mock;
mod pool;

pub use auth::{Authenticator, NoAuthentication, PlainSaslAuthenticator};
pub use connection::{Connection, ConnectionError, ConnectionId, TcpConnection};
pub use executor::{ExecuteError, execute};
pub use factory::{ConnectionFactory, TcpConnectionFactory};
pub use pool::{ConnectionPool, HealthObserver, PoolError, PoolStatus, SharedConnectionPool};
