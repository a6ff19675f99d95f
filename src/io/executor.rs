//! Caller-side request loop.
//!
//! [`execute`] runs one operation through a pool: acquire a connection, write
//! the frame, read the answer and always release the connection, even when the
//! exchange failed, so the pool gets a chance to repair itself. Transient
//! failures are retried on a fresh [`clone_attempt`](Operation::clone_attempt)
//! until the attempt limit or the operation's lifespan runs out.
use log::debug;
use thiserror::Error;

use crate::operations::{Operation, OperationResult, error::OperationError};

use super::{ConnectionError, ConnectionPool, PoolError};

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("operation cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    #[error("gave up after {attempts} attempt(s): {source}")]
    AttemptsExhausted {
        attempts: u32,
        #[source]
        source: ConnectionError,
    },
}

/// Sends `operation` through `pool`, making at most `max_attempts` attempts.
///
/// A response with a non-retriable status is returned as is, success or not.
/// Retriable statuses and connection failures lead to another attempt; once
/// the limit is reached the last status is returned, or the last connection
/// error as [`ExecuteError::AttemptsExhausted`]. A timeout on the connection
/// or an expired lifespan ends the loop with [`ExecuteError::Cancelled`].
/// Operations without their own lifespan get the pool's configured one.
pub fn execute<O, P>(
    pool: &P,
    mut operation: O,
    max_attempts: u32,
) -> Result<OperationResult, ExecuteError>
where
    O: Operation,
    P: ConnectionPool + ?Sized,
{
    let max_attempts = max_attempts.max(1);
    let lifespan = pool.config().operation_lifespan;
    operation.meta_mut().lifespan.get_or_insert(lifespan);

    loop {
        if operation.meta().is_timed_out() {
            operation.meta_mut().mark_failed();
            return Err(ExecuteError::Cancelled {
                attempts: operation.meta().attempts,
            });
        }

        let connection = pool.acquire()?;
        connection.mark_used(true);
        let buffer = operation.write();
        let sent = connection.send(operation.meta().opaque(), &buffer);
        pool.release(Some(connection))?;

        let attempts = operation.meta().attempts;
        match sent {
            Ok(response) => {
                let result = operation.read_response(response)?;
                if !result.status.is_retriable() || attempts >= max_attempts {
                    return Ok(result);
                }
                debug!(
                    "retrying {:?} after attempt {attempts}: server answered {:?}",
                    operation.opcode(),
                    result.status
                );
            }
            Err(ConnectionError::Timeout) => {
                operation.meta_mut().mark_failed();
                return Err(ExecuteError::Cancelled { attempts });
            }
            Err(source) => {
                operation.meta_mut().mark_failed();
                if attempts >= max_attempts {
                    return Err(ExecuteError::AttemptsExhausted { attempts, source });
                }
                debug!(
                    "retrying {:?} after attempt {attempts}: {source}",
                    operation.opcode()
                );
            }
        }

        operation = operation.clone_attempt();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use crate::{
        config::PoolConfiguration,
        io::{
            Connection, NoAuthentication, PlainSaslAuthenticator, SharedConnectionPool,
            TcpConnectionFactory,
            mock::{FakeServer, MockFactory, Scripted},
        },
        operations::{ResponseStatus, Touch},
    };

    use super::*;

    fn pool_with(factory: &Arc<MockFactory>, max_size: usize) -> SharedConnectionPool {
        let config = PoolConfiguration::builder()
            .max_size(max_size)
            .build()
            .unwrap();
        pool_from(factory, config)
    }

    fn pool_from(factory: &Arc<MockFactory>, config: PoolConfiguration) -> SharedConnectionPool {
        SharedConnectionPool::new(
            "10.0.0.1:11210".parse().unwrap(),
            config,
            factory.clone(),
            NoAuthentication,
        )
        .unwrap()
    }

    #[test]
    fn success_on_first_attempt() {
        let factory = MockFactory::new();
        let pool = pool_with(&factory, 2);

        let result = execute(&pool, Touch::new("foo", 5).unwrap(), 3).unwrap();

        assert!(result.is_success());
        assert_eq!(result.attempts, 1);
        assert!(!factory.created()[0].in_use());
    }

    #[test]
    fn retries_on_dead_connection() {
        let factory = MockFactory::scripted([Scripted::IoFailure]);
        let pool = pool_with(&factory, 1);

        let result = execute(&pool, Touch::new("foo", 5).unwrap(), 3).unwrap();

        assert!(result.is_success());
        assert_eq!(result.attempts, 2);
        let created = factory.created();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].disposals(), 1);
        assert_eq!(created[1].sent(), 1);
        assert_eq!(pool.size(), 1);

        let first = created[0].opaques();
        let second = created[1].opaques();
        assert_eq!((first.len(), second.len()), (1, 1));
        assert_ne!(first[0], second[0]);
    }

    #[test]
    fn every_retry_uses_a_fresh_opaque() {
        let factory = MockFactory::scripted([
            Scripted::Status(ResponseStatus::Busy),
            Scripted::Status(ResponseStatus::Busy),
        ]);
        let pool = pool_with(&factory, 1);

        let result = execute(&pool, Touch::new("foo", 5).unwrap(), 3).unwrap();

        assert!(result.is_success());
        let opaques = factory.created()[0].opaques();
        assert_eq!(opaques.len(), 3);
        assert_ne!(opaques[0], opaques[1]);
        assert_ne!(opaques[1], opaques[2]);
        assert_ne!(opaques[0], opaques[2]);
    }

    #[test]
    fn retriable_status_returns_last_result_at_limit() {
        let factory = MockFactory::scripted([
            Scripted::Status(ResponseStatus::TemporaryFailure),
            Scripted::Status(ResponseStatus::Busy),
            Scripted::Status(ResponseStatus::TemporaryFailure),
        ]);
        let pool = pool_with(&factory, 1);

        let result = execute(&pool, Touch::new("foo", 5).unwrap(), 3).unwrap();

        assert_eq!(result.status, ResponseStatus::TemporaryFailure);
        assert_eq!(result.attempts, 3);
    }

    #[test]
    fn non_retriable_status_is_returned_immediately() {
        let factory = MockFactory::scripted([Scripted::Status(ResponseStatus::KeyNotFound)]);
        let pool = pool_with(&factory, 1);

        let result = execute(&pool, Touch::new("foo", 5).unwrap(), 3).unwrap();

        assert_eq!(result.status, ResponseStatus::KeyNotFound);
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn connection_failures_exhaust_attempts() {
        let factory = MockFactory::scripted([Scripted::IoFailure, Scripted::IoFailure]);
        let pool = pool_with(&factory, 1);

        let err = execute(&pool, Touch::new("foo", 5).unwrap(), 2).unwrap_err();

        assert!(matches!(
            err,
            ExecuteError::AttemptsExhausted { attempts: 2, .. }
        ));
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn timeout_is_cancellation() {
        let factory = MockFactory::scripted([Scripted::Timeout]);
        let pool = pool_with(&factory, 1);

        let err = execute(&pool, Touch::new("foo", 5).unwrap(), 3).unwrap_err();

        assert!(matches!(err, ExecuteError::Cancelled { attempts: 1 }));
        assert!(!factory.created()[0].is_dead());
    }

    #[test]
    fn expired_operation_is_not_sent() {
        let factory = MockFactory::new();
        let pool = pool_with(&factory, 1);
        let touch = Touch::new("foo", 5)
            .unwrap()
            .with_lifespan(Duration::from_nanos(1));
        std::thread::sleep(Duration::from_millis(2));

        let err = execute(&pool, touch, 3).unwrap_err();

        assert!(matches!(err, ExecuteError::Cancelled { attempts: 0 }));
        assert!(factory.created().is_empty());
    }

    #[test]
    fn configured_lifespan_applies_to_operations() {
        let factory = MockFactory::new();
        let config = PoolConfiguration::builder()
            .max_size(1)
            .operation_lifespan(Duration::from_millis(10))
            .build()
            .unwrap();
        let pool = pool_from(&factory, config);
        let touch = Touch::new("foo", 5).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let err = execute(&pool, touch, 3).unwrap_err();

        assert!(matches!(err, ExecuteError::Cancelled { attempts: 0 }));
        assert!(factory.created().is_empty());
    }

    #[test]
    fn own_lifespan_wins_over_configuration() {
        let factory = MockFactory::new();
        let config = PoolConfiguration::builder()
            .max_size(1)
            .operation_lifespan(Duration::from_millis(10))
            .build()
            .unwrap();
        let pool = pool_from(&factory, config);
        let touch = Touch::new("foo", 5)
            .unwrap()
            .with_lifespan(Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(20));

        let result = execute(&pool, touch, 3).unwrap();

        assert!(result.is_success());
    }

    #[test]
    fn touch_over_tcp() {
        let server = FakeServer::start("admin", "secret");
        let config = PoolConfiguration::builder()
            .max_size(2)
            .send_timeout(Duration::from_secs(1))
            .build()
            .unwrap();
        let pool = SharedConnectionPool::new(
            server.address(),
            config.clone(),
            Arc::new(TcpConnectionFactory::new(config)),
            PlainSaslAuthenticator::new("admin", "secret"),
        )
        .unwrap();

        let result = execute(&pool, Touch::new("foo", 30).unwrap(), 2).unwrap();

        assert!(result.is_success());
        assert_eq!(result.cas, 7);
    }

    #[test]
    fn partial_response_is_repaired_before_next_request() {
        let server = FakeServer::start("admin", "secret");
        let config = PoolConfiguration::builder()
            .max_size(1)
            .send_timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let pool = SharedConnectionPool::new(
            server.address(),
            config.clone(),
            Arc::new(TcpConnectionFactory::new(config)),
            PlainSaslAuthenticator::new("admin", "secret"),
        )
        .unwrap();

        let touch = Touch::new(FakeServer::PARTIAL_KEY, 30).unwrap();
        let err = execute(&pool, touch, 1).unwrap_err();
        assert!(matches!(
            err,
            ExecuteError::AttemptsExhausted { attempts: 1, .. }
        ));

        let result = execute(&pool, Touch::new("foo", 30).unwrap(), 1).unwrap();
        assert!(result.is_success());
        assert_eq!(pool.size(), 1);
        assert_eq!(server.accepted(), 2);
    }
}
