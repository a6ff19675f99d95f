//! Pool tunables.
//!
//! [`PoolConfiguration`] carries everything a [`SharedConnectionPool`](crate::io::SharedConnectionPool)
//! needs besides its endpoint: how many connections to keep and how long the
//! blocking socket calls are allowed to take. Values are validated once when
//! the configuration is built so the pool can rely on them afterwards.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use floe::config::PoolConfiguration;
//!
//! let config = PoolConfiguration::builder()
//!     .max_size(4)
//!     .send_timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.max_size, 4);
//! ```
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MAX_SIZE: usize = 2;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_OPERATION_LIFESPAN: Duration = Duration::from_millis(2500);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_size must be at least 1")]
    EmptyPool,

    #[error("{name} must be greater than zero")]
    ZeroTimeout { name: &'static str },
}

/// Validated pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfiguration {
    /// Number of connections the pool grows to and repairs back to.
    pub max_size: usize,
    /// Upper bound for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Read and write timeout applied to every exchange on a connection.
    pub send_timeout: Duration,
    /// Default lifespan of an operation, including its retries.
    pub operation_lifespan: Duration,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            operation_lifespan: DEFAULT_OPERATION_LIFESPAN,
        }
    }
}

impl PoolConfiguration {
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::EmptyPool);
        }

        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("send_timeout", self.send_timeout),
            ("operation_lifespan", self.operation_lifespan),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroTimeout { name });
            }
        }

        Ok(())
    }
}

/// Builder for [`PoolConfiguration`], starting from the defaults.
#[derive(Debug, Default)]
pub struct Builder {
    inner: PoolConfiguration,
}

impl Builder {
    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.inner.max_size = max_size;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.inner.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.inner.send_timeout = timeout;
        self
    }

    #[must_use]
    pub fn operation_lifespan(mut self, lifespan: Duration) -> Self {
        self.inner.operation_lifespan = lifespan;
        self
    }

    pub fn build(self) -> Result<PoolConfiguration, ConfigError> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}
