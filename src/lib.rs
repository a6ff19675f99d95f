pub mod config;
pub mod converter;
pub mod io;
pub mod operations;

pub use config::PoolConfiguration;
pub use io::{ConnectionPool, SharedConnectionPool, execute};
pub use operations::{Operation, Touch};
