use std::{error::Error, net::SocketAddr, sync::Arc, time::Duration};

use clap::Parser;
use floe::{
    ConnectionPool, PoolConfiguration, SharedConnectionPool, Touch, execute,
    io::{NoAuthentication, PlainSaslAuthenticator, TcpConnectionFactory},
};
use log::{info, warn};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server node to connect to
    address: SocketAddr,
    /// Key whose expiry is updated
    key: String,
    /// New expiry in seconds; zero means never
    #[arg(long, default_value_t = 0)]
    expiry: u32,
    /// SASL PLAIN user name
    #[arg(long, requires = "password")]
    username: Option<String>,
    /// SASL PLAIN password
    #[arg(long, requires = "username")]
    password: Option<String>,
    /// Number of pooled connections
    #[arg(long, default_value_t = 2)]
    pool_size: usize,
    /// Attempts before giving up
    #[arg(long, default_value_t = 3)]
    attempts: u32,
    /// Send timeout in milliseconds
    #[arg(long, default_value_t = 15_000)]
    timeout_ms: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let config = PoolConfiguration::builder()
        .max_size(cli.pool_size)
        .send_timeout(Duration::from_millis(cli.timeout_ms))
        .build()?;
    let factory = Arc::new(TcpConnectionFactory::new(config.clone()));

    let pool = match (cli.username, cli.password) {
        (Some(username), Some(password)) => SharedConnectionPool::new(
            cli.address,
            config,
            factory,
            PlainSaslAuthenticator::new(username, password),
        )?,
        _ => SharedConnectionPool::new(cli.address, config, factory, NoAuthentication)?,
    }
    .with_owner(|is_dead: bool| {
        if is_dead {
            warn!("lost a connection to the server");
        }
    });

    pool.initialize();
    if pool.initialization_failed() {
        warn!("pool for {} only partially initialized", cli.address);
    }

    let touch = Touch::new(cli.key, cli.expiry)?;
    let outcome = execute(&pool, touch, cli.attempts);
    info!("{:?}", pool.status());
    pool.dispose();

    let result = outcome?;
    println!(
        "{:?} cas={} attempts={}",
        result.status, result.cas, result.attempts
    );
    Ok(())
}
