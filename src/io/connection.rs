use std::{
    fmt,
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use log::{debug, trace, warn};
use thiserror::Error;

use crate::{
    config::PoolConfiguration,
    operations::{
        Response, ResponseHeader, ResponseStatus,
        error::OperationError,
        header::{HEADER_SIZE, MAX_BODY_LENGTH},
    },
};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection IO error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out waiting for the server")]
    Timeout,

    #[error("connection {0} has been disposed")]
    Disposed(ConnectionId),

    #[error("invalid frame: {0}")]
    Operation(#[from] OperationError),

    #[error("response body of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),

    #[error("{mechanism} authentication failed with status {status:?}")]
    Authentication {
        mechanism: String,
        status: ResponseStatus,
    },

    #[error("server does not offer the {0} mechanism")]
    UnsupportedMechanism(String),
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// An authenticated channel to one server node.
///
/// Connections are shared: several callers may hold the same connection and
/// call [`send`](Connection::send) concurrently, so every method takes `&self`.
pub trait Connection: Send + Sync + fmt::Debug {
    fn id(&self) -> ConnectionId;

    fn endpoint(&self) -> SocketAddr;

    /// Set once the channel is unusable; never cleared.
    fn is_dead(&self) -> bool;

    fn mark_dead(&self);

    fn in_use(&self) -> bool;

    fn mark_used(&self, used: bool);

    fn is_authenticated(&self) -> bool;

    fn set_authenticated(&self, authenticated: bool);

    /// Writes one request frame and returns the response carrying `opaque`.
    fn send(&self, opaque: u32, request: &[u8]) -> Result<Response, ConnectionError>;

    /// Closes the channel. Calling it more than once has no further effect.
    fn dispose(&self);
}

/// Blocking TCP connection.
#[derive(Debug)]
pub struct TcpConnection {
    id: ConnectionId,
    endpoint: SocketAddr,
    stream: Mutex<Option<TcpStream>>,
    dead: AtomicBool,
    in_use: AtomicBool,
    authenticated: AtomicBool,
}

impl TcpConnection {
    pub fn connect(
        endpoint: SocketAddr,
        config: &PoolConfiguration,
    ) -> Result<Self, ConnectionError> {
        let stream = TcpStream::connect_timeout(&endpoint, config.connect_timeout)?;
        stream.set_read_timeout(Some(config.send_timeout))?;
        stream.set_write_timeout(Some(config.send_timeout))?;
        stream.set_nodelay(true)?;

        let connection = Self {
            id: ConnectionId::next(),
            endpoint,
            stream: Mutex::new(Some(stream)),
            dead: AtomicBool::new(false),
            in_use: AtomicBool::new(false),
            authenticated: AtomicBool::new(false),
        };
        debug!("{} connected to {endpoint}", connection.id);

        Ok(connection)
    }

    fn exchange(
        stream: &mut TcpStream,
        opaque: u32,
        request: &[u8],
    ) -> Result<Response, ConnectionError> {
        write_request(stream, request)?;

        loop {
            let (header, body) = read_frame(stream)?;

            // Left over from an exchange whose caller gave up waiting.
            if header.opaque != opaque {
                trace!(
                    "skipping stale response opaque={} while waiting for {opaque}",
                    header.opaque
                );
                continue;
            }

            return Ok(Response::from_parts(header, body)?);
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Writes the whole request. A timeout before the first byte leaves the stream
/// usable; after that the server holds half a frame.
fn write_request(stream: &mut TcpStream, request: &[u8]) -> Result<(), ConnectionError> {
    let mut written = 0;
    while written < request.len() {
        match stream.write(&request[written..]) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if written == 0 && is_timeout(&e) => return Err(ConnectionError::Timeout),
            Err(e) => return Err(e.into()),
        }
    }
    stream.flush()?;
    Ok(())
}

/// Reads one response frame. Only a timeout before its first byte is reported
/// as [`ConnectionError::Timeout`]; a frame cut short leaves the stream out of
/// step and comes back as an I/O error.
fn read_frame(stream: &mut TcpStream) -> Result<(ResponseHeader, Vec<u8>), ConnectionError> {
    let mut header = [0; HEADER_SIZE];
    if !read_until_full(stream, &mut header)? {
        return Err(ConnectionError::Timeout);
    }
    let header = ResponseHeader::from_bytes(&header)?;

    let length = header.total_body_length as usize;
    if length > MAX_BODY_LENGTH {
        return Err(ConnectionError::FrameTooLarge(length));
    }

    let mut body = vec![0; length];
    if !read_until_full(stream, &mut body)? {
        return Err(io::Error::from(io::ErrorKind::TimedOut).into());
    }

    Ok((header, body))
}

/// Fills `buf`. Returns `false` when the read timed out before any byte
/// arrived; a timeout after that is an error.
fn read_until_full(stream: &mut TcpStream, buf: &mut [u8]) -> Result<bool, ConnectionError> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_timeout(&e) && filled == 0 => return Ok(false),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

impl Connection for TcpConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    fn mark_dead(&self) {
        self.dead.store(true, Ordering::Release);
    }

    fn in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    fn mark_used(&self, used: bool) {
        self.in_use.store(used, Ordering::Release);
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::Release);
    }

    fn send(&self, opaque: u32, request: &[u8]) -> Result<Response, ConnectionError> {
        let mut guard = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        let stream = guard.as_mut().ok_or(ConnectionError::Disposed(self.id))?;

        match Self::exchange(stream, opaque, request) {
            Ok(response) => Ok(response),
            Err(ConnectionError::Timeout) => {
                warn!("{} timed out waiting for opaque {opaque}", self.id);
                Err(ConnectionError::Timeout)
            }
            Err(e) => {
                warn!("{} to {} is dead: {e}", self.id, self.endpoint);
                self.mark_dead();
                Err(e)
            }
        }
    }

    fn dispose(&self) {
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(stream) = stream {
            self.mark_dead();
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                trace!("{} shutdown: {e}", self.id);
            }
            debug!("{} to {} disposed", self.id, self.endpoint);
        }
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.dispose();
    }
}
