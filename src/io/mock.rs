//! Test doubles for the connection layer.
use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use log::{debug, warn};

use crate::operations::{
    OperationCode, RequestHeader, Response, ResponseHeader, ResponseStatus, header::HEADER_SIZE,
};

use super::{Authenticator, Connection, ConnectionError, ConnectionFactory, ConnectionId};

/// What a [`MockConnection`] does with the next request it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scripted {
    Status(ResponseStatus),
    IoFailure,
    Timeout,
}

#[derive(Debug)]
pub(crate) struct MockConnection {
    id: ConnectionId,
    endpoint: SocketAddr,
    dead: AtomicBool,
    in_use: AtomicBool,
    authenticated: AtomicBool,
    disposals: AtomicUsize,
    sent: AtomicUsize,
    opaques: Mutex<Vec<u32>>,
    script: Arc<Mutex<VecDeque<Scripted>>>,
}

impl MockConnection {
    fn new(endpoint: SocketAddr, script: Arc<Mutex<VecDeque<Scripted>>>) -> Self {
        Self {
            id: ConnectionId::next(),
            endpoint,
            dead: AtomicBool::new(false),
            in_use: AtomicBool::new(false),
            authenticated: AtomicBool::new(false),
            disposals: AtomicUsize::new(0),
            sent: AtomicUsize::new(0),
            opaques: Mutex::new(Vec::new()),
            script,
        }
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    /// Opaques of every request sent, in order.
    pub fn opaques(&self) -> Vec<u32> {
        self.opaques.lock().unwrap().clone()
    }
}

impl Connection for MockConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    fn mark_dead(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }

    fn in_use(&self) -> bool {
        self.in_use.load(Ordering::SeqCst)
    }

    fn mark_used(&self, used: bool) {
        self.in_use.store(used, Ordering::SeqCst);
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    fn send(&self, opaque: u32, request: &[u8]) -> Result<Response, ConnectionError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.opaques.lock().unwrap().push(opaque);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Scripted::Status(ResponseStatus::Success));

        match next {
            Scripted::Status(status) => {
                let header: [u8; HEADER_SIZE] = request[..HEADER_SIZE].try_into().unwrap();
                let request = RequestHeader::from_bytes(&header)?;
                let opcode = OperationCode::try_from(request.opcode)?;
                let header = ResponseHeader::new(opcode, status, opaque, 1, 0, 0, 0);
                Ok(Response::from_parts(header, Vec::new())?)
            }
            Scripted::IoFailure => {
                self.mark_dead();
                Err(io::Error::from(io::ErrorKind::ConnectionReset).into())
            }
            Scripted::Timeout => Err(ConnectionError::Timeout),
        }
    }

    fn dispose(&self) {
        self.disposals.fetch_add(1, Ordering::SeqCst);
        self.mark_dead();
    }
}

/// Hands out [`MockConnection`]s and remembers every one it created.
#[derive(Debug, Default)]
pub(crate) struct MockFactory {
    created: Mutex<Vec<Arc<MockConnection>>>,
    script: Arc<Mutex<VecDeque<Scripted>>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(script: impl IntoIterator<Item = Scripted>) -> Arc<Self> {
        let factory = Self::default();
        factory.script.lock().unwrap().extend(script);
        Arc::new(factory)
    }

    pub fn created(&self) -> Vec<Arc<MockConnection>> {
        self.created.lock().unwrap().clone()
    }
}

impl ConnectionFactory for MockFactory {
    fn create(&self, endpoint: SocketAddr) -> Result<Arc<dyn Connection>, ConnectionError> {
        let connection = Arc::new(MockConnection::new(endpoint, Arc::clone(&self.script)));
        self.created.lock().unwrap().push(Arc::clone(&connection));
        let connection: Arc<dyn Connection> = connection;
        Ok(connection)
    }
}

/// Fails the handshake on the listed (1-based) calls.
#[derive(Debug, Default)]
pub(crate) struct ScriptedAuthenticator {
    calls: AtomicUsize,
    fail_on: Vec<usize>,
}

impl ScriptedAuthenticator {
    pub fn failing_on(calls: &[usize]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on: calls.to_vec(),
        }
    }
}

impl Authenticator for ScriptedAuthenticator {
    fn authenticate(&self, _connection: &dyn Connection) -> Result<(), ConnectionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on.contains(&call) {
            return Err(ConnectionError::Authentication {
                mechanism: "PLAIN".into(),
                status: ResponseStatus::AuthError,
            });
        }
        Ok(())
    }
}

/// Loopback server speaking just enough of the binary protocol for tests.
///
/// Touch requests are answered with success unless their key is one of the
/// control keys below.
pub(crate) struct FakeServer {
    address: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl FakeServer {
    /// Close the socket instead of answering.
    pub const HANGUP_KEY: &'static str = "hang-up";
    /// Never answer; the client times out.
    pub const SILENT_KEY: &'static str = "silent";
    /// Answer with a foreign opaque first, then with the real one.
    pub const STALE_KEY: &'static str = "stale";
    /// Send part of the response header, stall for [`Self::PARTIAL_STALL`],
    /// then send the rest.
    pub const PARTIAL_KEY: &'static str = "partial";
    pub const PARTIAL_STALL: Duration = Duration::from_secs(1);
    /// Announce a body larger than any client accepts.
    pub const OVERSIZED_KEY: &'static str = "oversized";

    pub fn start(username: &str, password: &str) -> Self {
        Self::start_with_mechanisms(username, password, "SCRAM-SHA1 PLAIN")
    }

    pub fn start_with_mechanisms(username: &str, password: &str, mechanisms: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let mut credentials = vec![0];
        credentials.extend_from_slice(username.as_bytes());
        credentials.push(0);
        credentials.extend_from_slice(password.as_bytes());
        let credentials = Arc::new(credentials);
        let mechanisms = Arc::new(mechanisms.to_string());

        let counter = Arc::clone(&accepted);
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        counter.fetch_add(1, Ordering::SeqCst);
                        let credentials = Arc::clone(&credentials);
                        let mechanisms = Arc::clone(&mechanisms);
                        thread::spawn(move || {
                            if let Err(e) = handle_connection(stream, &credentials, &mechanisms) {
                                debug!("fake server connection ended: {e}");
                            }
                        });
                    }
                    Err(e) => warn!("broken connection: {e:?}"),
                }
            }
        });

        Self { address, accepted }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

fn handle_connection(
    mut stream: TcpStream,
    credentials: &[u8],
    mechanisms: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let mut header = [0; HEADER_SIZE];
        stream.read_exact(&mut header)?;
        let request = RequestHeader::from_bytes(&header)?;

        let mut body = vec![0; request.total_body_length as usize];
        stream.read_exact(&mut body)?;
        let extras_end = usize::from(request.extras_length);
        let key = &body[extras_end..extras_end + usize::from(request.key_length)];
        let value = &body[extras_end + usize::from(request.key_length)..];

        let opcode = OperationCode::try_from(request.opcode)?;
        let (status, payload) = match opcode {
            OperationCode::SaslList => (ResponseStatus::Success, mechanisms.as_bytes().to_vec()),
            OperationCode::SaslAuth if value == credentials => {
                (ResponseStatus::Success, b"Authenticated".to_vec())
            }
            OperationCode::SaslAuth => (ResponseStatus::AuthError, b"Auth failure".to_vec()),
            OperationCode::Touch if key == FakeServer::HANGUP_KEY.as_bytes() => return Ok(()),
            OperationCode::Touch if key == FakeServer::SILENT_KEY.as_bytes() => continue,
            OperationCode::Touch if key == FakeServer::OVERSIZED_KEY.as_bytes() => {
                let header = ResponseHeader::new(
                    opcode,
                    ResponseStatus::Success,
                    request.opaque,
                    0,
                    0,
                    0,
                    u32::MAX,
                );
                stream.write_all(&header.to_bytes())?;
                continue;
            }
            OperationCode::Touch => (ResponseStatus::Success, Vec::new()),
        };

        if key == FakeServer::STALE_KEY.as_bytes() {
            let stale = ResponseHeader::new(
                opcode,
                ResponseStatus::Success,
                request.opaque.wrapping_add(1000),
                0,
                0,
                0,
                3,
            );
            stream.write_all(&stale.to_bytes())?;
            stream.write_all(b"old")?;
        }

        let header = ResponseHeader::new(
            opcode,
            status,
            request.opaque,
            7,
            0,
            0,
            payload.len() as u32,
        )
        .to_bytes();

        if key == FakeServer::PARTIAL_KEY.as_bytes() {
            stream.write_all(&header[..10])?;
            stream.flush()?;
            thread::sleep(FakeServer::PARTIAL_STALL);
            stream.write_all(&header[10..])?;
        } else {
            stream.write_all(&header)?;
        }
        stream.write_all(&payload)?;
    }
}
