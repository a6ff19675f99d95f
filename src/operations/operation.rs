use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
    time::{Duration, Instant},
};

use log::trace;

use crate::config::DEFAULT_OPERATION_LIFESPAN;

use super::{
    OperationCode, Response, ResponseStatus,
    error::OperationError,
    frame,
    header::{HEADER_SIZE, MAX_KEY_LENGTH},
};

static OPAQUE_SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Returns the next correlation id. Ids wrap around after `u32::MAX` requests.
pub fn next_opaque() -> u32 {
    OPAQUE_SEQUENCE.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
}

/// Lifecycle of a single attempt.
///
/// `Failed` is terminal for the attempt; a retry starts over from `Created`
/// through [`Operation::clone_attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Created,
    Written,
    Completed,
    Failed,
}

/// Request state shared by every operation kind.
#[derive(Debug, Clone)]
pub struct OperationMeta {
    key: Vec<u8>,
    opaque: u32,
    state: OperationState,
    pub cas: u64,
    pub expires: u32,
    pub attempts: u32,
    pub creation_time: Instant,
    pub vbucket: u16,
    /// `None` until set by the caller or filled in from the pool's
    /// configuration when the operation is executed.
    pub lifespan: Option<Duration>,
}

impl OperationMeta {
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self, OperationError> {
        let key = key.into();
        if key.len() > MAX_KEY_LENGTH {
            return Err(OperationError::KeyTooLong(key.len()));
        }

        Ok(Self {
            key,
            opaque: next_opaque(),
            state: OperationState::Created,
            cas: 0,
            expires: 0,
            attempts: 0,
            creation_time: Instant::now(),
            vbucket: 0,
            lifespan: None,
        })
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn opaque(&self) -> u32 {
        self.opaque
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Whether the lifespan measured from the original creation time has run out.
    pub fn is_timed_out(&self) -> bool {
        let lifespan = self.lifespan.unwrap_or(DEFAULT_OPERATION_LIFESPAN);
        self.creation_time.elapsed() >= lifespan
    }

    /// Copy for a new attempt: retry state carries over, the opaque does not.
    pub fn fresh_attempt(&self) -> Self {
        Self {
            key: self.key.clone(),
            opaque: next_opaque(),
            state: OperationState::Created,
            cas: self.cas,
            expires: self.expires,
            attempts: self.attempts,
            creation_time: self.creation_time,
            vbucket: self.vbucket,
            lifespan: self.lifespan,
        }
    }

    pub(crate) fn mark_written(&mut self) {
        self.attempts += 1;
        self.state = OperationState::Written;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.state = OperationState::Failed;
    }

    fn complete(&mut self, status: ResponseStatus) {
        self.state = if status.is_success() {
            OperationState::Completed
        } else {
            OperationState::Failed
        };
    }
}

/// Outcome of one exchange, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub status: ResponseStatus,
    pub cas: u64,
    pub value: Vec<u8>,
    pub attempts: u32,
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// A protocol request/response exchange.
///
/// Implementors provide the opcode, their command specific parts and
/// [`clone_attempt`](Operation::clone_attempt); header assembly and buffer
/// layout come from the provided methods.
pub trait Operation: Send + fmt::Debug {
    fn opcode(&self) -> OperationCode;

    fn meta(&self) -> &OperationMeta;

    fn meta_mut(&mut self) -> &mut OperationMeta;

    /// Produces a new attempt of the same request with a fresh opaque.
    fn clone_attempt(&self) -> Self
    where
        Self: Sized;

    fn create_key(&self) -> Vec<u8> {
        self.meta().key().to_vec()
    }

    fn create_extras(&self) -> Vec<u8> {
        Vec::new()
    }

    fn create_body(&self) -> Vec<u8> {
        Vec::new()
    }

    fn create_header(&self, extras: &[u8], body: &[u8], key: &[u8]) -> [u8; HEADER_SIZE] {
        frame::create_header(self.opcode(), self.meta(), extras, body, key)
    }

    /// Serializes the request and counts it as an attempt.
    fn write(&mut self) -> Vec<u8> {
        let key = self.create_key();
        let extras = self.create_extras();
        let body = self.create_body();
        let header = self.create_header(&extras, &body, &key);

        self.meta_mut().mark_written();
        trace!(
            "writing {:?} opaque={} attempt={}",
            self.opcode(),
            self.meta().opaque(),
            self.meta().attempts
        );

        frame::write_frame(&header, &extras, &key, &body)
    }

    /// Folds the server's answer into this attempt.
    fn read_response(&mut self, response: Response) -> Result<OperationResult, OperationError> {
        let opcode = OperationCode::try_from(response.header.opcode)?;
        if opcode != self.opcode() {
            self.meta_mut().mark_failed();
            return Err(OperationError::OpcodeMismatch {
                expected: self.opcode(),
                received: opcode,
            });
        }
        if response.header.opaque != self.meta().opaque() {
            self.meta_mut().mark_failed();
            return Err(OperationError::OpaqueMismatch {
                expected: self.meta().opaque(),
                received: response.header.opaque,
            });
        }

        let status = response.status();
        let meta = self.meta_mut();
        meta.complete(status);
        if status.is_success() {
            meta.cas = response.header.cas;
        }

        Ok(OperationResult {
            status,
            cas: response.header.cas,
            value: response.value,
            attempts: meta.attempts,
        })
    }
}
