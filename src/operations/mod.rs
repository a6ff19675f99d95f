//! Binary request framing.
//!
//! Every request sent to a server node is a single contiguous frame made of a
//! fixed-size header followed by three variable parts:
//!
//! ```text
//! [ header: magic, opcode, key_len, extras_len, data_type, vbucket, body_len, opaque, cas ]
//! [ extras: command specific, fixed layout ]
//! [ key:    key_len bytes ]
//! [ body:   remaining bytes ]
//! ```
//!
//! All integers are big-endian. The header is [`HEADER_SIZE`](header::HEADER_SIZE)
//! bytes and its length fields always describe the parts that follow exactly;
//! the server rejects any frame where they disagree.
//!
//! # Key Components
//!
//! - [`Operation`]: capability trait implemented by each command. The shared
//!   provided methods assemble the header and the frame so a command only
//!   supplies its opcode, extras, key and body.
//! - [`OperationMeta`]: retry metadata (attempts, CAS, expiry, creation time)
//!   and the opaque used to correlate a response with its request.
//! - [`Touch`]: refreshes an item's expiry; the reference command.
//! - [`SaslList`] / [`SaslAuth`]: the authentication handshake.
//!
//! # Retries
//!
//! An operation is single use. When an attempt fails on a connection the
//! caller asks for [`Operation::clone_attempt`], which keeps the attempt
//! counter, CAS, creation time and expiry and draws a fresh opaque, then
//! writes the clone on a newly acquired connection. How many attempts are
//! allowed is the caller's decision.
//!
//! # See Also
//!
//! - [`io`](crate::io): Connections that carry the frames built here.
pub mod frame;
pub mod header;
mod operation;
mod response;
mod sasl;
mod touch;

pub use header::{OperationCode, RequestHeader, ResponseHeader, ResponseStatus};
pub use operation::{Operation, OperationMeta, OperationResult, OperationState, next_opaque};
pub use response::Response;
pub use sasl::{PLAIN_MECHANISM, SaslAuth, SaslList, parse_mechanisms};
pub use touch::Touch;

pub mod error {
    use thiserror::Error;

    use super::{OperationCode, header::MAX_KEY_LENGTH};

    #[derive(Debug, Error)]
    pub enum OperationError {
        #[error("key of {0} bytes exceeds the {max} byte limit", max = MAX_KEY_LENGTH)]
        KeyTooLong(usize),

        #[error("key must not be empty")]
        EmptyKey,

        #[error("invalid magic byte {0:#04x}")]
        InvalidMagic(u8),

        #[error("unknown opcode {0:#04x}")]
        UnknownOpcode(u8),

        #[error("response to {received:?} does not answer {expected:?}")]
        OpcodeMismatch {
            expected: OperationCode,
            received: OperationCode,
        },

        #[error("response opaque {received} does not match request opaque {expected}")]
        OpaqueMismatch { expected: u32, received: u32 },

        #[error("malformed response: {0}")]
        Malformed(String),

        #[error("failed to decode header: {0}")]
        Decode(#[from] bincode::error::DecodeError),
    }
}
