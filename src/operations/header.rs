use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
    decode_from_slice, encode_into_slice,
};

use super::error::OperationError;

pub const HEADER_SIZE: usize = 24;
pub const MAX_KEY_LENGTH: usize = 250;
/// Largest response body a client reads; anything bigger is a broken stream.
pub const MAX_BODY_LENGTH: usize = 32 * 1024 * 1024;

pub const REQUEST_MAGIC: u8 = 0x80;
pub const RESPONSE_MAGIC: u8 = 0x81;

const RAW_DATA_TYPE: u8 = 0x00;

/// Fixed-width, big-endian encoding with no length prefixes. Header structs
/// encoded with it occupy exactly [`HEADER_SIZE`] bytes.
pub(crate) fn wire_config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

/// Protocol commands this crate knows how to frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationCode {
    Touch = 0x1c,
    SaslList = 0x20,
    SaslAuth = 0x21,
}

impl From<OperationCode> for u8 {
    fn from(value: OperationCode) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for OperationCode {
    type Error = OperationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x1c => Ok(OperationCode::Touch),
            0x20 => Ok(OperationCode::SaslList),
            0x21 => Ok(OperationCode::SaslAuth),
            other => Err(OperationError::UnknownOpcode(other)),
        }
    }
}

/// Status carried in the response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    KeyNotFound,
    KeyExists,
    ValueTooLarge,
    InvalidArguments,
    ItemNotStored,
    NotMyVbucket,
    AuthError,
    AuthContinue,
    UnknownCommand,
    OutOfMemory,
    Busy,
    TemporaryFailure,
    Other(u16),
}

impl ResponseStatus {
    pub fn is_success(self) -> bool {
        self == ResponseStatus::Success
    }

    /// Statuses after which the same request may succeed on another attempt.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            ResponseStatus::NotMyVbucket | ResponseStatus::Busy | ResponseStatus::TemporaryFailure
        )
    }
}

impl From<u16> for ResponseStatus {
    fn from(value: u16) -> Self {
        match value {
            0x0000 => ResponseStatus::Success,
            0x0001 => ResponseStatus::KeyNotFound,
            0x0002 => ResponseStatus::KeyExists,
            0x0003 => ResponseStatus::ValueTooLarge,
            0x0004 => ResponseStatus::InvalidArguments,
            0x0005 => ResponseStatus::ItemNotStored,
            0x0007 => ResponseStatus::NotMyVbucket,
            0x0020 => ResponseStatus::AuthError,
            0x0021 => ResponseStatus::AuthContinue,
            0x0081 => ResponseStatus::UnknownCommand,
            0x0082 => ResponseStatus::OutOfMemory,
            0x0085 => ResponseStatus::Busy,
            0x0086 => ResponseStatus::TemporaryFailure,
            other => ResponseStatus::Other(other),
        }
    }
}

impl From<ResponseStatus> for u16 {
    fn from(value: ResponseStatus) -> Self {
        match value {
            ResponseStatus::Success => 0x0000,
            ResponseStatus::KeyNotFound => 0x0001,
            ResponseStatus::KeyExists => 0x0002,
            ResponseStatus::ValueTooLarge => 0x0003,
            ResponseStatus::InvalidArguments => 0x0004,
            ResponseStatus::ItemNotStored => 0x0005,
            ResponseStatus::NotMyVbucket => 0x0007,
            ResponseStatus::AuthError => 0x0020,
            ResponseStatus::AuthContinue => 0x0021,
            ResponseStatus::UnknownCommand => 0x0081,
            ResponseStatus::OutOfMemory => 0x0082,
            ResponseStatus::Busy => 0x0085,
            ResponseStatus::TemporaryFailure => 0x0086,
            ResponseStatus::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct RequestHeader {
    pub magic: u8,
    pub opcode: u8,
    pub key_length: u16,
    pub extras_length: u8,
    pub data_type: u8,
    pub vbucket: u16,
    pub total_body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl RequestHeader {
    pub fn new(
        opcode: OperationCode,
        extras_length: u8,
        key_length: u16,
        body_length: u32,
        vbucket: u16,
        opaque: u32,
        cas: u64,
    ) -> Self {
        Self {
            magic: REQUEST_MAGIC,
            opcode: opcode.into(),
            key_length,
            extras_length,
            data_type: RAW_DATA_TYPE,
            vbucket,
            total_body_length: u32::from(extras_length) + u32::from(key_length) + body_length,
            opaque,
            cas,
        }
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0; HEADER_SIZE];
        encode_into_slice(self, &mut buf, wire_config()).expect("header fits in HEADER_SIZE");
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, OperationError> {
        let (header, _): (RequestHeader, usize) = decode_from_slice(buf, wire_config())?;
        if header.magic != REQUEST_MAGIC {
            return Err(OperationError::InvalidMagic(header.magic));
        }
        Ok(header)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct ResponseHeader {
    pub magic: u8,
    pub opcode: u8,
    pub key_length: u16,
    pub extras_length: u8,
    pub data_type: u8,
    pub status: u16,
    pub total_body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl ResponseHeader {
    pub fn new(
        opcode: OperationCode,
        status: ResponseStatus,
        opaque: u32,
        cas: u64,
        extras_length: u8,
        key_length: u16,
        value_length: u32,
    ) -> Self {
        Self {
            magic: RESPONSE_MAGIC,
            opcode: opcode.into(),
            key_length,
            extras_length,
            data_type: RAW_DATA_TYPE,
            status: status.into(),
            total_body_length: u32::from(extras_length) + u32::from(key_length) + value_length,
            opaque,
            cas,
        }
    }

    pub fn status(&self) -> ResponseStatus {
        self.status.into()
    }

    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0; HEADER_SIZE];
        encode_into_slice(self, &mut buf, wire_config()).expect("header fits in HEADER_SIZE");
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, OperationError> {
        let (header, _): (ResponseHeader, usize) = decode_from_slice(buf, wire_config())?;
        if header.magic != RESPONSE_MAGIC {
            return Err(OperationError::InvalidMagic(header.magic));
        }
        Ok(header)
    }
}
