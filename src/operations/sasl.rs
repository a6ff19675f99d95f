use super::{Operation, OperationCode, OperationMeta, error::OperationError};

pub const PLAIN_MECHANISM: &str = "PLAIN";

/// Asks the server which SASL mechanisms it accepts.
#[derive(Debug)]
pub struct SaslList {
    meta: OperationMeta,
}

impl SaslList {
    pub fn new() -> Self {
        Self {
            meta: OperationMeta::new(Vec::new()).expect("empty key is within limits"),
        }
    }
}

impl Default for SaslList {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation for SaslList {
    fn opcode(&self) -> OperationCode {
        OperationCode::SaslList
    }

    fn meta(&self) -> &OperationMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut OperationMeta {
        &mut self.meta
    }

    fn clone_attempt(&self) -> Self {
        Self {
            meta: self.meta.fresh_attempt(),
        }
    }
}

/// Splits the space separated mechanism list returned by [`SaslList`].
pub fn parse_mechanisms(value: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(value)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Single-step SASL authentication. The mechanism name travels as the key.
#[derive(Debug)]
pub struct SaslAuth {
    meta: OperationMeta,
    payload: Vec<u8>,
}

impl SaslAuth {
    /// `PLAIN` authentication: `\0username\0password`.
    pub fn plain(username: &str, password: &str) -> Result<Self, OperationError> {
        let mut payload = Vec::with_capacity(2 + username.len() + password.len());
        payload.push(0);
        payload.extend_from_slice(username.as_bytes());
        payload.push(0);
        payload.extend_from_slice(password.as_bytes());

        Ok(Self {
            meta: OperationMeta::new(PLAIN_MECHANISM)?,
            payload,
        })
    }

    pub fn mechanism(&self) -> String {
        String::from_utf8_lossy(self.meta.key()).into_owned()
    }
}

impl Operation for SaslAuth {
    fn opcode(&self) -> OperationCode {
        OperationCode::SaslAuth
    }

    fn meta(&self) -> &OperationMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut OperationMeta {
        &mut self.meta
    }

    fn create_body(&self) -> Vec<u8> {
        self.payload.clone()
    }

    fn clone_attempt(&self) -> Self {
        Self {
            meta: self.meta.fresh_attempt(),
            payload: self.payload.clone(),
        }
    }
}
