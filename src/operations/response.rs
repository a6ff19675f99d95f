use super::{
    error::OperationError,
    header::{HEADER_SIZE, ResponseHeader, ResponseStatus},
};

/// A decoded response frame, split into its three body parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub header: ResponseHeader,
    pub extras: Vec<u8>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Response {
    /// Splits `body` according to the lengths advertised in `header`.
    pub fn from_parts(header: ResponseHeader, mut body: Vec<u8>) -> Result<Self, OperationError> {
        let extras_length = usize::from(header.extras_length);
        let key_length = usize::from(header.key_length);

        if body.len() != header.total_body_length as usize {
            return Err(OperationError::Malformed(format!(
                "header announces {} body bytes but {} were read",
                header.total_body_length,
                body.len()
            )));
        }
        if extras_length + key_length > body.len() {
            return Err(OperationError::Malformed(format!(
                "extras ({extras_length}) and key ({key_length}) exceed body of {} bytes",
                body.len()
            )));
        }

        let value = body.split_off(extras_length + key_length);
        let key = body.split_off(extras_length);

        Ok(Self {
            header,
            extras: body,
            key,
            value,
        })
    }

    pub fn status(&self) -> ResponseStatus {
        self.header.status()
    }

    /// Re-assembles the frame as it travels on the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf =
            Vec::with_capacity(HEADER_SIZE + self.extras.len() + self.key.len() + self.value.len());
        buf.extend_from_slice(&self.header.to_bytes());
        buf.extend_from_slice(&self.extras);
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        buf
    }
}
