use std::time::Duration;

use crate::converter::{ByteConverter, DefaultConverter};

use super::{Operation, OperationCode, OperationMeta, error::OperationError};

const EXTRAS_SIZE: usize = size_of::<u32>();

/// Refreshes the expiry of a stored item without fetching it.
#[derive(Debug)]
pub struct Touch {
    meta: OperationMeta,
}

impl Touch {
    /// `expires` is the new time-to-live, in the server's expiry encoding.
    pub fn new(key: impl Into<Vec<u8>>, expires: u32) -> Result<Self, OperationError> {
        let mut meta = OperationMeta::new(key)?;
        if meta.key().is_empty() {
            return Err(OperationError::EmptyKey);
        }
        meta.expires = expires;
        Ok(Self { meta })
    }

    #[must_use]
    pub fn with_vbucket(mut self, vbucket: u16) -> Self {
        self.meta.vbucket = vbucket;
        self
    }

    #[must_use]
    pub fn with_lifespan(mut self, lifespan: Duration) -> Self {
        self.meta.lifespan = Some(lifespan);
        self
    }
}

impl Operation for Touch {
    fn opcode(&self) -> OperationCode {
        OperationCode::Touch
    }

    fn meta(&self) -> &OperationMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut OperationMeta {
        &mut self.meta
    }

    fn create_extras(&self) -> Vec<u8> {
        let mut extras = vec![0; EXTRAS_SIZE];
        DefaultConverter.from_u32(self.meta.expires, &mut extras, 0);
        extras
    }

    fn clone_attempt(&self) -> Self {
        Self {
            meta: self.meta.fresh_attempt(),
        }
    }
}
