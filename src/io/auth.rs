use std::fmt;

use log::debug;

use crate::operations::{Operation, PLAIN_MECHANISM, SaslAuth, SaslList, parse_mechanisms};

use super::{Connection, ConnectionError};

/// Handshake a freshly created connection must pass before it is pooled.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, connection: &dyn Connection) -> Result<(), ConnectionError>;
}

/// For servers that accept unauthenticated clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuthentication;

impl Authenticator for NoAuthentication {
    fn authenticate(&self, _connection: &dyn Connection) -> Result<(), ConnectionError> {
        Ok(())
    }
}

/// SASL `PLAIN` handshake: list mechanisms, then authenticate in one step.
#[derive(Clone)]
pub struct PlainSaslAuthenticator {
    username: String,
    password: String,
}

impl PlainSaslAuthenticator {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for PlainSaslAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainSaslAuthenticator")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Authenticator for PlainSaslAuthenticator {
    fn authenticate(&self, connection: &dyn Connection) -> Result<(), ConnectionError> {
        let mut list = SaslList::new();
        let buffer = list.write();
        let response = connection.send(list.meta().opaque(), &buffer)?;
        let listed = list.read_response(response)?;

        let mechanisms = parse_mechanisms(&listed.value);
        if !listed.is_success() || !mechanisms.iter().any(|m| m == PLAIN_MECHANISM) {
            return Err(ConnectionError::UnsupportedMechanism(
                PLAIN_MECHANISM.to_string(),
            ));
        }

        let mut auth = SaslAuth::plain(&self.username, &self.password)?;
        let buffer = auth.write();
        let response = connection.send(auth.meta().opaque(), &buffer)?;
        let result = auth.read_response(response)?;

        if !result.is_success() {
            return Err(ConnectionError::Authentication {
                mechanism: auth.mechanism(),
                status: result.status,
            });
        }

        debug!(
            "{} authenticated as '{}' using {}",
            connection.id(),
            self.username,
            auth.mechanism()
        );
        Ok(())
    }
}
