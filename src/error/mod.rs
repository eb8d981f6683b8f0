mod castor;
mod transport;

pub use castor::{AttemptFailure, CastorError};
pub use castor_schema::DecodeError;
pub use transport::{TransportError, TransportErrorKind};

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
