use key_attestation::TrustAnchorError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid trust anchor configuration: {0}")]
    Config(#[from] TrustAnchorError),
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
