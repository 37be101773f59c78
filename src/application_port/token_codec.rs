use crate::domain_model::{Claims, SigningSecret};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token minted under a retired secret version")]
    StaleTokenVersion,
    #[error("signing failed: {0}")]
    Signing(String),
}

pub trait TokenCodec: Send + Sync {
    fn encode(&self, claims: &Claims, secret: &SigningSecret) -> Result<String, CodecError>;

    /// Verify signature and expiry under `secret`, then require the embedded
    /// secret version to equal `current_version`.
    fn decode(
        &self,
        token: &str,
        secret: &SigningSecret,
        current_version: &str,
    ) -> Result<Claims, CodecError>;
}
