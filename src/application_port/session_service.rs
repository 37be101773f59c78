use super::CodecError;
use crate::domain_model::{Claims, User, UserId};
use crate::domain_port::StoreError;
use crate::logger::*;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("malformed token")]
    MalformedToken,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token secret version is stale")]
    StaleTokenVersion,
    #[error("token invalid")]
    InvalidToken,
    #[error("token revoked")]
    TokenRevoked,
    #[error("session storage unavailable")]
    StorageUnavailable,
    #[error("operation cancelled")]
    Cancelled,
    #[error("internal error")]
    InternalError,
}

impl AuthError {
    /// Worth retrying with the same input.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::StorageUnavailable | AuthError::Cancelled)
    }
}

impl From<CodecError> for AuthError {
    fn from(error: CodecError) -> Self {
        match error {
            CodecError::Malformed => AuthError::MalformedToken,
            CodecError::InvalidSignature => AuthError::InvalidSignature,
            CodecError::Expired => AuthError::Expired,
            CodecError::StaleTokenVersion => AuthError::StaleTokenVersion,
            CodecError::Signing(e) => {
                warn!("token signing failed: {}", e);
                AuthError::InternalError
            }
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(error: StoreError) -> Self {
        warn!("session store failure: {}", error);
        AuthError::StorageUnavailable
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub token_type: &'static str,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    async fn issue(&self, user: &User, cancel: &CancellationToken)
    -> Result<AuthTokens, AuthError>;

    /// Exchange a live refresh token for a new pair. The presented token is
    /// single-use: a second exchange fails with [`AuthError::TokenRevoked`].
    async fn rotate(
        &self,
        user: &User,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthTokens, AuthError>;

    /// Stateless check of an access token; no store lookup.
    fn validate_access(&self, access_token: &str) -> Result<Claims, AuthError>;

    /// Subject of a refresh token without consulting the store. A revoked token
    /// still yields its subject.
    fn subject_of(&self, refresh_token: &str) -> Result<UserId, AuthError>;

    async fn revoke(&self, refresh_token: &str, cancel: &CancellationToken)
    -> Result<(), AuthError>;
}
