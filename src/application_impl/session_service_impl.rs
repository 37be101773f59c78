use super::refresh_store::{RefreshStore, SessionKey};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::StoreError;
use crate::logger::*;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub issuer: String,
    /// Tokens minted under any other version are refused.
    pub secret_version: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub access_secret: SigningSecret,
    pub refresh_secret: SigningSecret,
}

/// Issues, rotates and revokes access/refresh pairs. Access tokens are never
/// stored; each refresh token's id maps to its encoded string in the
/// [`RefreshStore`], and that entry is the only proof the session is live.
pub struct RealSessionService {
    cfg: SessionConfig,
    codec: Arc<dyn TokenCodec>,
    refresh_store: RefreshStore,
}

async fn guarded<T, F>(cancel: &CancellationToken, op: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AuthError::Cancelled),
        result = op => result.map_err(AuthError::from),
    }
}

/// Issue and rotate fail closed: an unreachable store surfaces as
/// `InternalError` and nothing is granted.
fn fail_closed(error: AuthError) -> AuthError {
    match error {
        AuthError::StorageUnavailable => AuthError::InternalError,
        other => other,
    }
}

impl RealSessionService {
    pub fn new(cfg: SessionConfig, codec: Arc<dyn TokenCodec>, refresh_store: RefreshStore) -> Self {
        Self {
            cfg,
            codec,
            refresh_store,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.cfg
    }

    fn mint_pair(&self, user: &User) -> Result<(AuthTokens, Claims), AuthError> {
        let access = Claims::mint(
            user,
            TokenKind::Access,
            &self.cfg.secret_version,
            &self.cfg.issuer,
            self.cfg.access_ttl,
        );
        let refresh = Claims::mint(
            user,
            TokenKind::Refresh,
            &self.cfg.secret_version,
            &self.cfg.issuer,
            self.cfg.refresh_ttl,
        );

        let access_token = self.codec.encode(&access, &self.cfg.access_secret)?;
        let refresh_token = self.codec.encode(&refresh, &self.cfg.refresh_secret)?;
        let refresh_token_expires_at = refresh.expires_at().ok_or(AuthError::InternalError)?;

        let tokens = AuthTokens {
            access_token: AccessToken(access_token),
            refresh_token: RefreshToken(refresh_token),
            expires_in: self.cfg.access_ttl.as_secs(),
            token_type: "Bearer",
            refresh_token_expires_at,
        };
        Ok((tokens, refresh))
    }

    /// Persist a freshly minted refresh entry. If cancellation is observed
    /// before the write is confirmed, the entry is removed again so nothing
    /// the caller never received stays live.
    async fn commit_refresh(
        &self,
        key: &SessionKey,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AuthError> {
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        let written = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.refresh_store.put(key, token, self.cfg.refresh_ttl) => Some(result),
        };

        match written {
            Some(Ok(())) if !cancel.is_cancelled() => Ok(()),
            Some(Err(e)) => Err(fail_closed(e.into())),
            _ => {
                self.discard(key).await;
                Err(AuthError::Cancelled)
            }
        }
    }

    /// Best-effort delete that ignores cancellation; a failure only leaves an
    /// entry behind until its TTL runs out.
    async fn discard(&self, key: &SessionKey) {
        if let Err(e) = self.refresh_store.delete(key).await {
            warn!(key = %key, "failed to delete refresh entry: {}", e);
        }
    }

    fn decode_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self
            .codec
            .decode(token, &self.cfg.refresh_secret, &self.cfg.secret_version)?;
        if claims.kind != TokenKind::Refresh {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}

#[async_trait::async_trait]
impl SessionService for RealSessionService {
    async fn issue(&self, user: &User, cancel: &CancellationToken) -> Result<AuthTokens, AuthError> {
        let (tokens, refresh) = self.mint_pair(user)?;
        let key = self.refresh_store.key(&refresh.jti);
        self.commit_refresh(&key, &tokens.refresh_token.0, cancel)
            .await?;

        debug!(user_id = %user.id, jti = %refresh.jti, "session issued");
        Ok(tokens)
    }

    async fn rotate(
        &self,
        user: &User,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthTokens, AuthError> {
        let presented = self.decode_refresh(refresh_token).map_err(|e| match e {
            AuthError::StaleTokenVersion => AuthError::StaleTokenVersion,
            other => {
                debug!("refresh token rejected: {}", other);
                AuthError::InvalidToken
            }
        })?;
        if presented.sub != user.id {
            return Err(AuthError::InvalidToken);
        }

        let old_key = self.refresh_store.key(&presented.jti);
        let stored = guarded(cancel, self.refresh_store.get(&old_key))
            .await
            .map_err(fail_closed)?;
        if stored.as_deref() != Some(refresh_token) {
            return Err(AuthError::TokenRevoked);
        }

        // Commit the new entry first, then retire the old one.
        let (tokens, refresh) = self.mint_pair(user)?;
        let new_key = self.refresh_store.key(&refresh.jti);
        self.commit_refresh(&new_key, &tokens.refresh_token.0, cancel)
            .await?;
        self.discard(&old_key).await;

        debug!(
            user_id = %user.id,
            old_jti = %presented.jti,
            new_jti = %refresh.jti,
            "session rotated"
        );
        Ok(tokens)
    }

    fn validate_access(&self, access_token: &str) -> Result<Claims, AuthError> {
        let claims = self.codec.decode(
            access_token,
            &self.cfg.access_secret,
            &self.cfg.secret_version,
        )?;
        if claims.kind != TokenKind::Access {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    fn subject_of(&self, refresh_token: &str) -> Result<UserId, AuthError> {
        self.decode_refresh(refresh_token).map(|claims| claims.sub)
    }

    async fn revoke(&self, refresh_token: &str, cancel: &CancellationToken) -> Result<(), AuthError> {
        let claims = self.decode_refresh(refresh_token)?;
        let key = self.refresh_store.key(&claims.jti);
        guarded(cancel, self.refresh_store.delete(&key)).await?;

        debug!(user_id = %claims.sub, jti = %claims.jti, "session revoked");
        Ok(())
    }
}
