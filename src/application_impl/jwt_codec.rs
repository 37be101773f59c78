use crate::application_port::{CodecError, TokenCodec};
use crate::domain_model::{Claims, SigningSecret};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

/// HS256-only codec. Tokens carrying any other `alg` are rejected before the
/// claims are looked at.
pub struct JwtHs256Codec {
    issuer: String,
    leeway_secs: u64,
}

impl JwtHs256Codec {
    pub fn new(issuer: impl Into<String>) -> Self {
        JwtHs256Codec {
            issuer: issuer.into(),
            leeway_secs: 0,
        }
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    fn validation(&self) -> Validation {
        let mut v = Validation::new(Algorithm::HS256);
        v.validate_exp = true;
        v.leeway = self.leeway_secs;
        v.set_issuer(&[self.issuer.as_str()]);
        v.set_required_spec_claims(&["exp", "iss", "sub"]);
        v
    }
}

fn map_decode_error(error: jsonwebtoken::errors::Error) -> CodecError {
    match error.kind() {
        ErrorKind::ExpiredSignature => CodecError::Expired,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName => CodecError::InvalidSignature,
        _ => CodecError::Malformed,
    }
}

impl TokenCodec for JwtHs256Codec {
    fn encode(&self, claims: &Claims, secret: &SigningSecret) -> Result<String, CodecError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| CodecError::Signing(e.to_string()))
    }

    fn decode(
        &self,
        token: &str,
        secret: &SigningSecret,
        current_version: &str,
    ) -> Result<Claims, CodecError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &self.validation(),
        )
        .map_err(map_decode_error)?;

        if data.claims.secret_version != current_version {
            return Err(CodecError::StaleTokenVersion);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::{TokenKind, User, UserId};
    use std::time::Duration;

    fn user() -> User {
        User::new(UserId(uuid::Uuid::new_v4()), "admin")
    }

    fn secret() -> SigningSecret {
        SigningSecret::new("access-secret")
    }

    fn claims(kind: TokenKind) -> Claims {
        Claims::mint(&user(), kind, "v1", "sessionguard", Duration::from_secs(900))
    }

    #[test]
    fn encode_then_decode_keeps_claims() {
        let codec = JwtHs256Codec::new("sessionguard");
        let claims = claims(TokenKind::Access);
        let token = codec.encode(&claims, &secret()).unwrap();
        let decoded = codec.decode(&token, &secret(), "v1").unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn wrong_secret_is_invalid_signature() {
        let codec = JwtHs256Codec::new("sessionguard");
        let token = codec.encode(&claims(TokenKind::Access), &secret()).unwrap();
        let err = codec
            .decode(&token, &SigningSecret::new("other"), "v1")
            .unwrap_err();
        assert_eq!(err, CodecError::InvalidSignature);
    }

    #[test]
    fn expired_token_is_rejected() {
        let codec = JwtHs256Codec::new("sessionguard");
        let mut claims = claims(TokenKind::Refresh);
        claims.iat -= 7200;
        claims.exp = claims.iat + 60;
        let token = codec.encode(&claims, &secret()).unwrap();
        assert_eq!(
            codec.decode(&token, &secret(), "v1").unwrap_err(),
            CodecError::Expired
        );
    }

    #[test]
    fn version_mismatch_is_stale() {
        let codec = JwtHs256Codec::new("sessionguard");
        let token = codec.encode(&claims(TokenKind::Access), &secret()).unwrap();
        assert_eq!(
            codec.decode(&token, &secret(), "v2").unwrap_err(),
            CodecError::StaleTokenVersion
        );
    }

    #[test]
    fn other_algorithms_are_refused() {
        let codec = JwtHs256Codec::new("sessionguard");
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims(TokenKind::Access),
            &EncodingKey::from_secret(secret().as_bytes()),
        )
        .unwrap();
        assert_eq!(
            codec.decode(&token, &secret(), "v1").unwrap_err(),
            CodecError::InvalidSignature
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = JwtHs256Codec::new("sessionguard");
        assert_eq!(
            codec.decode("not-a-jwt", &secret(), "v1").unwrap_err(),
            CodecError::Malformed
        );
    }

    #[test]
    fn foreign_claim_shape_is_malformed() {
        #[derive(serde::Serialize)]
        struct Foreign {
            sub: String,
            iss: String,
            exp: i64,
        }
        let codec = JwtHs256Codec::new("sessionguard");
        let foreign = Foreign {
            sub: "someone".to_string(),
            iss: "sessionguard".to_string(),
            exp: chrono::Utc::now().timestamp() + 600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &foreign,
            &EncodingKey::from_secret(secret().as_bytes()),
        )
        .unwrap();
        assert_eq!(
            codec.decode(&token, &secret(), "v1").unwrap_err(),
            CodecError::Malformed
        );
    }

    #[test]
    fn issuer_mismatch_is_rejected() {
        let minted_by = JwtHs256Codec::new("someone-else");
        let codec = JwtHs256Codec::new("sessionguard");
        let mut claims = claims(TokenKind::Access);
        claims.iss = "someone-else".to_string();
        let token = minted_by.encode(&claims, &secret()).unwrap();
        assert!(codec.decode(&token, &secret(), "v1").is_err());
    }
}
