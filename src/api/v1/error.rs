use crate::api::v1::handler::{ApiResponse, with_rate_limit_headers};
use crate::application_port::*;
use crate::domain_model::RateLimitInfo;
use crate::domain_port::StoreError;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::warn;
use warp::http::StatusCode;
use warp::{Rejection, Reply, reject};

pub async fn recover_error(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    if let Some(Throttled(info)) = err.find::<Throttled>() {
        let code = ApiErrorCode::TooManyRequests;
        let json = warp::reply::json(&ApiResponse::<()>::err(code.clone(), code.to_string()));
        let response = warp::reply::with_status(json, code.status()).into_response();
        return Ok(with_rate_limit_headers(response, Some(info)));
    }

    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        code.clone()
    } else if err.is_not_found() {
        ApiErrorCode::NotFound
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        ApiErrorCode::BadRequest
    } else {
        ApiErrorCode::internal(format!("unhandled rejection: {:?}", err))
    };

    let json = warp::reply::json(&ApiResponse::<()>::err(code.clone(), code.to_string()));
    Ok(warp::reply::with_status(json, code.status()).into_response())
}

/// Rejection raised when a limiter says no; carries the quota for headers.
#[derive(Debug)]
pub struct Throttled(pub RateLimitInfo);

impl reject::Reject for Throttled {}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Error, Serialize)]
pub enum ApiErrorCode {
    #[error("Token is not valid")]
    InvalidToken,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token was signed under a retired secret version")]
    StaleToken,
    #[error("Session has been revoked")]
    TokenRevoked,
    #[error("Too many requests")]
    TooManyRequests,
    #[error("Malformed request")]
    BadRequest,
    #[error("Not found")]
    NotFound,
    #[error("Service temporarily unavailable")]
    ServiceUnavailable,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidToken
            | ApiErrorCode::TokenExpired
            | ApiErrorCode::StaleToken
            | ApiErrorCode::TokenRevoked => StatusCode::UNAUTHORIZED,
            ApiErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::MalformedToken | AuthError::InvalidSignature | AuthError::InvalidToken => {
                ApiErrorCode::InvalidToken
            }
            AuthError::Expired => ApiErrorCode::TokenExpired,
            AuthError::StaleTokenVersion => ApiErrorCode::StaleToken,
            AuthError::TokenRevoked => ApiErrorCode::TokenRevoked,
            AuthError::StorageUnavailable | AuthError::Cancelled => {
                ApiErrorCode::ServiceUnavailable
            }
            AuthError::InternalError => ApiErrorCode::InternalError,
        }
    }
}

impl From<StoreError> for ApiErrorCode {
    fn from(error: StoreError) -> Self {
        warn!("user directory failure: {}", error);
        ApiErrorCode::ServiceUnavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_failures_are_unauthorized() {
        for error in [
            AuthError::MalformedToken,
            AuthError::Expired,
            AuthError::StaleTokenVersion,
            AuthError::TokenRevoked,
        ] {
            assert_eq!(ApiErrorCode::from(error).status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn transient_failures_are_unavailable() {
        assert_eq!(
            ApiErrorCode::from(AuthError::StorageUnavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiErrorCode::from(AuthError::Cancelled).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
