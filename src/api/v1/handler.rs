use super::error::*;
use crate::application_port::{AuthError, SessionService};
use crate::domain_model::{Claims, RateLimitInfo, UserId};
use crate::domain_port::UserDirectory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use warp::http::{HeaderName, HeaderValue};
use warp::{Reply, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

pub fn with_rate_limit_headers(
    mut response: warp::reply::Response,
    info: Option<&RateLimitInfo>,
) -> warp::reply::Response {
    if let Some(info) = info {
        for (name, value) in info.header_pairs(Utc::now()) {
            if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
                response.headers_mut().insert(name, HeaderValue::from(value));
            }
        }
    }
    response
}

fn respond<T: Serialize>(data: T, throttle: Option<RateLimitInfo>) -> warp::reply::Response {
    let response = warp::reply::json(&ApiResponse::ok(data)).into_response();
    with_rate_limit_headers(response, throttle.as_ref())
}

/// Token part of an `Authorization: Bearer <token>` header.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    throttle: Option<RateLimitInfo>,
    body: RefreshRequest,
    session_service: Arc<dyn SessionService>,
    user_directory: Arc<dyn UserDirectory>,
    cancel: CancellationToken,
) -> Result<warp::reply::Response, warp::Rejection> {
    let user_id = session_service
        .subject_of(&body.refresh_token)
        .map_err(|e| match e {
            AuthError::StaleTokenVersion => reject::custom(ApiErrorCode::StaleToken),
            _ => reject::custom(ApiErrorCode::InvalidToken),
        })?;
    let user = user_directory
        .find_user(user_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?
        .ok_or_else(|| reject::custom(ApiErrorCode::InvalidToken))?;

    let tokens = session_service
        .rotate(&user, &body.refresh_token, &cancel)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(respond(tokens, throttle))
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

pub async fn logout(
    throttle: Option<RateLimitInfo>,
    body: LogoutRequest,
    session_service: Arc<dyn SessionService>,
    cancel: CancellationToken,
) -> Result<warp::reply::Response, warp::Rejection> {
    session_service
        .revoke(&body.refresh_token, &cancel)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(respond((), throttle))
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user_id: UserId,
    pub role: String,
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn me(
    throttle: Option<RateLimitInfo>,
    claims: Claims,
) -> Result<warp::reply::Response, warp::Rejection> {
    let response = MeResponse {
        user_id: claims.sub,
        role: claims.role.clone(),
        expires_at: claims.expires_at(),
    };
    Ok(respond(response, throttle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
    }

    #[test]
    fn throttle_headers_are_attached() {
        let info = RateLimitInfo::deny(10, Utc::now() + Duration::seconds(30));
        let response = with_rate_limit_headers(
            warp::reply::json(&ApiResponse::ok(())).into_response(),
            Some(&info),
        );
        let headers = response.headers();
        assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "10");
        assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "0");
        assert!(headers.contains_key("retry-after"));
    }
}
