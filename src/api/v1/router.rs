use super::error::*;
use super::handler;
use crate::application_impl::RequestThrottle;
use crate::application_port::SessionService;
use crate::domain_model::{Claims, RateLimitInfo};
use crate::server::*;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use warp::{Filter, reject};

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let refresh = warp::post()
        .and(warp::path("auth"))
        .and(warp::path("refresh"))
        .and(warp::path::end())
        .and(with_throttle(server.clone()))
        .and(warp::body::json())
        .and(with(server.session_service.clone()))
        .and(with(server.user_directory.clone()))
        .and(with_cancel(server.clone()))
        .and_then(handler::refresh);

    let logout = warp::post()
        .and(warp::path("auth"))
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and(with_throttle(server.clone()))
        .and(warp::body::json())
        .and(with(server.session_service.clone()))
        .and(with_cancel(server.clone()))
        .and_then(handler::logout);

    let me = warp::get()
        .and(warp::path("auth"))
        .and(warp::path("me"))
        .and(warp::path::end())
        .and(with_throttle(server.clone()))
        .and(with_verification(server.session_service.clone()))
        .and_then(handler::me);

    refresh.or(logout).or(me)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_cancel(
    server: Arc<Server>,
) -> impl Filter<Extract = (CancellationToken,), Error = Infallible> + Clone {
    warp::any().map(move || server.request_token())
}

/// Runs the request throttle before the handler. A valid access token in the
/// `Authorization` header also charges the per-user quota.
fn with_throttle(
    server: Arc<Server>,
) -> impl Filter<Extract = (Option<RateLimitInfo>,), Error = warp::Rejection> + Clone {
    warp::addr::remote()
        .and(warp::header::optional::<String>("authorization"))
        .and_then(move |remote: Option<SocketAddr>, authorization: Option<String>| {
            let server = server.clone();
            async move {
                let throttle: &RequestThrottle = &server.throttle;
                if !throttle.is_enabled() {
                    return Ok(None);
                }
                let user = authorization
                    .as_deref()
                    .and_then(handler::bearer_token)
                    .and_then(|token| server.session_service.validate_access(token).ok())
                    .map(|claims| claims.sub);

                match throttle.check(remote.map(|addr| addr.ip()), user).await {
                    Some(info) if !info.allowed => Err(reject::custom(Throttled(info))),
                    info => Ok(info),
                }
            }
        })
}

fn with_verification(
    session_service: Arc<dyn SessionService>,
) -> impl Filter<Extract = (Claims,), Error = warp::Rejection> + Clone {
    warp::header::<String>("authorization").and_then(move |header: String| {
        let session_service = session_service.clone();
        async move {
            let token = handler::bearer_token(&header)
                .ok_or_else(|| reject::custom(ApiErrorCode::InvalidToken))?;
            session_service
                .validate_access(token)
                .map_err(ApiErrorCode::from)
                .map_err(reject::custom)
        }
    })
}
